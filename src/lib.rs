//! Metaopt - adversarial gap search for resource-allocation heuristics.
//!
//! Given an exact algorithm and a heuristic for the same traffic problem,
//! this crate finds demand matrices on which the heuristic loses the most
//! against the exact optimum. Both algorithms are encoded as inner
//! optimization problems and folded into one single-level MILP.
//!
//! # Architecture
//!
//! - **`domain`** - Expressions, models, topologies, demands and paths
//! - **`port`** - Solver, encoder and rewrite traits
//! - **`adapter`** - HiGHS solver, traffic encoders and the CLI
//! - **`application`** - Rewrites, gap search, decomposition and local search
//! - **`infrastructure`** - Configuration and wiring
//!
//! # Example
//!
//! ```no_run
//! use metaopt::infrastructure::bootstrap::Engine;
//! use metaopt::infrastructure::config::Config;
//! use metaopt::application::gap::SearchOptions;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("metaopt.toml")?;
//!     let engine = Engine::from_config(&config)?;
//!     let result = engine.search.maximize_gap(
//!         &engine.reference,
//!         &engine.heuristic,
//!         &SearchOptions::default(),
//!     )?;
//!     println!("gap = {}", result.gap);
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod port;
