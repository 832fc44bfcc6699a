//! Trait definitions (hexagonal ports). Depend only on domain.
//!
//! Ports define the seams between the search engine and the pieces it
//! treats as collaborators.
//!
//! # Architecture
//!
//! ```text
//!                    ┌─────────────────────────┐
//!                    │      Application        │
//!                    │   (gap search, rewrite) │
//!     ┌──────────────┤  Domain + Port          ├──────────────┐
//!     │              └─────────────────────────┘              │
//!     ▼                         ▼                             ▼
//! ┌─────────┐            ┌─────────────┐              ┌───────────┐
//! │ Solver  │            │  Encoders   │              │    CLI    │
//! │ Adapter │            │  Adapter    │              │  Adapter  │
//! └─────────┘            └─────────────┘              └───────────┘
//! ```
//!
//! # Available Ports
//!
//! - [`Solver`] - MILP optimization backend
//! - [`Encoder`] - Inner problem formulation
//! - [`RewriteGenerator`] - Bilevel to single-level rewrite

mod encoder;
mod rewrite;
mod solver;

// Encoder port
pub use encoder::{Encoder, Encoding, InnerSolution, Optimality};

// Rewrite port
pub use rewrite::{RewriteGenerator, INNER_VARIABLE_BOUNDS};

// Solver port
pub use solver::{ObjectiveSense, Solution, SolveOutcome, Solver};

// Test utilities
#[cfg(test)]
pub use solver::tests;
