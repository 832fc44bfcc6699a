//! Infrastructure layer.
//!
//! Provides technical concerns that support the application without containing
//! search logic: configuration loading and the composition root that turns a
//! configuration into a ready-to-run search.
//!
//! # Submodules
//!
//! - [`bootstrap`] - Composition root for runtime wiring
//! - [`config`] - Configuration loading and validation

pub mod bootstrap;
pub mod config;
