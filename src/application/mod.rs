//! Application services (use cases).
//!
//! These services drive the solver through the encoders and rewrites to
//! answer gap questions about a heuristic.

pub mod decomposition;
pub mod gap;
pub mod metaheuristic;
pub mod rewrite;
