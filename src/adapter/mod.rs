//! Implementations of ports (hexagonal adapters).

pub mod encoder;
pub mod inbound;
pub mod solver;
