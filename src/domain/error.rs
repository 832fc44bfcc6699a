//! Domain errors for core domain types.
//!
//! This module defines errors raised when domain invariants are violated,
//! including the recoverable pinning infeasibility signal used by the
//! local-search repair loop.
//!
//! # Examples
//!
//! ```
//! use metaopt::domain::error::DomainError;
//! use metaopt::domain::model::{ConstraintId, Model};
//!
//! let mut model = Model::new();
//! let result = model.set_rhs(ConstraintId::from_raw(7), 1.0);
//!
//! assert!(matches!(result, Err(DomainError::UnknownConstraint { .. })));
//! ```

use thiserror::Error;

use super::demand::Pair;
use super::topology::NodeId;

/// Errors that occur when domain invariants are violated.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// Pinning small demands onto their shortest paths overloads a link.
    ///
    /// Recoverable: callers resample the input or scale down `pairs`.
    #[error(
        "pinned demands overload edge ({}, {}): load {load} > capacity {capacity} at threshold {threshold}",
        edge.0, edge.1
    )]
    PinningInfeasible {
        /// The overloaded edge.
        edge: (NodeId, NodeId),
        /// Demand pinning threshold in effect.
        threshold: f64,
        /// Total pinned load on the edge.
        load: f64,
        /// Capacity of the edge.
        capacity: f64,
        /// Pinned pairs whose shortest path crosses the edge.
        pairs: Vec<Pair>,
    },

    /// A constraint handle does not refer to a live constraint.
    #[error("unknown constraint handle {id}")]
    UnknownConstraint {
        /// Raw handle value.
        id: usize,
    },

    /// Two constraints were given the same name.
    #[error("constraint name already in use: {name}")]
    DuplicateConstraintName {
        /// The conflicting name.
        name: String,
    },

    /// A node id outside the topology.
    #[error("node {node} is not part of a topology with {num_nodes} nodes")]
    UnknownNode {
        /// The offending node.
        node: NodeId,
        /// Number of nodes in the topology.
        num_nodes: usize,
    },

    /// Edge capacities must be positive and finite.
    #[error("edge ({src}, {dst}) has invalid capacity {capacity}")]
    InvalidCapacity {
        /// Edge source.
        src: NodeId,
        /// Edge destination.
        dst: NodeId,
        /// The rejected capacity.
        capacity: f64,
    },

    /// Self loops carry no traffic between distinct nodes.
    #[error("self loop on node {node}")]
    SelfLoop {
        /// The node.
        node: NodeId,
    },

    /// A demand pair key could not be parsed.
    #[error("invalid demand pair '{raw}'")]
    InvalidPair {
        /// The unparseable text.
        raw: String,
    },
}

impl DomainError {
    /// True for the recoverable pinning infeasibility signal.
    #[must_use]
    pub const fn is_pinning_infeasible(&self) -> bool {
        matches!(self, Self::PinningInfeasible { .. })
    }
}
