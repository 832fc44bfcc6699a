//! Problem-agnostic domain types: expressions, models, topologies, demands.

pub mod constraint;
pub mod demand;
pub mod error;
pub mod input;
pub mod locality;
pub mod model;
pub mod path;
pub mod polynomial;
pub mod topology;

pub use constraint::{Constraint, ConstraintSense, VarKind, VariableBounds};
pub use demand::{DemandMatrix, Pair, DEMAND_EPSILON};
pub use input::{InputMode, InputSet, InputSpec, InputVariable, LevelRestriction, Selector};
pub use locality::{Admissibility, Exclusion, LocalityMap};
pub use model::{ConstraintId, Model, ModelId};
pub use path::{k_shortest_paths, path_edges, Path, PathTable};
pub use polynomial::{Polynomial, Var};
pub use topology::{Edge, NodeId, Topology};
