//! Traffic-engineering encoders.
//!
//! Implements the `port::Encoder` trait for the path-based optimum and the
//! demand pinning heuristic. [`TrafficEncoder`] is the closed set the search
//! engine and the CLI select from.

#![allow(clippy::result_large_err)]

mod flow;
mod optimal;
mod pinning;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::demand::DemandMatrix;
use crate::domain::input::InputSet;
use crate::domain::model::Model;
use crate::domain::path::PathTable;
use crate::domain::topology::Topology;
use crate::error::{ConfigError, Result};
use crate::port::{Encoder, Encoding, InnerSolution, Optimality, RewriteGenerator, Solution};

pub use optimal::OptimalEncoder;
pub use pinning::DemandPinningEncoder;

/// Encoder selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EncoderKind {
    /// Maximum multi-commodity flow.
    Optimal,
    /// Demand pinning with the given threshold.
    DemandPinning { threshold: f64 },
}

/// Where candidate paths come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathMode {
    /// k shortest simple paths computed from the topology.
    #[default]
    Computed,
    /// Paths supplied by the caller.
    Predetermined,
}

/// Encoder construction parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderSpec {
    /// Encoder selection.
    #[serde(flatten)]
    pub kind: EncoderKind,

    /// Candidate paths per pair in computed mode.
    #[serde(default = "default_num_paths")]
    pub num_paths: usize,

    /// Path source.
    #[serde(default)]
    pub path_mode: PathMode,
}

fn default_num_paths() -> usize {
    2
}

impl EncoderSpec {
    /// Spec of a computed-path encoder.
    #[must_use]
    pub const fn new(kind: EncoderKind, num_paths: usize) -> Self {
        Self {
            kind,
            num_paths,
            path_mode: PathMode::Computed,
        }
    }
}

/// One of the shipped encoders.
#[derive(Debug, Clone)]
pub enum TrafficEncoder {
    Optimal(OptimalEncoder),
    DemandPinning(DemandPinningEncoder),
}

impl TrafficEncoder {
    /// Build an encoder over `topology`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::PathModeMismatch`] when predetermined mode is
    /// requested without paths or paths are given in computed mode, and
    /// [`ConfigError::InvalidValue`] for a zero path budget or a negative
    /// threshold.
    pub fn build(
        spec: &EncoderSpec,
        topology: Arc<Topology>,
        predetermined: Option<Arc<PathTable>>,
    ) -> Result<Self> {
        let paths = match (spec.path_mode, predetermined) {
            (PathMode::Predetermined, Some(paths)) => paths,
            (PathMode::Computed, None) => {
                if spec.num_paths == 0 {
                    return Err(ConfigError::InvalidValue {
                        field: "num_paths",
                        reason: "must be at least 1".into(),
                    }
                    .into());
                }
                Arc::new(PathTable::compute(&topology, spec.num_paths))
            }
            _ => return Err(ConfigError::PathModeMismatch.into()),
        };
        Self::with_paths(spec.kind, topology, paths)
    }

    /// Build an encoder over an explicit path table.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for a negative pinning threshold.
    pub fn with_paths(kind: EncoderKind, topology: Arc<Topology>, paths: Arc<PathTable>) -> Result<Self> {
        Ok(match kind {
            EncoderKind::Optimal => Self::Optimal(OptimalEncoder::new(topology, paths)),
            EncoderKind::DemandPinning { threshold } => {
                if threshold < 0.0 || !threshold.is_finite() {
                    return Err(ConfigError::InvalidValue {
                        field: "threshold",
                        reason: format!("{threshold} is not a non-negative number"),
                    }
                    .into());
                }
                Self::DemandPinning(DemandPinningEncoder::new(topology, paths, threshold))
            }
        })
    }

    /// The same encoder over another topology, with freshly computed paths.
    ///
    /// The path budget of the current table is kept.
    ///
    /// # Errors
    ///
    /// See [`TrafficEncoder::with_paths`].
    pub fn rebind(&self, topology: Arc<Topology>) -> Result<Self> {
        let k = self.paths().max_paths().max(1);
        let paths = Arc::new(PathTable::compute(&topology, k));
        Self::with_paths(self.kind(), topology, paths)
    }

    /// Encoder selection of this instance.
    #[must_use]
    pub fn kind(&self) -> EncoderKind {
        match self {
            Self::Optimal(_) => EncoderKind::Optimal,
            Self::DemandPinning(e) => EncoderKind::DemandPinning {
                threshold: e.threshold(),
            },
        }
    }

    /// Candidate path table.
    #[must_use]
    pub fn paths(&self) -> &PathTable {
        match self {
            Self::Optimal(e) => e.paths(),
            Self::DemandPinning(e) => e.paths(),
        }
    }

    fn inner(&self) -> &dyn Encoder {
        match self {
            Self::Optimal(e) => e,
            Self::DemandPinning(e) => e,
        }
    }
}

impl Encoder for TrafficEncoder {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn encode(
        &self,
        model: &mut Model,
        inputs: &InputSet,
        rewrite: &mut dyn RewriteGenerator,
        optimality: Optimality,
    ) -> Result<Encoding> {
        self.inner().encode(model, inputs, rewrite, optimality)
    }

    fn for_topology(&self, topology: Arc<Topology>) -> Result<Box<dyn Encoder>> {
        Ok(Box::new(self.rebind(topology)?))
    }

    fn extract(&self, encoding: &Encoding, solution: &Solution) -> InnerSolution {
        self.inner().extract(encoding, solution)
    }

    fn check_inputs(&self, demands: &DemandMatrix) -> Result<()> {
        self.inner().check_inputs(demands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn ring() -> Arc<Topology> {
        Arc::new(Topology::ring(4, 10.0).unwrap())
    }

    #[test]
    fn test_predetermined_mode_requires_paths() {
        let spec = EncoderSpec {
            kind: EncoderKind::Optimal,
            num_paths: 1,
            path_mode: PathMode::Predetermined,
        };
        let err = TrafficEncoder::build(&spec, ring(), None).unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::PathModeMismatch)));
    }

    #[test]
    fn test_paths_without_predetermined_mode_rejected() {
        let spec = EncoderSpec::new(EncoderKind::Optimal, 1);
        let paths = Arc::new(PathTable::compute(&ring(), 1));
        let err = TrafficEncoder::build(&spec, ring(), Some(paths)).unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::PathModeMismatch)));
    }

    #[test]
    fn test_rebind_keeps_kind_and_path_budget() {
        let spec = EncoderSpec::new(EncoderKind::DemandPinning { threshold: 2.0 }, 2);
        let encoder = TrafficEncoder::build(&spec, ring(), None).unwrap();

        let rebound = encoder.rebind(Arc::new(Topology::ring(3, 5.0).unwrap())).unwrap();

        assert_eq!(rebound.kind(), EncoderKind::DemandPinning { threshold: 2.0 });
        assert_eq!(rebound.paths().max_paths(), 2);
        assert_eq!(rebound.paths().len(), 6);
    }

    #[test]
    fn test_spec_from_toml() {
        let spec: EncoderSpec = toml::from_str(
            r#"
            kind = "demand_pinning"
            threshold = 5.0
            num_paths = 3
            "#,
        )
        .unwrap();
        assert_eq!(spec.kind, EncoderKind::DemandPinning { threshold: 5.0 });
        assert_eq!(spec.num_paths, 3);
        assert_eq!(spec.path_mode, PathMode::Computed);
    }
}
