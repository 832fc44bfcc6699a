//! Application configuration loading and validation.
//!
//! Provides the main [`Config`] struct that aggregates all settings of a run:
//! the topology, the solver, the two encoders and the search strategies.
//!
//! # Example
//!
//! ```no_run
//! use metaopt::infrastructure::config::settings::Config;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("metaopt.toml")?;
//!     config.init_logging();
//!     Ok(())
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::logging::LoggingConfig;
use crate::adapter::encoder::{EncoderSpec, PathMode};
use crate::application::decomposition::DecompositionConfig;
use crate::application::gap::GapSearchConfig;
use crate::application::metaheuristic::MetaConfig;
use crate::domain::topology::{Topology, DEFAULT_LINK_CAPACITY};
use crate::error::{ConfigError, Result};

/// Where the topology comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TopologySource {
    /// networkx node-link JSON file.
    File { path: PathBuf },
    /// Bidirectional ring.
    Ring {
        nodes: usize,
        #[serde(default = "default_capacity")]
        capacity: f64,
    },
}

fn default_capacity() -> f64 {
    DEFAULT_LINK_CAPACITY
}

impl TopologySource {
    /// Load or generate the topology.
    ///
    /// Relative file paths are resolved against `base`.
    ///
    /// # Errors
    ///
    /// Returns I/O, JSON and domain errors.
    pub fn load(&self, base: Option<&Path>) -> Result<Topology> {
        match self {
            Self::File { path } => Topology::load(resolve(base, path)),
            Self::Ring { nodes, capacity } => Topology::ring(*nodes, *capacity),
        }
    }
}

/// Solver settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Time limit per solve in seconds.
    #[serde(default)]
    pub time_limit_secs: Option<f64>,
}

impl SolverConfig {
    /// Time limit per solve.
    #[must_use]
    pub fn time_limit(&self) -> Option<Duration> {
        self.time_limit_secs.map(Duration::from_secs_f64)
    }
}

/// Main application configuration.
///
/// Load from a TOML file using [`Config::load`] or parse directly with
/// [`Config::parse_toml`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Logging and tracing configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    pub topology: TopologySource,

    #[serde(default)]
    pub solver: SolverConfig,

    /// Exact algorithm.
    pub reference: EncoderSpec,

    /// Heuristic under test.
    pub heuristic: EncoderSpec,

    /// Predetermined path file shared by encoders in predetermined mode.
    #[serde(default)]
    pub paths: Option<PathBuf>,

    pub search: GapSearchConfig,

    #[serde(default)]
    pub decomposition: DecompositionConfig,

    #[serde(default)]
    pub metaheuristic: MetaConfig,

    /// Directory the file was loaded from; relative paths resolve against it.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl Config {
    /// Parse configuration from TOML content.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The TOML content is malformed
    /// - Validation fails
    #[allow(clippy::result_large_err)]
    pub fn parse_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read
    /// - The TOML content is malformed
    /// - Validation fails
    #[allow(clippy::result_large_err)]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(format!("{}: {e}", path.display())))?;
        let mut config = Self::parse_toml(&content)?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// Checks that all required fields are present and values are within
    /// acceptable ranges. Checks that need the topology run when the search
    /// is built.
    #[allow(clippy::result_large_err)]
    fn validate(&self) -> Result<()> {
        if let TopologySource::Ring { nodes, capacity } = self.topology {
            if nodes < 2 {
                return Err(ConfigError::InvalidValue {
                    field: "nodes",
                    reason: "a ring needs at least 2 nodes".to_string(),
                }
                .into());
            }
            if !(capacity > 0.0 && capacity.is_finite()) {
                return Err(ConfigError::InvalidValue {
                    field: "capacity",
                    reason: "must be greater than 0".to_string(),
                }
                .into());
            }
        }
        if let Some(limit) = self.solver.time_limit_secs {
            if !(limit > 0.0 && limit.is_finite()) {
                return Err(ConfigError::InvalidValue {
                    field: "time_limit_secs",
                    reason: "must be greater than 0".to_string(),
                }
                .into());
            }
        }
        let predetermined = [&self.reference, &self.heuristic]
            .iter()
            .any(|spec| spec.path_mode == PathMode::Predetermined);
        if predetermined != self.paths.is_some() {
            return Err(ConfigError::PathModeMismatch.into());
        }
        self.decomposition.validate()?;
        self.metaheuristic.validate()?;
        Ok(())
    }

    /// Resolve a path from the file against the config directory.
    #[must_use]
    pub fn resolve(&self, path: &Path) -> PathBuf {
        resolve(self.base_dir.as_deref(), path)
    }

    /// Initialize logging with the configured settings.
    pub fn init_logging(&self) {
        self.logging.init();
    }
}

fn resolve(base: Option<&Path>, path: &Path) -> PathBuf {
    match base {
        Some(base) if path.is_relative() => base.join(path),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::encoder::EncoderKind;
    use crate::application::rewrite::RewriteKind;

    const MINIMAL: &str = r#"
        [topology]
        kind = "ring"
        nodes = 4
        capacity = 10.0

        [reference]
        kind = "optimal"
        num_paths = 2

        [heuristic]
        kind = "demand_pinning"
        threshold = 5.0
        num_paths = 2

        [search]
        demand_ub = 10.0
    "#;

    #[test]
    fn test_minimal_config() {
        let config = Config::parse_toml(MINIMAL).unwrap();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.search.rewrite, RewriteKind::Kkt);
        assert_eq!(
            config.heuristic.kind,
            EncoderKind::DemandPinning { threshold: 5.0 }
        );
        assert_eq!(config.topology.load(None).unwrap().num_nodes(), 4);
    }

    #[test]
    fn test_tiny_ring_rejected() {
        let content = MINIMAL.replace("nodes = 4", "nodes = 1");
        let err = Config::parse_toml(&content).unwrap_err();
        assert!(err.to_string().contains("nodes"));
    }

    #[test]
    fn test_predetermined_mode_without_paths_rejected() {
        let content = MINIMAL.replace(
            "kind = \"optimal\"",
            "kind = \"optimal\"\n        path_mode = \"predetermined\"",
        );
        assert!(Config::parse_toml(&content).is_err());
    }

    #[test]
    fn test_malformed_toml_rejected() {
        assert!(matches!(
            Config::parse_toml("[topology"),
            Err(crate::error::Error::Config(ConfigError::Parse(_)))
        ));
    }

    #[test]
    fn test_relative_paths_resolve_against_config_dir() {
        let mut config = Config::parse_toml(MINIMAL).unwrap();
        config.base_dir = Some(PathBuf::from("/data/runs"));
        assert_eq!(
            config.resolve(Path::new("paths.json")),
            PathBuf::from("/data/runs/paths.json")
        );
        assert_eq!(config.resolve(Path::new("/abs.json")), PathBuf::from("/abs.json"));
    }
}
