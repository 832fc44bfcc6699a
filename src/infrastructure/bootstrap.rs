//! Composition root: turn a [`Config`] into a ready-to-run search.

use std::sync::Arc;

use tracing::info;

use crate::adapter::encoder::{EncoderSpec, PathMode, TrafficEncoder};
use crate::adapter::solver::HiGHSSolver;
use crate::application::gap::GapSearch;
use crate::domain::path::PathTable;
use crate::domain::topology::Topology;
use crate::error::Result;
use crate::infrastructure::config::settings::Config;
use crate::port::{Encoder, Solver};

/// Everything a search needs, built once per run.
#[derive(Debug)]
pub struct Engine {
    pub topology: Arc<Topology>,
    pub search: GapSearch,
    pub reference: TrafficEncoder,
    pub heuristic: TrafficEncoder,
}

impl Engine {
    /// Load the topology and paths, and build the solver, encoders and search.
    ///
    /// # Errors
    ///
    /// Returns I/O and parse errors of the topology and path files, and
    /// configuration errors of the encoders and the search.
    pub fn from_config(config: &Config) -> Result<Self> {
        let topology = Arc::new(config.topology.load(config.base_dir.as_deref())?);
        let paths = config
            .paths
            .as_deref()
            .map(|path| PathTable::load(config.resolve(path)).map(Arc::new))
            .transpose()?;

        let build = |spec: &EncoderSpec| {
            let predetermined = match spec.path_mode {
                PathMode::Predetermined => paths.clone(),
                PathMode::Computed => None,
            };
            TrafficEncoder::build(spec, Arc::clone(&topology), predetermined)
        };
        let reference = build(&config.reference)?;
        let heuristic = build(&config.heuristic)?;

        let solver = match config.solver.time_limit() {
            Some(limit) => HiGHSSolver::new().with_time_limit(limit),
            None => HiGHSSolver::new(),
        };
        let solver: Arc<dyn Solver> = Arc::new(solver);
        let search = GapSearch::new(solver, Arc::clone(&topology), config.search.clone())?;

        info!(
            topology = topology.name(),
            nodes = topology.num_nodes(),
            edges = topology.edges().len(),
            reference = reference.name(),
            heuristic = heuristic.name(),
            "Engine ready"
        );
        Ok(Self {
            topology,
            search,
            reference,
            heuristic,
        })
    }
}
