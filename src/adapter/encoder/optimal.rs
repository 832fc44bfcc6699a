//! Path-based maximum multi-commodity flow.

use std::sync::Arc;

use tracing::debug;

use super::flow::{add_capacity_constraints, finish_encoding, PathFlows};
use crate::domain::input::InputSet;
use crate::domain::model::Model;
use crate::domain::path::PathTable;
use crate::domain::topology::Topology;
use crate::error::Result;
use crate::port::{Encoder, Encoding, Optimality, RewriteGenerator};

/// Maximizes total routed demand over the candidate paths of every pair.
#[derive(Debug, Clone)]
pub struct OptimalEncoder {
    topology: Arc<Topology>,
    paths: Arc<PathTable>,
}

impl OptimalEncoder {
    /// Create an encoder routing over `paths`.
    #[must_use]
    pub fn new(topology: Arc<Topology>, paths: Arc<PathTable>) -> Self {
        Self { topology, paths }
    }

    /// Candidate paths.
    #[must_use]
    pub fn paths(&self) -> &PathTable {
        &self.paths
    }
}

impl Encoder for OptimalEncoder {
    fn name(&self) -> &str {
        "optimal"
    }

    fn encode(
        &self,
        model: &mut Model,
        inputs: &InputSet,
        rewrite: &mut dyn RewriteGenerator,
        optimality: Optimality,
    ) -> Result<Encoding> {
        let flows = PathFlows::build(
            model,
            rewrite,
            &self.paths,
            inputs.iter().map(|(pair, _)| pair),
            |pair| inputs.expression(pair),
        )?;
        let capacities = add_capacity_constraints(
            model,
            rewrite,
            &self.topology,
            flows.edge_load.clone(),
            Default::default(),
        )?;

        let objective = flows.total();
        rewrite.add_maximization_constraints(model, &objective, optimality.skip_extra())?;

        debug!(
            encoder = self.name(),
            pairs = flows.per_pair.len(),
            capacities,
            ?optimality,
            "Encoded inner problem"
        );
        let routed = flows
            .per_pair
            .keys()
            .map(|&pair| (pair, flows.routed(pair)))
            .collect();
        Ok(finish_encoding(model, self.name(), inputs, objective, routed))
    }

    fn for_topology(&self, topology: Arc<Topology>) -> Result<Box<dyn Encoder>> {
        let paths = Arc::new(PathTable::compute(&topology, self.paths.max_paths().max(1)));
        Ok(Box::new(Self::new(topology, paths)))
    }
}
