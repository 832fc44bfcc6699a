//! Demand pinning heuristic.
//!
//! Demands at or below the threshold are routed on their shortest path and
//! reserve capacity there; the remaining demands are routed optimally over the
//! residual capacity.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use super::flow::{add_capacity_constraints, finish_encoding, PathFlows};
use crate::domain::constraint::VariableBounds;
use crate::domain::demand::{DemandMatrix, Pair, DEMAND_EPSILON};
use crate::domain::error::DomainError;
use crate::domain::input::{InputSet, InputVariable};
use crate::domain::model::Model;
use crate::domain::path::{path_edges, PathTable};
use crate::domain::polynomial::Polynomial;
use crate::domain::topology::{NodeId, Topology};
use crate::error::Result;
use crate::port::{Encoder, Encoding, Optimality, RewriteGenerator};

/// Continuous demands must exceed the threshold by this much to stay unpinned.
const UNPINNED_MARGIN: f64 = 1e-4;

/// Capacity slack tolerated by the pinning precheck.
const CAPACITY_TOLERANCE: f64 = 1e-9;

/// Routes small demands on their shortest path, the rest optimally.
#[derive(Debug, Clone)]
pub struct DemandPinningEncoder {
    topology: Arc<Topology>,
    paths: Arc<PathTable>,
    threshold: f64,
}

impl DemandPinningEncoder {
    /// Create an encoder pinning demands at or below `threshold`.
    #[must_use]
    pub fn new(topology: Arc<Topology>, paths: Arc<PathTable>, threshold: f64) -> Self {
        Self {
            topology,
            paths,
            threshold,
        }
    }

    /// Pinning threshold.
    #[must_use]
    pub const fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Candidate paths.
    #[must_use]
    pub fn paths(&self) -> &PathTable {
        &self.paths
    }

    /// Shortest path of `pair` used for pinning.
    #[must_use]
    pub fn pinned_path(&self, pair: Pair) -> Option<&[NodeId]> {
        self.paths.shortest(pair).map(Vec::as_slice)
    }

    /// The most overloaded edge when the small demands of `demands` are pinned.
    #[must_use]
    pub fn pinned_overload(&self, demands: &DemandMatrix) -> Option<DomainError> {
        let mut load: BTreeMap<(NodeId, NodeId), (f64, Vec<Pair>)> = BTreeMap::new();
        for (pair, value) in demands.iter() {
            if value <= DEMAND_EPSILON || value > self.threshold {
                continue;
            }
            let Some(path) = self.pinned_path(pair) else {
                continue;
            };
            for edge in path_edges(path) {
                let entry = load.entry(edge).or_default();
                entry.0 += value;
                entry.1.push(pair);
            }
        }

        load.into_iter()
            .filter_map(|(edge, (load, pairs))| {
                let capacity = self.topology.capacity(edge.0, edge.1).unwrap_or(0.0);
                (load > capacity + CAPACITY_TOLERANCE).then_some((edge, load, capacity, pairs))
            })
            .max_by(|a, b| (a.1 - a.2).total_cmp(&(b.1 - b.2)))
            .map(|(edge, load, capacity, pairs)| DomainError::PinningInfeasible {
                edge,
                threshold: self.threshold,
                load,
                capacity,
                pairs,
            })
    }

    /// Small and large parts of every input.
    ///
    /// Continuous inputs that may fall on either side of the threshold get a
    /// binary pin indicator and an auxiliary variable holding the pinned part.
    fn split_inputs(
        &self,
        model: &mut Model,
        inputs: &InputSet,
        rewrite: &mut dyn RewriteGenerator,
    ) -> Result<BTreeMap<Pair, (Polynomial, Polynomial)>> {
        let t = self.threshold;
        let mut parts = BTreeMap::new();
        for (pair, input) in inputs.iter() {
            if let Some(split) = input.split_at(t) {
                parts.insert(pair, split);
                continue;
            }
            let &InputVariable::Continuous(d) = input else {
                continue;
            };
            let ub = inputs.upper_bound(pair);
            if ub <= t {
                parts.insert(pair, (Polynomial::term(d, 1.0), Polynomial::new()));
                continue;
            }

            let pinned = model.binary(format!("pin{pair}"));
            let small = model.continuous(format!("pinned{pair}"), VariableBounds::bounded(0.0, ub));
            // small = d · pinned
            model.add_leq_zero(Polynomial::term(small, 1.0).with_term(pinned, -ub));
            model.add_leq_zero(Polynomial::term(small, 1.0).with_term(d, -1.0));
            model.add_leq_zero(
                Polynomial::term(d, 1.0).with_term(pinned, ub).with_term(small, -1.0)
                    + Polynomial::constant(-ub),
            );
            // pinned => d <= t
            model.add_leq_zero(
                Polynomial::term(d, 1.0).with_term(pinned, ub) + Polynomial::constant(-(t + ub)),
            );
            // !pinned => d >= t + margin
            let floor = t + UNPINNED_MARGIN;
            model.add_leq_zero(
                Polynomial::term(pinned, -floor).with_term(d, -1.0) + Polynomial::constant(floor),
            );
            rewrite.declare_parameter(model, small)?;
            parts.insert(
                pair,
                (
                    Polynomial::term(small, 1.0),
                    Polynomial::term(d, 1.0).with_term(small, -1.0),
                ),
            );
        }
        Ok(parts)
    }
}

impl Encoder for DemandPinningEncoder {
    fn name(&self) -> &str {
        "demand_pinning"
    }

    fn encode(
        &self,
        model: &mut Model,
        inputs: &InputSet,
        rewrite: &mut dyn RewriteGenerator,
        optimality: Optimality,
    ) -> Result<Encoding> {
        let parts = self.split_inputs(model, inputs, rewrite)?;

        let mut reserved: BTreeMap<(NodeId, NodeId), Polynomial> = BTreeMap::new();
        for (pair, (small, _)) in &parts {
            if small.is_zero() {
                continue;
            }
            if let Some(path) = self.pinned_path(*pair) {
                for edge in path_edges(path) {
                    *reserved.entry(edge).or_default() += small;
                }
            }
        }

        let flows = PathFlows::build(
            model,
            rewrite,
            &self.paths,
            parts
                .iter()
                .filter(|(_, (_, large))| !large.is_zero())
                .map(|(pair, _)| *pair),
            |pair| parts.get(&pair).map(|(_, l)| l.clone()).unwrap_or_default(),
        )?;
        let capacities =
            add_capacity_constraints(model, rewrite, &self.topology, flows.edge_load.clone(), reserved)?;

        let routed_objective = flows.total();
        rewrite.add_maximization_constraints(model, &routed_objective, optimality.skip_extra())?;

        let pinned_total: Polynomial = parts.values().map(|(small, _)| small.clone()).sum();
        let objective = routed_objective + pinned_total;

        debug!(
            encoder = self.name(),
            threshold = self.threshold,
            pairs = parts.len(),
            routed_pairs = flows.per_pair.len(),
            capacities,
            ?optimality,
            "Encoded inner problem"
        );
        let per_pair = parts
            .iter()
            .map(|(pair, (small, _))| (*pair, flows.routed(*pair) + small.clone()))
            .collect();
        Ok(finish_encoding(model, self.name(), inputs, objective, per_pair))
    }

    fn for_topology(&self, topology: Arc<Topology>) -> Result<Box<dyn Encoder>> {
        let paths = Arc::new(PathTable::compute(&topology, self.paths.max_paths().max(1)));
        Ok(Box::new(Self::new(topology, paths, self.threshold)))
    }

    fn check_inputs(&self, demands: &DemandMatrix) -> Result<()> {
        match self.pinned_overload(demands) {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }
}
