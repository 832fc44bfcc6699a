//! Path-flow building blocks shared by the traffic encoders.

use std::collections::BTreeMap;

use crate::domain::demand::Pair;
use crate::domain::input::InputSet;
use crate::domain::model::Model;
use crate::domain::path::{path_edges, PathTable};
use crate::domain::polynomial::{Polynomial, Var};
use crate::domain::topology::{NodeId, Topology};
use crate::domain::VariableBounds;
use crate::error::Result;
use crate::port::{Encoding, RewriteGenerator};

/// Flow variables per pair and the load they put on every edge.
#[derive(Debug, Default)]
pub(crate) struct PathFlows {
    pub(crate) per_pair: BTreeMap<Pair, Vec<Var>>,
    pub(crate) edge_load: BTreeMap<(NodeId, NodeId), Polynomial>,
}

impl PathFlows {
    /// Create non-negative path flows for every pair with a demand expression,
    /// limited by `demand(pair)`.
    pub(crate) fn build<F>(
        model: &mut Model,
        rewrite: &mut dyn RewriteGenerator,
        paths: &PathTable,
        pairs: impl Iterator<Item = Pair>,
        mut demand: F,
    ) -> Result<Self>
    where
        F: FnMut(Pair) -> Polynomial,
    {
        let mut flows = Self::default();
        for pair in pairs {
            let candidates = paths.paths(pair);
            if candidates.is_empty() {
                continue;
            }
            let mut total = Polynomial::new();
            let mut vars = Vec::with_capacity(candidates.len());
            for (i, path) in candidates.iter().enumerate() {
                let f = rewrite.inner_variable(model, &format!("flow{pair}[{i}]"));
                rewrite.add_leq_zero(model, Polynomial::term(f, -1.0))?;
                total.add_term(f, 1.0);
                for edge in path_edges(path) {
                    flows.edge_load.entry(edge).or_default().add_term(f, 1.0);
                }
                vars.push(f);
            }
            rewrite.add_leq_zero(model, total - demand(pair))?;
            flows.per_pair.insert(pair, vars);
        }
        Ok(flows)
    }

    /// Total routed flow of `pair`.
    pub(crate) fn routed(&self, pair: Pair) -> Polynomial {
        self.per_pair
            .get(&pair)
            .map(|vars| vars.iter().map(|&v| Polynomial::term(v, 1.0)).sum())
            .unwrap_or_default()
    }

    /// Sum of every flow variable.
    pub(crate) fn total(&self) -> Polynomial {
        self.per_pair
            .values()
            .flatten()
            .map(|&v| Polynomial::term(v, 1.0))
            .sum()
    }
}

/// `load(e) + reserved(e) <= capacity(e)` for every loaded edge.
pub(crate) fn add_capacity_constraints(
    model: &mut Model,
    rewrite: &mut dyn RewriteGenerator,
    topology: &Topology,
    mut load: BTreeMap<(NodeId, NodeId), Polynomial>,
    reserved: BTreeMap<(NodeId, NodeId), Polynomial>,
) -> Result<usize> {
    for (edge, expr) in reserved {
        *load.entry(edge).or_default() += expr;
    }
    let mut added = 0;
    for ((src, dst), expr) in load {
        let capacity = topology.capacity(src, dst).unwrap_or(0.0);
        rewrite.add_leq_zero(model, expr + Polynomial::constant(-capacity))?;
        added += 1;
    }
    Ok(added)
}

/// Tie a fresh outer variable to `objective` and assemble the encoding.
pub(crate) fn finish_encoding(
    model: &mut Model,
    name: &str,
    inputs: &InputSet,
    objective: Polynomial,
    flows: BTreeMap<Pair, Polynomial>,
) -> Encoding {
    let objective_var = model.continuous(format!("{name}_objective"), VariableBounds::free());
    model.add_eq_zero(objective.clone() - Polynomial::term(objective_var, 1.0));
    Encoding {
        model_id: model.id(),
        objective_var,
        objective,
        inputs: inputs
            .iter()
            .map(|(pair, input)| (pair, input.expression()))
            .collect(),
        flows,
    }
}
