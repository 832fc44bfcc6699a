//! Inner problem encoder port.
//!
//! An encoder builds the variables, constraints and objective of one inner
//! resource-allocation problem on top of a shared [`InputSet`], routing every
//! inner constraint through a [`RewriteGenerator`] so the optimality
//! conditions end up in the same flat model.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::demand::{DemandMatrix, Pair};
use crate::domain::input::InputSet;
use crate::domain::model::{Model, ModelId};
use crate::domain::polynomial::{Polynomial, Var};
use crate::domain::topology::Topology;
use crate::error::Result;

use super::rewrite::RewriteGenerator;
use super::solver::Solution;

/// Whether the inner problem must be solved to optimality inside the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Optimality {
    /// Emit the optimality system.
    Enforced,
    /// Primal feasibility only; the outer objective pushes it to optimality.
    Relaxed,
}

impl Optimality {
    /// The `skip_extra` flag handed to the rewrite.
    #[must_use]
    pub const fn skip_extra(self) -> bool {
        matches!(self, Self::Relaxed)
    }
}

/// One encoded inner problem.
#[derive(Debug, Clone)]
pub struct Encoding {
    /// Model the encoding was built in.
    pub model_id: ModelId,
    /// Variable tied to the full objective by an equality constraint.
    pub objective_var: Var,
    /// Full objective expression.
    pub objective: Polynomial,
    /// Input expression per pair, as read by this encoder.
    pub inputs: BTreeMap<Pair, Polynomial>,
    /// Routed flow per pair.
    pub flows: BTreeMap<Pair, Polynomial>,
}

/// Decoded solution of one inner problem.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct InnerSolution {
    /// Objective value.
    pub objective: f64,
    /// Demand per pair.
    pub demands: DemandMatrix,
    /// Routed flow per pair.
    pub flows: DemandMatrix,
}

/// Builds one inner problem.
pub trait Encoder: Send + Sync {
    /// Name for logs and results.
    fn name(&self) -> &str;

    /// Encode the inner problem against `inputs`.
    ///
    /// # Errors
    ///
    /// Returns configuration errors detected while encoding, and rewrite
    /// validation errors.
    fn encode(
        &self,
        model: &mut Model,
        inputs: &InputSet,
        rewrite: &mut dyn RewriteGenerator,
        optimality: Optimality,
    ) -> Result<Encoding>;

    /// The same encoder over another topology.
    ///
    /// # Errors
    ///
    /// Returns configuration errors when the encoder cannot be rebuilt.
    fn for_topology(&self, topology: Arc<Topology>) -> Result<Box<dyn Encoder>>;

    /// Decode a solver solution.
    fn extract(&self, encoding: &Encoding, solution: &Solution) -> InnerSolution {
        let mut demands: DemandMatrix = encoding
            .inputs
            .iter()
            .map(|(pair, expr)| (*pair, solution.evaluate(expr)))
            .collect();
        demands.clean();
        let mut flows: DemandMatrix = encoding
            .flows
            .iter()
            .map(|(pair, expr)| (*pair, solution.evaluate(expr)))
            .collect();
        flows.clean();
        InnerSolution {
            objective: solution.value(encoding.objective_var),
            demands,
            flows,
        }
    }

    /// Reject fixed demands the inner problem cannot represent.
    ///
    /// # Errors
    ///
    /// Implementations return a domain error describing the violation.
    fn check_inputs(&self, _demands: &DemandMatrix) -> Result<()> {
        Ok(())
    }
}
