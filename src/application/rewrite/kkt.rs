//! Stationarity (KKT) rewrite.
//!
//! For `max cᵀx s.t. g_i(x, p) <= 0, h_j(x, p) = 0` the optimality system is
//!
//! ```text
//! Σ λ_i ∇g_i + Σ μ_j ∇h_j = c          stationarity
//! λ_i >= 0                             dual feasibility
//! λ_i · g_i = 0                        complementary slackness
//! ```
//!
//! The complementarity products are replaced by a binary `z_i` per inequality:
//! `λ_i <= M z_i` and `-g_i <= M (1 - z_i)`.

use tracing::debug;

use super::InnerProblem;
use crate::domain::model::Model;
use crate::domain::polynomial::Polynomial;
use crate::error::Result;

/// Stationarity rewrite with big-M complementary slackness.
#[derive(Debug)]
pub struct KktRewrite {
    pub(crate) problem: InnerProblem,
}

impl KktRewrite {
    /// Create an empty rewrite using `big_m` for the complementarity bounds.
    #[must_use]
    pub fn new(big_m: f64) -> Self {
        Self {
            problem: InnerProblem::new(big_m),
        }
    }

    pub(crate) fn add_maximization_constraints(
        &mut self,
        model: &mut Model,
        objective: &Polynomial,
        skip_extra: bool,
    ) -> Result<()> {
        let objective = self.problem.inner_objective(model, objective)?;
        if skip_extra {
            return Ok(());
        }

        let m = self.problem.big_m;
        let (lambdas, mus) = self.problem.dual_variables(model, "kkt");
        let stationarity = self
            .problem
            .add_stationarity(model, &objective, &lambdas, &mus);

        for (i, (g, &lambda)) in self.problem.inequalities.iter().zip(&lambdas).enumerate() {
            let z = model.binary(format!("kkt_z[{i}]"));
            model.add_leq_zero(Polynomial::term(lambda, 1.0).with_term(z, -m));
            model.add_leq_zero(-g.clone() + Polynomial::term(z, m) + Polynomial::constant(-m));
        }

        debug!(
            inequalities = lambdas.len(),
            equalities = mus.len(),
            stationarity,
            big_m = m,
            "Added KKT conditions"
        );
        Ok(())
    }
}
