//! Quantized primal-dual rewrite.
//!
//! Writing each inner constraint as `a_i x <= b_i(p)` with `b_i` affine in the
//! binary parameters `p`, optimality of `x` is expressed as
//!
//! ```text
//! Aᵀλ + Eᵀμ = c,  λ >= 0              dual feasibility
//! Σ λ_i b_i(p) + Σ μ_j d_j(p) <= cᵀx   strong duality
//! ```
//!
//! Every product `dual · p_k` in the dual objective becomes an auxiliary `w`
//! with the exact McCormick envelope for a binary `p_k` and a dual bounded by
//! `[L, M]`: `L p <= w <= M p`, `dual - M(1 - p) <= w <= dual - L(1 - p)`.

use std::collections::HashMap;

use tracing::debug;

use super::InnerProblem;
use crate::domain::constraint::VariableBounds;
use crate::domain::model::Model;
use crate::domain::polynomial::{Polynomial, Var};
use crate::error::Result;

/// Primal-dual rewrite over binary level selectors.
#[derive(Debug)]
pub struct PrimalDualRewrite {
    pub(crate) problem: InnerProblem,
}

impl PrimalDualRewrite {
    /// Create an empty rewrite; `big_m` bounds every dual variable.
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
        let (lambdas, mus) = self.problem.dual_variables(model, "pd");
        let feasibility = self
            .problem
            .add_stationarity(model, &objective, &lambdas, &mus);

        let mut products = Products::new(m);
        // Σ dual · b(p) with b(p) = -(parameter part of the row)
        let mut dual_objective = Polynomial::new();
        let rows = self
            .problem
            .inequalities
            .iter()
            .zip(lambdas.iter().map(|&l| (l, 0.0)))
            .chain(self.problem.equalities.iter().zip(mus.iter().map(|&mu| (mu, -m))));
        for (row, (dual, lower)) in rows {
            let rhs = -self.problem.parameter_part(row);
            dual_objective.add_term(dual, rhs.constant_term());
            for (param, coefficient) in rhs.terms() {
                let w = products.get(model, dual, lower, param);
                dual_objective.add_term(w, coefficient);
            }
        }
        model.add_leq_zero(dual_objective - objective);

        debug!(
            inequalities = lambdas.len(),
            equalities = mus.len(),
            dual_feasibility = feasibility,
            products = products.len(),
            big_m = m,
            "Added primal-dual conditions"
        );
        Ok(())
    }
}

/// Linearized `dual · binary` products, one auxiliary per distinct pair.
struct Products {
    big_m: f64,
    cache: HashMap<(Var, Var), Var>,
}

impl Products {
    fn new(big_m: f64) -> Self {
        Self {
            big_m,
            cache: HashMap::new(),
        }
    }

    fn len(&self) -> usize {
        self.cache.len()
    }

    fn get(&mut self, model: &mut Model, dual: Var, lower: f64, binary: Var) -> Var {
        if let Some(&w) = self.cache.get(&(dual, binary)) {
            return w;
        }
        let m = self.big_m;
        let w = model.continuous(
            format!("pd_w[{},{}]", dual.index(), binary.index()),
            VariableBounds::bounded(lower.min(0.0), m),
        );
        // L p <= w <= M p
        model.add_leq_zero(Polynomial::term(binary, lower).with_term(w, -1.0));
        model.add_leq_zero(Polynomial::term(w, 1.0).with_term(binary, -m));
        // dual - M(1 - p) <= w
        model.add_leq_zero(
            Polynomial::term(dual, 1.0).with_term(binary, m).with_term(w, -1.0) + Polynomial::constant(-m),
        );
        // w <= dual - L(1 - p)
        model.add_leq_zero(
            Polynomial::term(w, 1.0).with_term(dual, -1.0).with_term(binary, -lower)
                + Polynomial::constant(lower),
        );
        self.cache.insert((dual, binary), w);
        w
    }
}
