//! Bilevel to single-level rewrites.
//!
//! Both rewrites collect the constraints of one inner linear program and, once
//! its objective is known, add flat constraints forcing the inner variables to
//! an optimal point. They differ in how they deal with outer parameters that
//! appear in the inner right-hand sides:
//!
//! - [`KktRewrite`]: stationarity plus big-M complementary slackness. Parameters
//!   may be continuous since they never multiply a dual variable.
//! - [`PrimalDualRewrite`]: dual feasibility plus strong duality. The dual
//!   objective multiplies duals with parameters, which is linearized exactly
//!   and therefore requires binary parameters (quantized level selectors).

mod kkt;
mod primal_dual;

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::domain::constraint::VariableBounds;
use crate::domain::model::{ConstraintId, Model};
use crate::domain::polynomial::{Polynomial, Var};
use crate::domain::VarKind;
use crate::error::{ConfigError, Result};
use crate::port::{RewriteGenerator, INNER_VARIABLE_BOUNDS};

pub use kkt::KktRewrite;
pub use primal_dual::PrimalDualRewrite;

/// Rewrite strategy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteKind {
    /// Stationarity conditions with continuous inputs.
    Kkt,
    /// Quantized levels with primal-dual optimality.
    PrimalDual,
}

impl RewriteKind {
    /// True when inputs are represented by level selectors.
    #[must_use]
    pub const fn uses_levels(self) -> bool {
        matches!(self, Self::PrimalDual)
    }
}

impl std::fmt::Display for RewriteKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Kkt => write!(f, "kkt"),
            Self::PrimalDual => write!(f, "primal_dual"),
        }
    }
}

/// A rewrite for one inner problem.
#[derive(Debug)]
pub enum Rewrite {
    Kkt(KktRewrite),
    PrimalDual(PrimalDualRewrite),
}

impl Rewrite {
    /// Create an empty rewrite of the given kind.
    #[must_use]
    pub fn new(kind: RewriteKind, big_m: f64) -> Self {
        match kind {
            RewriteKind::Kkt => Self::Kkt(KktRewrite::new(big_m)),
            RewriteKind::PrimalDual => Self::PrimalDual(PrimalDualRewrite::new(big_m)),
        }
    }

    /// Create a rewrite and declare `parameters` on it.
    ///
    /// # Errors
    ///
    /// Returns the first parameter validation error.
    pub fn with_parameters(
        kind: RewriteKind,
        big_m: f64,
        model: &Model,
        parameters: &[Var],
    ) -> Result<Self> {
        let mut rewrite = Self::new(kind, big_m);
        for &var in parameters {
            rewrite.declare_parameter(model, var)?;
        }
        Ok(rewrite)
    }

    /// Kind of this rewrite.
    #[must_use]
    pub const fn kind(&self) -> RewriteKind {
        match self {
            Self::Kkt(_) => RewriteKind::Kkt,
            Self::PrimalDual(_) => RewriteKind::PrimalDual,
        }
    }

    fn inner(&mut self) -> &mut InnerProblem {
        match self {
            Self::Kkt(r) => &mut r.problem,
            Self::PrimalDual(r) => &mut r.problem,
        }
    }
}

impl RewriteGenerator for Rewrite {
    fn inner_variable(&mut self, model: &mut Model, name: &str) -> Var {
        self.inner().inner_variable(model, name)
    }

    fn declare_parameter(&mut self, model: &Model, var: Var) -> Result<()> {
        let require_binary = self.kind() == RewriteKind::PrimalDual;
        self.inner().declare_parameter(model, var, require_binary)
    }

    fn add_eq_zero(&mut self, model: &mut Model, expr: Polynomial) -> Result<ConstraintId> {
        self.inner().add_eq_zero(model, expr)
    }

    fn add_leq_zero(&mut self, model: &mut Model, expr: Polynomial) -> Result<ConstraintId> {
        self.inner().add_leq_zero(model, expr)
    }

    fn add_maximization_constraints(
        &mut self,
        model: &mut Model,
        objective: &Polynomial,
        skip_extra: bool,
    ) -> Result<()> {
        match self {
            Self::Kkt(r) => r.add_maximization_constraints(model, objective, skip_extra),
            Self::PrimalDual(r) => r.add_maximization_constraints(model, objective, skip_extra),
        }
    }
}

/// The recorded inner linear program shared by both rewrites.
#[derive(Debug)]
pub(crate) struct InnerProblem {
    pub(crate) big_m: f64,
    inner: BTreeSet<Var>,
    parameters: HashSet<Var>,
    /// `g(x, p) <= 0`
    pub(crate) inequalities: Vec<Polynomial>,
    /// `h(x, p) = 0`
    pub(crate) equalities: Vec<Polynomial>,
}

impl InnerProblem {
    pub(crate) fn new(big_m: f64) -> Self {
        Self {
            big_m,
            inner: BTreeSet::new(),
            parameters: HashSet::new(),
            inequalities: Vec::new(),
            equalities: Vec::new(),
        }
    }

    fn inner_variable(&mut self, model: &mut Model, name: &str) -> Var {
        let var = model.continuous(name, INNER_VARIABLE_BOUNDS);
        self.inner.insert(var);
        var
    }

    fn declare_parameter(&mut self, model: &Model, var: Var, require_binary: bool) -> Result<()> {
        let name = variable_name(model, var);
        if self.inner.contains(&var) {
            return Err(ConfigError::ParameterIsInner { name }.into());
        }
        let kind = model.get_variable(var).map(|v| v.kind);
        if require_binary && kind != Some(VarKind::Binary) {
            return Err(ConfigError::NonBinaryParameter { name }.into());
        }
        self.parameters.insert(var);
        Ok(())
    }

    fn add_eq_zero(&mut self, model: &mut Model, expr: Polynomial) -> Result<ConstraintId> {
        self.check(model, &expr)?;
        let id = model.add_eq_zero(expr.clone());
        self.equalities.push(expr);
        Ok(id)
    }

    fn add_leq_zero(&mut self, model: &mut Model, expr: Polynomial) -> Result<ConstraintId> {
        self.check(model, &expr)?;
        let id = model.add_leq_zero(expr.clone());
        self.inequalities.push(expr);
        Ok(id)
    }

    fn check(&self, model: &Model, expr: &Polynomial) -> Result<()> {
        match expr
            .vars()
            .find(|v| !self.inner.contains(v) && !self.parameters.contains(v))
        {
            Some(var) => Err(ConfigError::UndeclaredVariable {
                name: variable_name(model, var),
            }
            .into()),
            None => Ok(()),
        }
    }

    /// Inner part of the objective; parameter terms are constants for the inner problem.
    pub(crate) fn inner_objective(&self, model: &Model, objective: &Polynomial) -> Result<Polynomial> {
        self.check(model, objective)?;
        Ok(self.inner_part(objective))
    }

    pub(crate) fn inner_part(&self, expr: &Polynomial) -> Polynomial {
        expr.restrict(|v| self.inner.contains(&v))
    }

    /// Parameter terms and constant of `expr`.
    pub(crate) fn parameter_part(&self, expr: &Polynomial) -> Polynomial {
        let mut part = expr.restrict(|v| self.parameters.contains(&v));
        part.add_constant(expr.constant_term());
        part
    }

    pub(crate) fn inner_variables(&self) -> impl Iterator<Item = Var> + '_ {
        self.inner.iter().copied()
    }

    /// One dual per inequality in `[0, M]` and per equality in `[-M, M]`.
    pub(crate) fn dual_variables(&self, model: &mut Model, prefix: &str) -> (Vec<Var>, Vec<Var>) {
        let m = self.big_m;
        let lambdas = (0..self.inequalities.len())
            .map(|i| model.continuous(format!("{prefix}_lambda[{i}]"), VariableBounds::bounded(0.0, m)))
            .collect();
        let mus = (0..self.equalities.len())
            .map(|j| model.continuous(format!("{prefix}_mu[{j}]"), VariableBounds::bounded(-m, m)))
            .collect();
        (lambdas, mus)
    }

    /// `Σ λ_i ∂g_i/∂v + Σ μ_j ∂h_j/∂v = c_v` for every inner variable `v`.
    pub(crate) fn add_stationarity(
        &self,
        model: &mut Model,
        objective: &Polynomial,
        lambdas: &[Var],
        mus: &[Var],
    ) -> usize {
        let mut added = 0;
        for v in self.inner_variables() {
            let mut expr = Polynomial::constant(-objective.coefficient(v));
            for (g, &lambda) in self.inequalities.iter().zip(lambdas) {
                expr.add_term(lambda, g.coefficient(v));
            }
            for (h, &mu) in self.equalities.iter().zip(mus) {
                expr.add_term(mu, h.coefficient(v));
            }
            if expr.is_zero() {
                continue;
            }
            model.add_eq_zero(expr);
            added += 1;
        }
        added
    }
}

fn variable_name(model: &Model, var: Var) -> String {
    model
        .get_variable(var)
        .map_or_else(|| format!("#{}", var.index()), |v| v.name.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_undeclared_variable_rejected() {
        let mut model = Model::new();
        let outer = model.continuous("outer", VariableBounds::non_negative());
        let mut rewrite = Rewrite::new(RewriteKind::Kkt, 100.0);
        let x = rewrite.inner_variable(&mut model, "x");

        let err = rewrite
            .add_leq_zero(&mut model, Polynomial::term(x, 1.0) - Polynomial::term(outer, 1.0))
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Config(ConfigError::UndeclaredVariable { ref name }) if name == "outer"
        ));
    }

    #[test]
    fn test_primal_dual_requires_binary_parameters() {
        let mut model = Model::new();
        let demand = model.continuous("demand", VariableBounds::bounded(0.0, 10.0));
        let mut rewrite = Rewrite::new(RewriteKind::PrimalDual, 100.0);

        let err = rewrite.declare_parameter(&model, demand).unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::NonBinaryParameter { .. })));

        let mut kkt = Rewrite::new(RewriteKind::Kkt, 100.0);
        assert!(kkt.declare_parameter(&model, demand).is_ok());
    }

    #[test]
    fn test_inner_variable_cannot_be_parameter() {
        let mut model = Model::new();
        let mut rewrite = Rewrite::new(RewriteKind::Kkt, 100.0);
        let x = rewrite.inner_variable(&mut model, "x");

        let err = rewrite.declare_parameter(&model, x).unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::ParameterIsInner { .. })));
    }

    #[test]
    fn test_objective_with_undeclared_variable_rejected() {
        let mut model = Model::new();
        let stray = model.binary("stray");
        let mut rewrite = Rewrite::new(RewriteKind::PrimalDual, 10.0);
        let x = rewrite.inner_variable(&mut model, "x");
        rewrite.add_leq_zero(&mut model, Polynomial::term(x, 1.0) + Polynomial::constant(-1.0)).unwrap();

        let objective = Polynomial::term(x, 1.0).with_term(stray, 1.0);
        assert!(rewrite.add_maximization_constraints(&mut model, &objective, false).is_err());
    }

    #[test]
    fn test_skip_extra_keeps_primal_only() {
        let mut model = Model::new();
        let mut rewrite = Rewrite::new(RewriteKind::Kkt, 10.0);
        let x = rewrite.inner_variable(&mut model, "x");
        rewrite.add_leq_zero(&mut model, Polynomial::term(x, 1.0) + Polynomial::constant(-1.0)).unwrap();
        let before = (model.num_variables(), model.num_constraints());

        rewrite
            .add_maximization_constraints(&mut model, &Polynomial::term(x, 1.0), true)
            .unwrap();

        assert_eq!((model.num_variables(), model.num_constraints()), before);
    }

    #[test]
    fn test_parameter_part_keeps_constant() {
        let mut model = Model::new();
        let p = model.binary("p");
        let mut problem = InnerProblem::new(10.0);
        let x = problem.inner_variable(&mut model, "x");
        problem.declare_parameter(&model, p, true).unwrap();

        let expr = Polynomial::term(x, 2.0).with_term(p, -3.0) + Polynomial::constant(4.0);
        let part = problem.parameter_part(&expr);

        assert_eq!(part.coefficient(p), -3.0);
        assert_eq!(part.coefficient(x), 0.0);
        assert_eq!(part.constant_term(), 4.0);
    }
}
