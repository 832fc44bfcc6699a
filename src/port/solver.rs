//! Solver port for mixed-integer linear programming.
//!
//! Defines the contract the search engine uses against an opaque
//! optimization backend. The backend reads a [`Model`] owned by the caller;
//! constraint handles, right-hand side changes and removals all happen on the
//! model, so one model can be solved repeatedly with small edits in between.
//!
//! # Overview
//!
//! - [`Solver`]: Core LP/MILP solver interface
//! - [`SolveOutcome`]: Optimal, infeasible or unbounded
//! - [`Solution`]: Variable values of an optimal point

use tracing::debug;

use crate::domain::constraint::Constraint;
use crate::domain::model::Model;
use crate::domain::polynomial::{Polynomial, Var};
use crate::error::{Result, SolverError};

/// Direction of optimization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectiveSense {
    /// Maximize the objective.
    Maximize,
    /// Minimize the objective.
    Minimize,
}

/// Values of an optimal (or feasible) point.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    values: Vec<f64>,
    objective: f64,
}

impl Solution {
    /// Create a solution from dense variable values and the objective value.
    #[must_use]
    pub const fn new(values: Vec<f64>, objective: f64) -> Self {
        Self { values, objective }
    }

    /// Value of `var`, zero for variables the solution does not cover.
    #[must_use]
    pub fn value(&self, var: Var) -> f64 {
        self.values.get(var.index()).copied().unwrap_or(0.0)
    }

    /// Evaluate an expression at this point.
    #[must_use]
    pub fn evaluate(&self, expr: &Polynomial) -> f64 {
        expr.evaluate(&self.values)
    }

    /// Objective value reported by the solve.
    #[must_use]
    pub const fn objective(&self) -> f64 {
        self.objective
    }

    /// Dense variable values indexed by variable.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

/// Termination of a solve.
///
/// Infeasibility and unboundedness are ordinary outcomes, not errors: the
/// interval search and repair loops branch on them.
#[derive(Debug, Clone, PartialEq)]
pub enum SolveOutcome {
    /// Solver found an optimal (or, for feasibility checks, feasible) point.
    Optimal(Solution),
    /// No feasible point exists.
    Infeasible,
    /// Objective is unbounded.
    Unbounded,
}

impl SolveOutcome {
    /// Return `true` if the solver found a solution.
    #[must_use]
    pub const fn is_optimal(&self) -> bool {
        matches!(self, Self::Optimal(_))
    }

    /// The solution, if any.
    #[must_use]
    pub fn solution(self) -> Option<Solution> {
        match self {
            Self::Optimal(solution) => Some(solution),
            _ => None,
        }
    }

    /// Convert to a solution, treating the other outcomes as errors.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::Infeasible`] or [`SolverError::Unbounded`].
    pub fn into_result(self) -> Result<Solution> {
        match self {
            Self::Optimal(solution) => Ok(solution),
            Self::Infeasible => Err(SolverError::Infeasible.into()),
            Self::Unbounded => Err(SolverError::Unbounded.into()),
        }
    }
}

/// Mixed-integer linear programming solver.
///
/// Implementations wrap specific solver backends (HiGHS, CBC, etc.) and
/// translate a [`Model`] snapshot on every call.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; a single model must still only be
/// driven by one search session at a time.
pub trait Solver: Send + Sync {
    /// Return the solver name for logging and configuration.
    fn name(&self) -> &'static str;

    /// Optimize `objective` over `model`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails for reasons other than
    /// infeasibility or unboundedness.
    fn solve(
        &self,
        model: &Model,
        objective: &Polynomial,
        sense: ObjectiveSense,
    ) -> Result<SolveOutcome>;

    /// Maximize `objective` over `model`.
    ///
    /// # Errors
    ///
    /// See [`Solver::solve`].
    fn maximize(&self, model: &Model, objective: &Polynomial) -> Result<SolveOutcome> {
        self.solve(model, objective, ObjectiveSense::Maximize)
    }

    /// Minimize `objective` over `model`.
    ///
    /// # Errors
    ///
    /// See [`Solver::solve`].
    fn minimize(&self, model: &Model, objective: &Polynomial) -> Result<SolveOutcome> {
        self.solve(model, objective, ObjectiveSense::Minimize)
    }

    /// Find any point with `objective >= target`, without optimizing.
    ///
    /// The target constraint is added for the duration of the call only.
    ///
    /// # Errors
    ///
    /// See [`Solver::solve`].
    fn check_feasibility(
        &self,
        model: &mut Model,
        objective: &Polynomial,
        target: f64,
    ) -> Result<SolveOutcome> {
        let id = model.add_constraint(Constraint::geq(objective.clone(), target))?;
        let outcome = self.solve(model, &Polynomial::new(), ObjectiveSense::Maximize);
        model.remove_constraint(id)?;
        outcome
    }

    /// Up to `count` best distinct solutions of a maximization, in
    /// non-increasing objective order.
    ///
    /// Solutions differ in at least one of the binary variables in
    /// `distinct_over`; each found point is excluded with a no-good cut before
    /// the next solve. The cuts are removed again before returning.
    ///
    /// # Errors
    ///
    /// See [`Solver::solve`].
    fn maximize_distinct(
        &self,
        model: &mut Model,
        objective: &Polynomial,
        count: usize,
        distinct_over: &[Var],
    ) -> Result<Vec<Solution>> {
        let mut found = Vec::new();
        let mut cuts = Vec::new();
        let mut result = Ok(());
        while found.len() < count {
            match self.maximize(model, objective) {
                Ok(SolveOutcome::Optimal(solution)) => {
                    let mut cut = Polynomial::new();
                    for &var in distinct_over {
                        if solution.value(var) > 0.5 {
                            cut.add_term(var, -1.0);
                            cut.add_constant(1.0);
                        } else {
                            cut.add_term(var, 1.0);
                        }
                    }
                    found.push(solution);
                    match model.add_constraint(Constraint::geq(cut, 1.0)) {
                        Ok(id) => cuts.push(id),
                        Err(e) => {
                            result = Err(e.into());
                            break;
                        }
                    }
                }
                Ok(_) => break,
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        debug!(requested = count, found = found.len(), "Enumerated distinct solutions");
        for id in cuts {
            model.remove_constraint(id)?;
        }
        result.map(|()| found)
    }
}

#[cfg(test)]
pub mod tests {
    //! Solver test double shared by unit tests.

    use super::*;
    use crate::domain::constraint::VarKind;

    /// Brute-force solver over binary models with at most a handful of variables.
    ///
    /// Every variable must be binary; all assignments are enumerated.
    pub struct EnumeratingSolver;

    impl Solver for EnumeratingSolver {
        fn name(&self) -> &'static str {
            "enumerating"
        }

        fn solve(
            &self,
            model: &Model,
            objective: &Polynomial,
            sense: ObjectiveSense,
        ) -> Result<SolveOutcome> {
            let n = model.num_variables();
            assert!(
                model.variables().iter().all(|v| v.kind == VarKind::Binary) && n <= 16,
                "enumerating solver only handles small binary models"
            );
            let mut best: Option<Solution> = None;
            for mask in 0u32..(1 << n) {
                let values: Vec<f64> = (0..n).map(|i| f64::from((mask >> i) & 1)).collect();
                if model.max_violation(&values) > 1e-9 {
                    continue;
                }
                let value = objective.evaluate(&values);
                let better = best.as_ref().map_or(true, |b| match sense {
                    ObjectiveSense::Maximize => value > b.objective() + 1e-12,
                    ObjectiveSense::Minimize => value < b.objective() - 1e-12,
                });
                if better {
                    best = Some(Solution::new(values, value));
                }
            }
            Ok(best.map_or(SolveOutcome::Infeasible, SolveOutcome::Optimal))
        }
    }

    #[test]
    fn test_check_feasibility_removes_target_constraint() {
        let mut model = Model::new();
        let a = model.binary("a");
        let b = model.binary("b");
        model.add_leq_zero(Polynomial::term(a, 1.0).with_term(b, 1.0) + Polynomial::constant(-1.0));
        let objective = Polynomial::term(a, 1.0).with_term(b, 1.0);

        let feasible = EnumeratingSolver.check_feasibility(&mut model, &objective, 1.0).unwrap();
        let infeasible = EnumeratingSolver.check_feasibility(&mut model, &objective, 2.0).unwrap();

        assert!(feasible.is_optimal());
        assert_eq!(infeasible, SolveOutcome::Infeasible);
        assert_eq!(model.num_constraints(), 1);
    }

    #[test]
    fn test_maximize_distinct_enumerates_alternative_optima() {
        let mut model = Model::new();
        let a = model.binary("a");
        let b = model.binary("b");
        let c = model.binary("c");
        model.add_leq_zero(
            Polynomial::term(a, 1.0).with_term(b, 1.0).with_term(c, 1.0) + Polynomial::constant(-1.0),
        );
        let objective = Polynomial::term(a, 1.0).with_term(b, 1.0).with_term(c, 1.0);

        let solutions = EnumeratingSolver
            .maximize_distinct(&mut model, &objective, 5, &[a, b, c])
            .unwrap();

        // three optimal points with value 1, then the all-zero point
        assert_eq!(solutions.len(), 4);
        assert!(solutions[..3].iter().all(|s| (s.objective() - 1.0).abs() < 1e-9));
        assert_eq!(model.num_constraints(), 1);
    }

    #[test]
    fn test_outcome_into_result() {
        assert!(SolveOutcome::Infeasible.into_result().is_err());
        let ok = SolveOutcome::Optimal(Solution::new(vec![1.0], 1.0)).into_result().unwrap();
        assert_eq!(ok.value(Var(0)), 1.0);
    }
}
