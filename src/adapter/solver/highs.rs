//! HiGHS solver implementation via good_lp.
//!
//! HiGHS is a high-performance open-source linear/mixed-integer programming solver.
//! The model is translated from scratch on every call, which keeps constraint
//! handles, rhs changes and removals on the crate side.

use std::time::{Duration, Instant};

use good_lp::solvers::highs::highs;
use good_lp::{
    constraint, variable, variables, Expression, ResolutionError, Solution as _, SolverModel,
    Variable,
};
use tracing::{debug, trace};

use crate::domain::constraint::{ConstraintSense, VarKind};
use crate::domain::model::Model;
use crate::domain::polynomial::Polynomial;
use crate::error::{Result, SolverError};
use crate::port::{ObjectiveSense, Solution, SolveOutcome, Solver};

/// Feasibility tolerance for models without variables.
const EMPTY_MODEL_TOLERANCE: f64 = 1e-9;

/// HiGHS-based LP/MILP solver.
#[derive(Debug, Default, Clone)]
pub struct HiGHSSolver {
    time_limit: Option<Duration>,
}

impl HiGHSSolver {
    /// Create a new HiGHS solver instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop each solve after `limit` and return the incumbent.
    #[must_use]
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }
}

impl Solver for HiGHSSolver {
    fn name(&self) -> &'static str {
        "highs"
    }

    fn solve(
        &self,
        model: &Model,
        objective: &Polynomial,
        sense: ObjectiveSense,
    ) -> Result<SolveOutcome> {
        let started = Instant::now();
        let outcome = solve_with_good_lp(model, objective, sense, self.time_limit)?;
        debug!(
            variables = model.num_variables(),
            constraints = model.num_constraints(),
            optimal = outcome.is_optimal(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "HiGHS solve finished"
        );
        Ok(outcome)
    }
}

/// Internal solver implementation using good_lp.
fn solve_with_good_lp(
    model: &Model,
    objective: &Polynomial,
    sense: ObjectiveSense,
    time_limit: Option<Duration>,
) -> Result<SolveOutcome> {
    let n = model.num_variables();

    // Handle empty problem
    if n == 0 {
        if model.max_violation(&[]) > EMPTY_MODEL_TOLERANCE {
            return Ok(SolveOutcome::Infeasible);
        }
        return Ok(SolveOutcome::Optimal(Solution::new(
            vec![],
            objective.constant_term(),
        )));
    }

    // Create variables
    let mut vars = variables!();
    let mut var_list = Vec::with_capacity(n);

    for info in model.variables() {
        let mut v = variable();

        match info.kind {
            VarKind::Binary => v = v.binary(),
            VarKind::Integer => v = v.integer(),
            VarKind::Continuous => {}
        }

        // Apply bounds
        if let Some(lb) = info.bounds.lower {
            v = v.min(lb);
        }
        if let Some(ub) = info.bounds.upper {
            v = v.max(ub);
        }

        var_list.push(vars.add(v));
    }

    let to_expression = |poly: &Polynomial| -> Expression {
        poly.terms()
            .map(|(var, c)| c * var_list[var.index()])
            .sum::<Expression>()
            + poly.constant_term()
    };

    let goal = to_expression(objective);
    let mut problem = match sense {
        ObjectiveSense::Maximize => vars.maximise(&goal).using(highs),
        ObjectiveSense::Minimize => vars.minimise(&goal).using(highs),
    };
    if let Some(limit) = time_limit {
        problem = problem.set_option("time_limit", limit.as_secs_f64());
    }

    // Add constraints
    for (_, constr) in model.constraints() {
        let lhs = to_expression(&constr.expr);
        let rhs = constr.rhs;

        match constr.sense {
            ConstraintSense::LessEqual => {
                problem = problem.with(constraint!(lhs <= rhs));
            }
            ConstraintSense::Equal => {
                problem = problem.with(constraint!(lhs == rhs));
            }
        }
    }

    // Solve
    match problem.solve() {
        Ok(solution) => {
            let values: Vec<f64> = var_list.iter().map(|v: &Variable| solution.value(*v)).collect();

            // Re-evaluate objective with the solved values
            let objective_value = objective.evaluate(&values);
            trace!(objective = objective_value, "HiGHS returned a solution");

            Ok(SolveOutcome::Optimal(Solution::new(values, objective_value)))
        }
        Err(ResolutionError::Infeasible) => Ok(SolveOutcome::Infeasible),
        Err(ResolutionError::Unbounded) => Ok(SolveOutcome::Unbounded),
        Err(e) => Err(SolverError::Backend(e.to_string()).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::constraint::{Constraint, VariableBounds};

    #[test]
    fn test_solver_name() {
        let solver = HiGHSSolver::new();
        assert_eq!(solver.name(), "highs");
    }

    #[test]
    fn test_simple_lp() {
        // Minimize: x + y
        // Subject to: x + y >= 1
        //            x, y >= 0
        let mut model = Model::new();
        let x = model.continuous("x", VariableBounds::non_negative());
        let y = model.continuous("y", VariableBounds::non_negative());
        let sum = Polynomial::term(x, 1.0).with_term(y, 1.0);
        model.add_constraint(Constraint::geq(sum.clone(), 1.0)).unwrap();

        let solution = HiGHSSolver::new()
            .minimize(&model, &sum)
            .unwrap()
            .into_result()
            .unwrap();

        assert!(
            (solution.objective() - 1.0).abs() < 1e-6,
            "Sum should be ~1, got {}",
            solution.objective()
        );
    }

    #[test]
    fn test_binary_milp() {
        // Maximize: x + y
        // Subject to: x + y <= 1
        //            x, y in {0, 1}
        let mut model = Model::new();
        let x = model.binary("x");
        let y = model.binary("y");
        let sum = Polynomial::term(x, 1.0).with_term(y, 1.0);
        model.add_leq_zero(sum.clone() + Polynomial::constant(-1.0));

        let solution = HiGHSSolver::new()
            .maximize(&model, &sum)
            .unwrap()
            .into_result()
            .unwrap();

        assert!((solution.objective() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_rhs_change_and_removal_between_solves() {
        let mut model = Model::new();
        let x = model.continuous("x", VariableBounds::non_negative());
        let objective = Polynomial::term(x, 1.0);
        let ub = model.add_leq_zero(Polynomial::term(x, 1.0) + Polynomial::constant(-2.0));
        model.add_leq_zero(Polynomial::term(x, 1.0) + Polynomial::constant(-10.0));
        let solver = HiGHSSolver::new();

        let first = solver.maximize(&model, &objective).unwrap().into_result().unwrap();
        model.set_rhs(ub, 4.0).unwrap();
        let second = solver.maximize(&model, &objective).unwrap().into_result().unwrap();
        model.remove_constraint(ub).unwrap();
        let third = solver.maximize(&model, &objective).unwrap().into_result().unwrap();

        assert!((first.value(x) - 2.0).abs() < 1e-6);
        assert!((second.value(x) - 4.0).abs() < 1e-6);
        assert!((third.value(x) - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_infeasible_is_an_outcome() {
        let mut model = Model::new();
        let x = model.continuous("x", VariableBounds::bounded(0.0, 1.0));
        model.add_constraint(Constraint::geq(Polynomial::term(x, 1.0), 2.0)).unwrap();

        let outcome = HiGHSSolver::new()
            .maximize(&model, &Polynomial::term(x, 1.0))
            .unwrap();

        assert_eq!(outcome, SolveOutcome::Infeasible);
    }

    #[test]
    fn test_empty_problem() {
        let model = Model::new();
        let outcome = HiGHSSolver::new()
            .maximize(&model, &Polynomial::constant(3.0))
            .unwrap();

        assert_eq!(outcome.solution().map(|s| s.objective()), Some(3.0));
    }
}
