//! Rewrite generator port.
//!
//! A rewrite generator receives the constraints of an inner optimization
//! problem one at a time and, once the objective is known, emits flat
//! constraints that force the inner variables to an optimal point of that
//! problem. The result lives entirely inside the caller's [`Model`].

use crate::domain::constraint::VariableBounds;
use crate::domain::model::{ConstraintId, Model};
use crate::domain::polynomial::{Polynomial, Var};
use crate::error::Result;

/// Turns an inner linear program into single-level constraints.
pub trait RewriteGenerator {
    /// Create a variable of the inner problem.
    ///
    /// Inner variables are free; sign restrictions are submitted as explicit
    /// constraints so that they take part in the optimality conditions.
    fn inner_variable(&mut self, model: &mut Model, name: &str) -> Var;

    /// Declare an outer variable that may appear in inner constraints.
    ///
    /// # Errors
    ///
    /// Fails when the variable is unsuitable for this rewrite.
    fn declare_parameter(&mut self, model: &Model, var: Var) -> Result<()>;

    /// Submit the inner constraint `expr = 0`.
    ///
    /// # Errors
    ///
    /// Fails when `expr` references undeclared variables.
    fn add_eq_zero(&mut self, model: &mut Model, expr: Polynomial) -> Result<ConstraintId>;

    /// Submit the inner constraint `expr <= 0`.
    ///
    /// # Errors
    ///
    /// Fails when `expr` references undeclared variables.
    fn add_leq_zero(&mut self, model: &mut Model, expr: Polynomial) -> Result<ConstraintId>;

    /// Emit the optimality system for maximizing `objective`.
    ///
    /// With `skip_extra` only primal feasibility is kept and the caller is
    /// expected to optimize the inner objective directly.
    ///
    /// # Errors
    ///
    /// Fails when `objective` references undeclared variables.
    fn add_maximization_constraints(
        &mut self,
        model: &mut Model,
        objective: &Polynomial,
        skip_extra: bool,
    ) -> Result<()>;
}

/// Bounds used for inner variables.
pub const INNER_VARIABLE_BOUNDS: VariableBounds = VariableBounds::free();
