//! Mathematical constraint types for optimization.
//!
//! Constraints are stored as `expr {=, <=} rhs` where `expr` carries no
//! constant term; the constant of a submitted expression is folded into the
//! right-hand side so it can later be changed in place.

use serde::{Deserialize, Serialize};

use super::polynomial::Polynomial;

/// A single linear constraint: `expr {<=, =} rhs`.
#[derive(Debug, Clone)]
pub struct Constraint {
    /// Variable terms of the left-hand side.
    pub expr: Polynomial,
    /// Constraint sense.
    pub sense: ConstraintSense,
    /// Right-hand side value.
    pub rhs: f64,
    /// Optional name for later lookup.
    pub name: Option<String>,
}

impl Constraint {
    /// `expr <= 0`, with the constant of `expr` moved to the right-hand side.
    #[must_use]
    pub fn leq_zero(expr: Polynomial) -> Self {
        Self::split(expr, ConstraintSense::LessEqual)
    }

    /// `expr = 0`, with the constant of `expr` moved to the right-hand side.
    #[must_use]
    pub fn eq_zero(expr: Polynomial) -> Self {
        Self::split(expr, ConstraintSense::Equal)
    }

    /// `lhs >= rhs`, stored as `-lhs <= -rhs`.
    #[must_use]
    pub fn geq(lhs: Polynomial, rhs: f64) -> Self {
        Self::leq_zero(Polynomial::constant(rhs) - lhs)
    }

    /// Attach a name to the constraint.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Signed violation for the given variable values; `<= 0` means satisfied.
    #[must_use]
    pub fn violation(&self, values: &[f64]) -> f64 {
        let lhs = self.expr.evaluate(values);
        match self.sense {
            ConstraintSense::LessEqual => lhs - self.rhs,
            ConstraintSense::Equal => (lhs - self.rhs).abs(),
        }
    }

    fn split(expr: Polynomial, sense: ConstraintSense) -> Self {
        let rhs = -expr.constant_term();
        Self {
            expr: expr.without_constant(),
            sense,
            rhs,
            name: None,
        }
    }
}

/// Constraint sense (comparison operator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintSense {
    /// Less than or equal (<=).
    LessEqual,
    /// Equal (=).
    Equal,
}

/// Domain of a decision variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarKind {
    /// Real-valued.
    Continuous,
    /// Integer-valued.
    Integer,
    /// Integer in {0, 1}.
    Binary,
}

/// Bounds on a variable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VariableBounds {
    /// Lower bound (None = -infinity).
    pub lower: Option<f64>,
    /// Upper bound (None = +infinity).
    pub upper: Option<f64>,
}

impl Default for VariableBounds {
    fn default() -> Self {
        Self {
            lower: Some(0.0),
            upper: None,
        }
    }
}

impl VariableBounds {
    /// Binary variable bounds [0, 1].
    #[must_use]
    pub const fn binary() -> Self {
        Self {
            lower: Some(0.0),
            upper: Some(1.0),
        }
    }

    /// Free variable (no bounds).
    #[must_use]
    pub const fn free() -> Self {
        Self {
            lower: None,
            upper: None,
        }
    }

    /// Non-negative variable [0, +inf).
    #[must_use]
    pub fn non_negative() -> Self {
        Self::default()
    }

    /// Bounded variable [lower, upper].
    #[must_use]
    pub const fn bounded(lower: f64, upper: f64) -> Self {
        Self {
            lower: Some(lower),
            upper: Some(upper),
        }
    }

    /// True when neither bound is set.
    #[must_use]
    pub const fn is_free(&self) -> bool {
        self.lower.is_none() && self.upper.is_none()
    }
}
