//! Linear expressions over model variables.
//!
//! A [`Polynomial`] is a sparse map `{variable -> coefficient}` plus a
//! constant term. It is the single currency for objectives and constraint
//! left-hand sides throughout the crate.

use std::collections::BTreeMap;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub};

/// Coefficients with a magnitude below this are dropped from expressions.
const COEFFICIENT_EPSILON: f64 = 1e-12;

/// Handle to a variable created in a [`Model`](super::model::Model).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Var(pub(crate) usize);

impl Var {
    /// Position of the variable inside its model.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Sparse linear expression `Σ coefficient·variable + constant`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Polynomial {
    terms: BTreeMap<Var, f64>,
    constant: f64,
}

impl Polynomial {
    /// The zero expression.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A constant expression.
    #[must_use]
    pub fn constant(value: f64) -> Self {
        Self {
            terms: BTreeMap::new(),
            constant: value,
        }
    }

    /// A single term `coefficient·var`.
    #[must_use]
    pub fn term(var: Var, coefficient: f64) -> Self {
        let mut poly = Self::new();
        poly.add_term(var, coefficient);
        poly
    }

    /// Builder form of [`Polynomial::add_term`].
    #[must_use]
    pub fn with_term(mut self, var: Var, coefficient: f64) -> Self {
        self.add_term(var, coefficient);
        self
    }

    /// Accumulate `coefficient·var` into the expression.
    pub fn add_term(&mut self, var: Var, coefficient: f64) {
        let entry = self.terms.entry(var).or_insert(0.0);
        *entry += coefficient;
        if entry.abs() < COEFFICIENT_EPSILON {
            self.terms.remove(&var);
        }
    }

    /// Accumulate a constant.
    pub fn add_constant(&mut self, value: f64) {
        self.constant += value;
    }

    /// Coefficient of `var`, zero when absent.
    #[must_use]
    pub fn coefficient(&self, var: Var) -> f64 {
        self.terms.get(&var).copied().unwrap_or(0.0)
    }

    /// The constant term.
    #[must_use]
    pub const fn constant_term(&self) -> f64 {
        self.constant
    }

    /// Iterate over `(variable, coefficient)` pairs in variable order.
    pub fn terms(&self) -> impl Iterator<Item = (Var, f64)> + '_ {
        self.terms.iter().map(|(v, c)| (*v, *c))
    }

    /// Iterate over the variables with a non-zero coefficient.
    pub fn vars(&self) -> impl Iterator<Item = Var> + '_ {
        self.terms.keys().copied()
    }

    /// Number of non-zero terms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// True when the expression has no variable terms.
    #[must_use]
    pub fn is_constant(&self) -> bool {
        self.terms.is_empty()
    }

    /// True when the expression is identically zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.terms.is_empty() && self.constant.abs() < COEFFICIENT_EPSILON
    }

    /// Same variable terms with the constant dropped.
    #[must_use]
    pub fn without_constant(&self) -> Self {
        Self {
            terms: self.terms.clone(),
            constant: 0.0,
        }
    }

    /// Keep only the terms whose variable satisfies `keep`; the constant is dropped.
    #[must_use]
    pub fn restrict<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(Var) -> bool,
    {
        Self {
            terms: self
                .terms
                .iter()
                .filter(|(v, _)| keep(**v))
                .map(|(v, c)| (*v, *c))
                .collect(),
            constant: 0.0,
        }
    }

    /// Multiply every coefficient and the constant by `factor`.
    #[must_use]
    pub fn scale(&self, factor: f64) -> Self {
        if factor.abs() < COEFFICIENT_EPSILON {
            return Self::new();
        }
        Self {
            terms: self.terms.iter().map(|(v, c)| (*v, c * factor)).collect(),
            constant: self.constant * factor,
        }
    }

    /// Evaluate the expression with `value_of` providing variable values.
    pub fn evaluate_with<F>(&self, mut value_of: F) -> f64
    where
        F: FnMut(Var) -> f64,
    {
        self.terms
            .iter()
            .fold(self.constant, |acc, (v, c)| acc + c * value_of(*v))
    }

    /// Evaluate the expression against a dense value vector indexed by variable.
    #[must_use]
    pub fn evaluate(&self, values: &[f64]) -> f64 {
        self.evaluate_with(|v| values.get(v.index()).copied().unwrap_or(0.0))
    }
}

impl From<Var> for Polynomial {
    fn from(var: Var) -> Self {
        Self::term(var, 1.0)
    }
}

impl From<f64> for Polynomial {
    fn from(value: f64) -> Self {
        Self::constant(value)
    }
}

impl AddAssign<&Polynomial> for Polynomial {
    fn add_assign(&mut self, rhs: &Polynomial) {
        for (var, coefficient) in rhs.terms() {
            self.add_term(var, coefficient);
        }
        self.constant += rhs.constant;
    }
}

impl AddAssign for Polynomial {
    fn add_assign(&mut self, rhs: Polynomial) {
        *self += &rhs;
    }
}

impl Add for Polynomial {
    type Output = Polynomial;

    fn add(mut self, rhs: Polynomial) -> Polynomial {
        self += &rhs;
        self
    }
}

impl Add<&Polynomial> for &Polynomial {
    type Output = Polynomial;

    fn add(self, rhs: &Polynomial) -> Polynomial {
        let mut out = self.clone();
        out += rhs;
        out
    }
}

impl Neg for Polynomial {
    type Output = Polynomial;

    fn neg(self) -> Polynomial {
        self.scale(-1.0)
    }
}

impl Neg for &Polynomial {
    type Output = Polynomial;

    fn neg(self) -> Polynomial {
        self.scale(-1.0)
    }
}

impl Sub for Polynomial {
    type Output = Polynomial;

    fn sub(self, rhs: Polynomial) -> Polynomial {
        self + (-rhs)
    }
}

impl Sub<&Polynomial> for &Polynomial {
    type Output = Polynomial;

    fn sub(self, rhs: &Polynomial) -> Polynomial {
        self + &(-rhs)
    }
}

impl Mul<f64> for Polynomial {
    type Output = Polynomial;

    fn mul(self, rhs: f64) -> Polynomial {
        self.scale(rhs)
    }
}

impl Mul<f64> for &Polynomial {
    type Output = Polynomial;

    fn mul(self, rhs: f64) -> Polynomial {
        self.scale(rhs)
    }
}

impl Sum for Polynomial {
    fn sum<I: Iterator<Item = Polynomial>>(iter: I) -> Self {
        iter.fold(Polynomial::new(), |acc, p| acc + p)
    }
}

impl fmt::Display for Polynomial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (var, coefficient) in self.terms() {
            if first {
                write!(f, "{coefficient}*{var}")?;
                first = false;
            } else if coefficient < 0.0 {
                write!(f, " - {}*{var}", -coefficient)?;
            } else {
                write!(f, " + {coefficient}*{var}")?;
            }
        }
        if first {
            write!(f, "{}", self.constant)
        } else if self.constant != 0.0 {
            write!(f, " + {}", self.constant)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_merges_terms_and_drops_zeros() {
        let x = Var(0);
        let y = Var(1);
        let a = Polynomial::term(x, 2.0).with_term(y, 1.0);
        let b = Polynomial::term(x, -2.0) + Polynomial::constant(3.0);

        let sum = a + b;

        assert_eq!(sum.coefficient(x), 0.0);
        assert_eq!(sum.coefficient(y), 1.0);
        assert_eq!(sum.len(), 1);
        assert_eq!(sum.constant_term(), 3.0);
    }

    #[test]
    fn test_negation_and_scaling() {
        let x = Var(3);
        let p = Polynomial::term(x, 1.5) + Polynomial::constant(-2.0);

        let neg = -&p;
        let doubled = &p * 2.0;

        assert_eq!(neg.coefficient(x), -1.5);
        assert_eq!(neg.constant_term(), 2.0);
        assert_eq!(doubled.coefficient(x), 3.0);
        assert_eq!(doubled.constant_term(), -4.0);
        // the original is untouched
        assert_eq!(p.coefficient(x), 1.5);
    }

    #[test]
    fn test_evaluate_uses_dense_values() {
        let p = Polynomial::term(Var(0), 2.0).with_term(Var(2), -1.0) + Polynomial::constant(1.0);
        assert_eq!(p.evaluate(&[3.0, 100.0, 4.0]), 3.0);
    }

    #[test]
    fn test_restrict_keeps_selected_vars() {
        let p = Polynomial::term(Var(0), 1.0).with_term(Var(1), 2.0) + Polynomial::constant(5.0);
        let r = p.restrict(|v| v == Var(1));
        assert_eq!(r.len(), 1);
        assert_eq!(r.coefficient(Var(1)), 2.0);
        assert_eq!(r.constant_term(), 0.0);
    }

    #[test]
    fn test_sum_of_polynomials() {
        let total: Polynomial = (0..4).map(|i| Polynomial::term(Var(i), 1.0)).sum();
        assert_eq!(total.len(), 4);
        assert_eq!(total.evaluate(&[1.0, 1.0, 1.0, 1.0]), 4.0);
    }
}
