//! Flat mixed-integer linear model.
//!
//! The [`Model`] is the mutable state a search session builds up against one
//! solver: variables, constraints addressed by handle or name, right-hand
//! side changes and removals. Solvers read it through
//! [`Solver`](crate::port::Solver) without taking ownership, so the same model
//! can be re-solved after small edits.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::constraint::{Constraint, VarKind, VariableBounds};
use super::error::DomainError;
use super::polynomial::{Polynomial, Var};

static NEXT_MODEL_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a model instance.
///
/// Encodings remember the model they were built against so that mixing two
/// sessions can be detected by comparing ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelId(u64);

/// Handle to a constraint inside a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstraintId(usize);

impl ConstraintId {
    /// Build a handle from its raw index.
    #[must_use]
    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    /// Raw index of the handle.
    #[must_use]
    pub const fn raw(self) -> usize {
        self.0
    }
}

/// Metadata for one variable.
#[derive(Debug, Clone)]
pub struct VariableInfo {
    /// Human-readable name.
    pub name: String,
    /// Variable domain.
    pub kind: VarKind,
    /// Lower/upper bounds.
    pub bounds: VariableBounds,
}

/// Variables and constraints of a flat optimization model.
#[derive(Debug, Clone)]
pub struct Model {
    id: ModelId,
    variables: Vec<VariableInfo>,
    constraints: Vec<Option<Constraint>>,
    names: HashMap<String, ConstraintId>,
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

impl Model {
    /// Create an empty model with a fresh identity.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: ModelId(NEXT_MODEL_ID.fetch_add(1, Ordering::Relaxed)),
            variables: Vec::new(),
            constraints: Vec::new(),
            names: HashMap::new(),
        }
    }

    /// Identity of this model.
    #[must_use]
    pub const fn id(&self) -> ModelId {
        self.id
    }

    /// Create a variable.
    pub fn add_variable(
        &mut self,
        name: impl Into<String>,
        kind: VarKind,
        bounds: VariableBounds,
    ) -> Var {
        let bounds = match kind {
            VarKind::Binary => VariableBounds::binary(),
            _ => bounds,
        };
        self.variables.push(VariableInfo {
            name: name.into(),
            kind,
            bounds,
        });
        Var(self.variables.len() - 1)
    }

    /// Create a continuous variable.
    pub fn continuous(&mut self, name: impl Into<String>, bounds: VariableBounds) -> Var {
        self.add_variable(name, VarKind::Continuous, bounds)
    }

    /// Create a binary variable.
    pub fn binary(&mut self, name: impl Into<String>) -> Var {
        self.add_variable(name, VarKind::Binary, VariableBounds::binary())
    }

    /// Metadata of a variable.
    ///
    /// # Panics
    ///
    /// Panics if `var` was created by a different model.
    #[must_use]
    pub fn variable(&self, var: Var) -> &VariableInfo {
        &self.variables[var.index()]
    }

    /// Metadata of a variable, `None` for foreign handles.
    #[must_use]
    pub fn get_variable(&self, var: Var) -> Option<&VariableInfo> {
        self.variables.get(var.index())
    }

    /// All variables in creation order.
    #[must_use]
    pub fn variables(&self) -> &[VariableInfo] {
        &self.variables
    }

    /// Number of variables.
    #[must_use]
    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    /// Number of live constraints.
    #[must_use]
    pub fn num_constraints(&self) -> usize {
        self.constraints.iter().filter(|c| c.is_some()).count()
    }

    /// Iterate over the live constraints.
    pub fn constraints(&self) -> impl Iterator<Item = (ConstraintId, &Constraint)> {
        self.constraints
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.as_ref().map(|c| (ConstraintId(i), c)))
    }

    /// Submit a constraint and return its handle.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::DuplicateConstraintName`] when a live
    /// constraint already uses the same name.
    pub fn add_constraint(&mut self, constraint: Constraint) -> Result<ConstraintId, DomainError> {
        let id = ConstraintId(self.constraints.len());
        if let Some(name) = &constraint.name {
            if self.names.contains_key(name) {
                return Err(DomainError::DuplicateConstraintName { name: name.clone() });
            }
            self.names.insert(name.clone(), id);
        }
        self.constraints.push(Some(constraint));
        Ok(id)
    }

    /// Submit `expr <= 0`.
    pub fn add_leq_zero(&mut self, expr: Polynomial) -> ConstraintId {
        self.push_unnamed(Constraint::leq_zero(expr))
    }

    /// Submit `expr = 0`.
    pub fn add_eq_zero(&mut self, expr: Polynomial) -> ConstraintId {
        self.push_unnamed(Constraint::eq_zero(expr))
    }

    /// Look up a constraint by name.
    #[must_use]
    pub fn constraint_by_name(&self, name: &str) -> Option<ConstraintId> {
        self.names.get(name).copied()
    }

    /// A live constraint by handle.
    #[must_use]
    pub fn constraint(&self, id: ConstraintId) -> Option<&Constraint> {
        self.constraints.get(id.0).and_then(Option::as_ref)
    }

    /// Change the right-hand side of a constraint in place.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::UnknownConstraint`] for a removed or foreign handle.
    pub fn set_rhs(&mut self, id: ConstraintId, rhs: f64) -> Result<(), DomainError> {
        match self.constraints.get_mut(id.0).and_then(Option::as_mut) {
            Some(constraint) => {
                constraint.rhs = rhs;
                Ok(())
            }
            None => Err(DomainError::UnknownConstraint { id: id.0 }),
        }
    }

    /// Remove a constraint and return it.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::UnknownConstraint`] for a removed or foreign handle.
    pub fn remove_constraint(&mut self, id: ConstraintId) -> Result<Constraint, DomainError> {
        let removed = self
            .constraints
            .get_mut(id.0)
            .and_then(Option::take)
            .ok_or(DomainError::UnknownConstraint { id: id.0 })?;
        if let Some(name) = &removed.name {
            self.names.remove(name);
        }
        Ok(removed)
    }

    /// Largest constraint or bound violation of a candidate point; `<= tol` means feasible.
    #[must_use]
    pub fn max_violation(&self, values: &[f64]) -> f64 {
        let bounds = self.variables.iter().enumerate().map(|(i, info)| {
            let value = values.get(i).copied().unwrap_or(0.0);
            let below = info.bounds.lower.map_or(0.0, |lb| lb - value);
            let above = info.bounds.upper.map_or(0.0, |ub| value - ub);
            below.max(above)
        });
        self.constraints()
            .map(|(_, c)| c.violation(values))
            .chain(bounds)
            .fold(0.0, f64::max)
    }

    fn push_unnamed(&mut self, constraint: Constraint) -> ConstraintId {
        self.constraints.push(Some(constraint));
        ConstraintId(self.constraints.len() - 1)
    }
}
