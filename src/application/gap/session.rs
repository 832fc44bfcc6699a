//! Per-search state.
//!
//! A [`SearchSession`] owns the flat model of one search together with the
//! inputs, both encodings and the named bound constraints of every free pair.
//! Decomposition re-solves the same session after tightening or relaxing those
//! bounds instead of rebuilding the model.

use std::collections::BTreeMap;

use tracing::trace;

use crate::domain::constraint::Constraint;
use crate::domain::demand::Pair;
use crate::domain::input::InputSet;
use crate::domain::model::{ConstraintId, Model};
use crate::domain::polynomial::Polynomial;
use crate::error::{ConfigError, Result};
use crate::port::{Encoding, SolveOutcome, Solver};

/// Slack around fixed values so solver round-off cannot make a fix infeasible.
const FIX_TOLERANCE: f64 = 1e-6;

/// State of one search invocation.
#[derive(Debug)]
pub struct SearchSession {
    pub(crate) model: Model,
    pub(crate) inputs: InputSet,
    pub(crate) reference: Encoding,
    pub(crate) heuristic: Encoding,
    pub(crate) objective: Polynomial,
    upper: BTreeMap<Pair, ConstraintId>,
    lower: BTreeMap<Pair, ConstraintId>,
}

impl SearchSession {
    /// Assemble a session around two encodings built in `model`.
    ///
    /// Adds a named `demand <= ub` constraint for every free pair.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::SolverMismatch`] when either encoding or the
    /// inputs belong to another model.
    pub(crate) fn open(
        mut model: Model,
        inputs: InputSet,
        reference: Encoding,
        heuristic: Encoding,
    ) -> Result<Self> {
        ensure_same_model(&model, &inputs, &reference, &heuristic)?;
        let mut upper = BTreeMap::new();
        for pair in inputs.free_pairs().collect::<Vec<_>>() {
            let id = model.add_constraint(
                Constraint::leq_zero(inputs.expression(pair) - Polynomial::constant(inputs.upper_bound(pair)))
                    .named(format!("demand_ub{pair}")),
            )?;
            upper.insert(pair, id);
        }
        let objective = Polynomial::term(reference.objective_var, 1.0)
            - Polynomial::term(heuristic.objective_var, 1.0);
        Ok(Self {
            model,
            inputs,
            reference,
            heuristic,
            objective,
            upper,
            lower: BTreeMap::new(),
        })
    }

    /// The flat model.
    #[must_use]
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Inputs of the session.
    #[must_use]
    pub fn inputs(&self) -> &InputSet {
        &self.inputs
    }

    /// Outer objective currently maximized.
    #[must_use]
    pub fn objective(&self) -> &Polynomial {
        &self.objective
    }

    pub(crate) fn set_objective(&mut self, objective: Polynomial) {
        self.objective = objective;
    }

    /// Maximize the outer objective.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub fn maximize(&self, solver: &dyn Solver) -> Result<SolveOutcome> {
        solver.maximize(&self.model, &self.objective)
    }

    /// Add `objective >= floor` under `name`, replacing an earlier one.
    ///
    /// # Errors
    ///
    /// Propagates model errors.
    pub(crate) fn add_floor(&mut self, name: &str, floor: f64) -> Result<ConstraintId> {
        if let Some(existing) = self.model.constraint_by_name(name) {
            self.model.remove_constraint(existing)?;
        }
        let id = self
            .model
            .add_constraint(Constraint::geq(self.objective.clone(), floor).named(name))?;
        Ok(id)
    }

    /// Move a floor added by [`SearchSession::add_floor`].
    ///
    /// # Errors
    ///
    /// Returns an error for a removed handle.
    pub(crate) fn move_floor(&mut self, id: ConstraintId, floor: f64) -> Result<()> {
        // stored as -objective <= -floor
        self.model.set_rhs(id, -floor)?;
        Ok(())
    }

    /// Remove a constraint by handle.
    ///
    /// # Errors
    ///
    /// Returns an error for a removed handle.
    pub(crate) fn remove(&mut self, id: ConstraintId) -> Result<()> {
        self.model.remove_constraint(id)?;
        Ok(())
    }

    /// Pairs with a bound handle.
    pub fn bounded_pairs(&self) -> impl Iterator<Item = Pair> + '_ {
        self.upper.keys().copied()
    }

    /// Set the upper bound of `pair`; pairs without a handle are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle was removed.
    pub fn set_upper(&mut self, pair: Pair, value: f64) -> Result<()> {
        if let Some(&id) = self.upper.get(&pair) {
            trace!(%pair, value, "Set demand upper bound");
            self.model.set_rhs(id, value)?;
        }
        Ok(())
    }

    /// Restore the upper bound the inputs were built with.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle was removed.
    pub fn restore_upper(&mut self, pair: Pair) -> Result<()> {
        let ub = self.inputs.upper_bound(pair);
        self.set_upper(pair, ub)
    }

    /// Keep only the pairs accepted by `keep` free; every other pair is bound to zero
    /// unless it is fixed.
    ///
    /// # Errors
    ///
    /// Returns an error if a handle was removed.
    pub fn restrict_to<F>(&mut self, mut keep: F) -> Result<()>
    where
        F: FnMut(Pair) -> bool,
    {
        let pairs: Vec<Pair> = self.upper.keys().copied().collect();
        for pair in pairs {
            if self.lower.contains_key(&pair) {
                continue;
            }
            if keep(pair) {
                self.restore_upper(pair)?;
            } else {
                self.set_upper(pair, 0.0)?;
            }
        }
        Ok(())
    }

    /// Fix `pair` to `value` (within a small tolerance) with a named lower bound
    /// and a tightened upper bound.
    ///
    /// # Errors
    ///
    /// Returns an error if a handle was removed.
    pub fn fix(&mut self, pair: Pair, value: f64) -> Result<()> {
        if !self.upper.contains_key(&pair) {
            return Ok(());
        }
        self.release(pair)?;
        self.set_upper(pair, value + FIX_TOLERANCE)?;
        let id = self.model.add_constraint(
            Constraint::geq(self.inputs.expression(pair), value - FIX_TOLERANCE)
                .named(format!("demand_lb{pair}")),
        )?;
        self.lower.insert(pair, id);
        Ok(())
    }

    /// Undo [`SearchSession::fix`]; the upper bound is restored.
    ///
    /// # Errors
    ///
    /// Returns an error if a handle was removed.
    pub fn release(&mut self, pair: Pair) -> Result<()> {
        if let Some(id) = self.lower.remove(&pair) {
            self.model.remove_constraint(id)?;
            self.restore_upper(pair)?;
        }
        Ok(())
    }

    /// True when `pair` is currently fixed.
    #[must_use]
    pub fn is_fixed(&self, pair: Pair) -> bool {
        self.lower.contains_key(&pair)
    }
}

/// Reject encodings and inputs built against different models.
///
/// # Errors
///
/// Returns [`ConfigError::SolverMismatch`].
pub(crate) fn ensure_same_model(
    model: &Model,
    inputs: &InputSet,
    reference: &Encoding,
    heuristic: &Encoding,
) -> Result<()> {
    let id = model.id();
    if inputs.model_id() != id || reference.model_id != id || heuristic.model_id != id {
        return Err(ConfigError::SolverMismatch.into());
    }
    Ok(())
}
