//! Feasibility-only gap searches.
//!
//! Both searches keep a single named threshold constraint `gap >= t` in the
//! session and move its right-hand side; the model is never rebuilt.

use serde::Serialize;
use tracing::{debug, info};

use super::{GapResult, GapSearch, SearchOptions, SearchSession};
use crate::domain::polynomial::Polynomial;
use crate::error::{ConfigError, Result};
use crate::port::{Encoder, ObjectiveSense, Optimality, SolveOutcome};

/// Name of the threshold constraint.
const GAP_THRESHOLD: &str = "gap_threshold";

/// Upper limit on doubling steps before giving up on finding an infeasible threshold.
const MAX_DOUBLINGS: usize = 64;

/// Bisection stops once the bracket is narrower than this.
const MIN_WIDTH: f64 = 1e-6;

/// Result of a feasibility check.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Feasibility {
    /// An input reaching the target exists; the witness is attached.
    Feasible(GapResult),
    /// No input reaches the target.
    Infeasible,
}

impl Feasibility {
    /// Return `true` for a feasible target.
    #[must_use]
    pub const fn is_feasible(&self) -> bool {
        matches!(self, Self::Feasible(_))
    }
}

/// Bracket of the maximum gap.
#[derive(Debug, Clone, Serialize)]
pub struct GapInterval {
    /// Largest threshold proven feasible.
    pub lower: f64,
    /// Smallest threshold proven infeasible, `None` if none was found.
    pub upper: Option<f64>,
    /// Witness of the lower bound.
    pub best: Option<GapResult>,
    /// Number of feasibility checks performed.
    pub checks: usize,
}

impl GapSearch {
    /// Check whether some input reaches a gap of at least `min_gap`.
    ///
    /// The reference is not forced to optimality, so the witness gap is a
    /// lower bound on the true gap of its demands.
    ///
    /// # Errors
    ///
    /// Returns configuration, rewrite and backend errors.
    pub fn find_gap_at_least(
        &self,
        reference: &dyn Encoder,
        heuristic: &dyn Encoder,
        min_gap: f64,
        options: &SearchOptions,
    ) -> Result<Feasibility> {
        let mut session = self.open_session(reference, heuristic, &options.pins, Optimality::Relaxed)?;
        let objective = session.objective.clone();
        let outcome = self
            .solver
            .check_feasibility(&mut session.model, &objective, min_gap)?;
        let feasibility = match outcome {
            SolveOutcome::Optimal(solution) => {
                Feasibility::Feasible(self.extract(&session, reference, heuristic, &solution))
            }
            _ => Feasibility::Infeasible,
        };
        info!(min_gap, feasible = feasibility.is_feasible(), "Checked gap threshold");
        Ok(feasibility)
    }

    /// Bracket the maximum gap by doubling and then bisecting a threshold.
    ///
    /// Stops once `upper − lower <= rel_tol · upper`, or when the bracket
    /// collapses below a small absolute width.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for a non-positive `start` or
    /// tolerance, and configuration, rewrite and backend errors.
    pub fn find_maximum_gap_interval(
        &self,
        reference: &dyn Encoder,
        heuristic: &dyn Encoder,
        start: f64,
        rel_tol: f64,
        options: &SearchOptions,
    ) -> Result<GapInterval> {
        if !(start > 0.0 && start.is_finite()) {
            return Err(ConfigError::InvalidValue {
                field: "start",
                reason: format!("{start} must be positive"),
            }
            .into());
        }
        if !(rel_tol > 0.0 && rel_tol < 1.0) {
            return Err(ConfigError::InvalidValue {
                field: "rel_tol",
                reason: format!("{rel_tol} is outside (0, 1)"),
            }
            .into());
        }

        let mut session = self.open_session(reference, heuristic, &options.pins, Optimality::Relaxed)?;
        let threshold = session.add_floor(GAP_THRESHOLD, start)?;
        let mut interval = GapInterval {
            lower: 0.0,
            upper: None,
            best: None,
            checks: 0,
        };

        let probe = |session: &mut SearchSession,
                         interval: &mut GapInterval,
                         target: f64|
         -> Result<bool> {
            session.move_floor(threshold, target)?;
            interval.checks += 1;
            let outcome = self
                .solver
                .solve(session.model(), &Polynomial::new(), ObjectiveSense::Maximize)?;
            match outcome {
                SolveOutcome::Optimal(solution) => {
                    let witness = self.extract(session, reference, heuristic, &solution);
                    interval.lower = witness.gap.max(target);
                    interval.best = Some(witness);
                    debug!(target, lower = interval.lower, "Threshold feasible");
                    Ok(true)
                }
                _ => {
                    interval.upper = Some(target);
                    debug!(target, "Threshold infeasible");
                    Ok(false)
                }
            }
        };

        let mut target = start;
        for _ in 0..MAX_DOUBLINGS {
            if !probe(&mut session, &mut interval, target)? {
                break;
            }
            target = 2.0 * interval.lower.max(target);
        }

        if let Some(mut upper) = interval.upper {
            while upper - interval.lower > (rel_tol * upper.abs()).max(MIN_WIDTH) {
                let mid = 0.5 * (interval.lower + upper);
                if !probe(&mut session, &mut interval, mid)? {
                    upper = mid;
                }
                if interval.lower >= upper {
                    break;
                }
            }
            interval.upper = Some(upper);
        }

        info!(
            lower = interval.lower,
            upper = ?interval.upper,
            checks = interval.checks,
            "Bracketed maximum gap"
        );
        Ok(interval)
    }
}
