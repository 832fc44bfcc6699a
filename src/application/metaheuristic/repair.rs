//! Evaluation of fixed demands with pinning repair.

use tracing::trace;

use crate::application::gap::{GapResult, GapSearch};
use crate::domain::demand::DemandMatrix;
use crate::domain::error::DomainError;
use crate::error::Result;
use crate::port::Encoder;

/// Scaled loads stay this far below capacity.
const REPAIR_MARGIN: f64 = 1e-6;

/// Evaluates candidate matrices through [`GapSearch::get_gap`].
pub(crate) struct Evaluator<'a> {
    search: &'a GapSearch,
    reference: &'a dyn Encoder,
    heuristic: &'a dyn Encoder,
    attempts: usize,
    pub(crate) evaluations: usize,
    pub(crate) repairs: usize,
}

impl<'a> Evaluator<'a> {
    pub(crate) fn new(
        search: &'a GapSearch,
        reference: &'a dyn Encoder,
        heuristic: &'a dyn Encoder,
        attempts: usize,
    ) -> Self {
        Self {
            search,
            reference,
            heuristic,
            attempts,
            evaluations: 0,
            repairs: 0,
        }
    }

    /// Gap of `demands`, repairing pinning overloads.
    ///
    /// On [`DomainError::PinningInfeasible`] the pairs pinned across the
    /// overloaded edge are scaled down by `capacity / load` and the matrix is
    /// evaluated again. Returns `None` once the attempts are used up.
    pub(crate) fn evaluate(&mut self, mut demands: DemandMatrix) -> Result<Option<GapResult>> {
        for attempt in 0..=self.attempts {
            self.evaluations += 1;
            let err = match self.search.get_gap(self.reference, self.heuristic, &demands) {
                Ok(result) => return Ok(Some(result)),
                Err(err) => err,
            };
            let (factor, pairs) = match err.as_pinning_infeasible() {
                Some(DomainError::PinningInfeasible {
                    load,
                    capacity,
                    pairs,
                    edge,
                    ..
                }) => {
                    trace!(attempt, ?edge, load, capacity, "Repairing pinned overload");
                    let factor = if *load > 0.0 {
                        (capacity / load * (1.0 - REPAIR_MARGIN)).clamp(0.0, 1.0)
                    } else {
                        0.0
                    };
                    (factor, pairs.clone())
                }
                _ => return Err(err),
            };
            for pair in pairs {
                let value = demands.get(pair) * factor;
                demands.set(pair, value);
            }
            demands.clean();
            self.repairs += 1;
        }
        Ok(None)
    }
}
