//! First-improvement hill climbing with random restarts.

use tracing::debug;

use super::Run;
use crate::error::Result;

/// Climb from random points until the budget runs out.
///
/// Each step samples up to `num_neighbors` neighbors and moves to the first
/// one with a larger gap. A point without an improving neighbor is a local
/// optimum; the climb restarts from a fresh random point.
pub(crate) fn hill_climb(run: &mut Run<'_>) -> Result<()> {
    let mut local_optima = 0usize;
    while let Some(mut current) = run.random_point()? {
        loop {
            let mut improved = false;
            for _ in 0..run.config.num_neighbors {
                if run.exhausted() {
                    return Ok(());
                }
                let candidate = run.neighbor(&current.demands);
                if let Some(next) = run.evaluate(candidate)? {
                    if next.gap > current.gap {
                        current = next;
                        improved = true;
                        break;
                    }
                }
            }
            if !improved {
                break;
            }
        }
        local_optima += 1;
        debug!(local_optima, gap = current.gap, "Reached local optimum, restarting");
    }
    Ok(())
}
