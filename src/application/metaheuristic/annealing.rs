//! Simulated annealing with restarts.

use rand::Rng;
use tracing::debug;

use super::Run;
use crate::error::Result;

/// Metropolis acceptance: always accept improvements, accept a loss of
/// `current − candidate` with probability `exp(−loss / temperature)`.
fn accept<R: Rng>(rng: &mut R, current: f64, candidate: f64, temperature: f64) -> bool {
    if candidate >= current {
        return true;
    }
    if temperature <= 0.0 {
        return false;
    }
    rng.gen::<f64>() < ((candidate - current) / temperature).exp()
}

/// Anneal until the budget runs out.
///
/// The temperature decays geometrically after every outer step; after
/// `restart_after` steps without a new best the walk restarts from a fresh
/// random point at the initial temperature.
pub(crate) fn anneal(run: &mut Run<'_>) -> Result<()> {
    let Some(mut current) = run.random_point()? else {
        return Ok(());
    };
    let mut temperature = run.config.initial_temperature;
    let mut stale = 0usize;

    while !run.exhausted() {
        let improvements = run.incumbent.improvements();
        for _ in 0..run.config.num_neighbors {
            if run.exhausted() {
                return Ok(());
            }
            let candidate = run.neighbor(&current.demands);
            if let Some(next) = run.evaluate(candidate)? {
                if accept(&mut run.rng, current.gap, next.gap, temperature) {
                    current = next;
                }
            }
        }
        temperature *= run.config.cooling;

        if run.incumbent.improvements() > improvements {
            stale = 0;
        } else {
            stale += 1;
        }
        if stale >= run.config.restart_after {
            debug!(temperature, gap = current.gap, "No improvement, restarting annealing");
            let Some(fresh) = run.random_point()? else {
                return Ok(());
            };
            current = fresh;
            temperature = run.config.initial_temperature;
            stale = 0;
        }
    }
    Ok(())
}
