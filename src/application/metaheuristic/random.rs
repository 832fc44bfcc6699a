//! Random demand matrices and Gaussian neighbors.

use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use super::Run;
use crate::application::gap::GapSearch;
use crate::domain::demand::{DemandMatrix, Pair, DEMAND_EPSILON};
use crate::error::{ConfigError, Result};

/// Draws demand matrices within the bounds of a search.
#[derive(Debug, Clone)]
pub(crate) struct Sampler {
    bounds: Vec<(Pair, f64)>,
    levels: Vec<f64>,
    density: Option<f64>,
    noise: Normal<f64>,
}

impl Sampler {
    /// Sampler over the pairs of `search` with a positive bound.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for an unusable standard deviation.
    pub(crate) fn new(search: &GapSearch, std_dev: f64, density: Option<f64>) -> Result<Self> {
        let config = search.config();
        let bounds = search
            .topology()
            .pairs()
            .map(|pair| (pair, config.upper_bound(pair)))
            .filter(|(_, ub)| *ub > DEMAND_EPSILON)
            .collect();
        let noise = Normal::new(0.0, std_dev).map_err(|e| ConfigError::InvalidValue {
            field: "std_dev",
            reason: e.to_string(),
        })?;
        Ok(Self {
            bounds,
            levels: config.levels.clone(),
            density,
            noise,
        })
    }

    /// Independent uniform draw per pair; with a density, each pair is
    /// non-zero with that probability.
    pub(crate) fn sample(&self, rng: &mut StdRng) -> DemandMatrix {
        let mut demands = DemandMatrix::new();
        for &(pair, ub) in &self.bounds {
            if let Some(d) = self.density {
                if !rng.gen_bool(d.clamp(0.0, 1.0)) {
                    continue;
                }
            }
            let value = self.snap(rng.gen_range(0.0..=ub), ub);
            if value > DEMAND_EPSILON {
                demands.set(pair, value);
            }
        }
        demands
    }

    /// Perturb every pair by `N(0, std_dev · ub)`, clipped to `[0, ub]`.
    ///
    /// With a density only the current support is perturbed.
    pub(crate) fn neighbor(&self, current: &DemandMatrix, rng: &mut StdRng) -> DemandMatrix {
        let mut next = DemandMatrix::new();
        for &(pair, ub) in &self.bounds {
            let value = current.get(pair);
            if self.density.is_some() && value <= DEMAND_EPSILON {
                continue;
            }
            let moved = (value + self.noise.sample(rng) * ub).clamp(0.0, ub);
            let moved = self.snap(moved, ub);
            if moved > DEMAND_EPSILON {
                next.set(pair, moved);
            }
        }
        next
    }

    /// Nearest admissible level (or zero) when levels are configured.
    fn snap(&self, value: f64, ub: f64) -> f64 {
        if self.levels.is_empty() {
            return value;
        }
        self.levels
            .iter()
            .copied()
            .filter(|l| *l <= ub + DEMAND_EPSILON)
            .chain(std::iter::once(0.0))
            .min_by(|a, b| (a - value).abs().total_cmp(&(b - value).abs()))
            .unwrap_or(0.0)
    }
}

/// Independent random trials.
pub(crate) fn random_search(run: &mut Run<'_>) -> Result<()> {
    while run.random_point()?.is_some() {}
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rand::SeedableRng;

    use super::*;
    use crate::application::gap::GapSearchConfig;
    use crate::domain::topology::Topology;
    use crate::port::tests::EnumeratingSolver;

    fn search(config: GapSearchConfig) -> GapSearch {
        let ring = Arc::new(Topology::ring(4, 10.0).unwrap());
        GapSearch::new(Arc::new(EnumeratingSolver), ring, config).unwrap()
    }

    #[test]
    fn test_samples_stay_within_bounds() {
        let sampler = Sampler::new(&search(GapSearchConfig::kkt(5.0)), 0.5, None).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..20 {
            let demands = sampler.sample(&mut rng);
            assert!(demands.iter().all(|(_, v)| (0.0..=5.0).contains(&v)));
            let next = sampler.neighbor(&demands, &mut rng);
            assert!(next.iter().all(|(_, v)| (0.0..=5.0).contains(&v)));
        }
    }

    #[test]
    fn test_samples_snap_to_levels() {
        let search = search(GapSearchConfig::quantized(5.0, vec![1.0, 4.0]));
        let sampler = Sampler::new(&search, 0.5, None).unwrap();
        let mut rng = StdRng::seed_from_u64(2);
        let demands = sampler.sample(&mut rng);
        assert!(demands.iter().all(|(_, v)| v == 1.0 || v == 4.0));
    }

    #[test]
    fn test_zero_density_samples_nothing() {
        let sampler = Sampler::new(&search(GapSearchConfig::kkt(5.0)), 0.5, Some(0.0)).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        assert!(sampler.sample(&mut rng).is_empty());
    }

    #[test]
    fn test_negative_std_dev_rejected() {
        assert!(Sampler::new(&search(GapSearchConfig::kkt(5.0)), -1.0, None).is_err());
    }
}
