//! Demand levels of the abstract (cluster-level) problem.

/// Levels closer than this are merged.
const LEVEL_TOLERANCE: f64 = 1e-9;

/// Every level and every sum of two levels, sorted and deduplicated.
#[must_use]
pub fn pairwise_sum_levels(levels: &[f64]) -> Vec<f64> {
    let mut sums: Vec<f64> = levels.iter().copied().filter(|l| *l > 0.0).collect();
    for (i, a) in levels.iter().enumerate() {
        for b in &levels[i..] {
            if *a > 0.0 && *b > 0.0 {
                sums.push(a + b);
            }
        }
    }
    sorted_unique(sums)
}

/// Reduce `levels` to at most `target` values picked at geometric quantiles.
///
/// The smallest and largest level always survive. Each quantile snaps to the
/// nearest existing level, so the result is a subset of the input.
#[must_use]
pub fn geometric_downsample(levels: &[f64], target: usize) -> Vec<f64> {
    let levels = sorted_unique(levels.iter().copied().filter(|l| *l > 0.0).collect());
    if target == 0 {
        return Vec::new();
    }
    if levels.len() <= target {
        return levels;
    }
    let (Some(&low), Some(&high)) = (levels.first(), levels.last()) else {
        return levels;
    };
    if target == 1 {
        return vec![high];
    }

    let ratio = (high / low).ln();
    let picked = (0..target)
        .map(|i| {
            let q = low * (ratio * i as f64 / (target - 1) as f64).exp();
            levels
                .iter()
                .copied()
                .min_by(|a, b| (a.ln() - q.ln()).abs().total_cmp(&(b.ln() - q.ln()).abs()))
                .unwrap_or(q)
        })
        .collect();
    sorted_unique(picked)
}

fn sorted_unique(mut values: Vec<f64>) -> Vec<f64> {
    values.sort_by(f64::total_cmp);
    values.dedup_by(|a, b| (*a - *b).abs() <= LEVEL_TOLERANCE);
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pairwise_sums() {
        assert_eq!(pairwise_sum_levels(&[1.0, 5.0]), vec![1.0, 2.0, 5.0, 6.0, 10.0]);
    }

    #[test]
    fn test_downsample_keeps_extremes() {
        let levels: Vec<f64> = (1..=100).map(f64::from).collect();
        let picked = geometric_downsample(&levels, 3);

        assert_eq!(picked.len(), 3);
        assert_eq!(picked[0], 1.0);
        assert_eq!(picked[2], 100.0);
        assert_eq!(picked[1], 10.0);
    }

    #[test]
    fn test_downsample_short_list_unchanged() {
        assert_eq!(geometric_downsample(&[4.0, 2.0], 5), vec![2.0, 4.0]);
        assert_eq!(geometric_downsample(&[4.0, 2.0], 1), vec![4.0]);
    }
}
