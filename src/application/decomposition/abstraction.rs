//! Cluster-level abstraction of the inter-cluster problem.
//!
//! Every cluster becomes one node; an abstract demand between two clusters
//! stands for the sum of the concrete demands between their members.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;

use super::levels::{geometric_downsample, pairwise_sum_levels};
use super::partition::Partition;
use crate::application::gap::GapSearchConfig;
use crate::application::rewrite::RewriteKind;
use crate::domain::demand::{DemandMatrix, Pair, DEMAND_EPSILON};
use crate::domain::topology::Topology;

/// Search settings of the abstract problem.
///
/// The abstract search is always quantized; the bound of an abstract pair is
/// the summed bound of the concrete pairs it aggregates.
#[must_use]
pub fn abstract_config(
    config: &GapSearchConfig,
    partition: &Partition,
    abstracted: &Topology,
    target_levels: usize,
) -> GapSearchConfig {
    let concrete = if config.levels.is_empty() {
        vec![config.max_demand()]
    } else {
        config.levels.clone()
    };
    let levels = geometric_downsample(&pairwise_sum_levels(&concrete), target_levels);

    let demand_ubs: DemandMatrix = abstracted
        .pairs()
        .map(|pair| (pair, aggregated_bound(config, partition, pair)))
        .collect();

    let required = abstracted
        .max_capacity()
        .max(demand_ubs.iter().map(|(_, v)| v).fold(0.0, f64::max))
        .max(levels.iter().copied().fold(0.0, f64::max));

    GapSearchConfig {
        rewrite: RewriteKind::PrimalDual,
        levels,
        demand_ub: None,
        demand_ubs: Some(demand_ubs),
        big_m: config.big_m.max(required),
        density: None,
        restriction: None,
        locality: None,
        simplify_tolerance: config.simplify_tolerance,
    }
}

fn aggregated_bound(config: &GapSearchConfig, partition: &Partition, pair: Pair) -> f64 {
    let clusters = partition.clusters();
    clusters[pair.src]
        .iter()
        .flat_map(|&a| clusters[pair.dst].iter().map(move |&b| Pair::new(a, b)))
        .map(|p| config.upper_bound(p))
        .sum()
}

/// Spread abstract demands randomly over the concrete pairs they aggregate.
///
/// Only pairs the concrete search would admit receive a share: reachable,
/// within the locality limit, and with a positive bound. Each share is capped
/// by the pair's bound and by the capacity leaving the source cluster and
/// entering the target cluster. The part that cannot be placed is dropped.
#[must_use]
pub fn disaggregate(
    abstract_demands: &DemandMatrix,
    partition: &Partition,
    topology: &Topology,
    config: &GapSearchConfig,
    rng: &mut StdRng,
) -> DemandMatrix {
    let clusters = partition.clusters();
    let (egress, ingress) = cut_capacities(partition, topology);
    let hops = topology.all_hop_distances();
    let admissible = |pair: Pair| {
        hops.get(&pair)
            .is_some_and(|&d| config.locality.map_or(true, |limit| d <= limit))
    };

    let mut concrete = DemandMatrix::new();
    for (pair, value) in abstract_demands.iter() {
        if value <= DEMAND_EPSILON {
            continue;
        }
        let (Some(sources), Some(targets)) = (clusters.get(pair.src), clusters.get(pair.dst)) else {
            continue;
        };
        let cut = egress[pair.src].min(ingress[pair.dst]);
        let mut members: Vec<(Pair, f64)> = sources
            .iter()
            .flat_map(|&a| targets.iter().map(move |&b| Pair::new(a, b)))
            .filter(|&p| admissible(p))
            .map(|p| (p, config.upper_bound(p).min(cut)))
            .filter(|(_, ub)| *ub > DEMAND_EPSILON)
            .collect();
        members.shuffle(rng);

        let weights: Vec<f64> = members.iter().map(|_| rng.gen_range(0.0..1.0) + DEMAND_EPSILON).collect();
        let weight_sum: f64 = weights.iter().sum();
        let mut shares: Vec<f64> = members
            .iter()
            .zip(&weights)
            .map(|((_, ub), w)| (value * w / weight_sum).min(*ub))
            .collect();

        // place what the clipped shares left over, first come first served
        let mut leftover = value - shares.iter().sum::<f64>();
        for (share, (_, ub)) in shares.iter_mut().zip(&members) {
            if leftover <= DEMAND_EPSILON {
                break;
            }
            let extra = (ub - *share).min(leftover);
            *share += extra;
            leftover -= extra;
        }

        for ((p, _), share) in members.iter().zip(shares) {
            if share > DEMAND_EPSILON {
                *concrete.entry_mut(*p) += share;
            }
        }
    }
    concrete
}

/// Capacity leaving and entering each cluster over inter-cluster edges.
fn cut_capacities(partition: &Partition, topology: &Topology) -> (Vec<f64>, Vec<f64>) {
    let assignment = partition.assignment(topology.num_nodes());
    let mut egress = vec![0.0; partition.len()];
    let mut ingress = vec![0.0; partition.len()];
    for edge in topology.edges() {
        if let (Some(Some(a)), Some(Some(b))) = (assignment.get(edge.src), assignment.get(edge.dst)) {
            if a != b {
                egress[*a] += edge.capacity;
                ingress[*b] += edge.capacity;
            }
        }
    }
    (egress, ingress)
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;

    fn setup() -> (Topology, Partition, GapSearchConfig) {
        let ring = Topology::ring(4, 10.0).unwrap();
        let partition = Partition::new(vec![vec![0, 1], vec![2, 3]]);
        (ring, partition, GapSearchConfig::quantized(5.0, vec![1.0, 5.0]))
    }

    #[test]
    fn test_abstract_config_aggregates_bounds() {
        let (ring, partition, config) = setup();
        let abstracted = partition.abstract_topology(&ring).unwrap();

        let derived = abstract_config(&config, &partition, &abstracted, 3);

        assert_eq!(derived.rewrite, RewriteKind::PrimalDual);
        assert_eq!(derived.upper_bound(Pair::new(0, 1)), 20.0);
        assert_eq!(derived.levels.len(), 3);
        assert!(derived.validate(&abstracted).is_ok());
    }

    #[test]
    fn test_disaggregation_respects_bounds_and_total() {
        let (ring, partition, config) = setup();
        let mut rng = StdRng::seed_from_u64(3);
        let abstract_demands = DemandMatrix::new().with(Pair::new(0, 1), 12.0);

        let concrete = disaggregate(&abstract_demands, &partition, &ring, &config, &mut rng);

        assert!((concrete.total() - 12.0).abs() < 1e-9);
        for (pair, value) in concrete.iter() {
            assert!([0, 1].contains(&pair.src) && [2, 3].contains(&pair.dst));
            assert!(value <= 5.0 + 1e-9);
        }
    }

    #[test]
    fn test_disaggregation_drops_unplaceable_share() {
        let (ring, partition, config) = setup();
        let mut rng = StdRng::seed_from_u64(0);
        let abstract_demands = DemandMatrix::new().with(Pair::new(1, 0), 50.0);

        let concrete = disaggregate(&abstract_demands, &partition, &ring, &config, &mut rng);

        assert!((concrete.total() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_disaggregation_skips_pairs_out_of_range() {
        let (ring, partition, mut config) = setup();
        config.locality = Some(1);
        let mut rng = StdRng::seed_from_u64(5);
        let abstract_demands = DemandMatrix::new().with(Pair::new(0, 1), 50.0);

        let concrete = disaggregate(&abstract_demands, &partition, &ring, &config, &mut rng);

        // only 0 -> 3 and 1 -> 2 are one hop apart
        assert_eq!(concrete.get(Pair::new(0, 2)), 0.0);
        assert_eq!(concrete.get(Pair::new(1, 3)), 0.0);
        assert!((concrete.total() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_disaggregation_is_capped_by_the_cluster_cut() {
        let ring = Topology::ring(4, 1.0).unwrap();
        let partition = Partition::new(vec![vec![0, 1], vec![2, 3]]);
        let config = GapSearchConfig::quantized(5.0, vec![1.0, 5.0]);
        let mut rng = StdRng::seed_from_u64(1);
        let abstract_demands = DemandMatrix::new().with(Pair::new(0, 1), 50.0);

        let concrete = disaggregate(&abstract_demands, &partition, &ring, &config, &mut rng);

        // links 1-2 and 0-3 carry 2 units out of the first cluster
        assert!(concrete.iter().all(|(_, v)| v <= 2.0 + 1e-9));
        assert!((concrete.total() - 8.0).abs() < 1e-9);
    }
}
