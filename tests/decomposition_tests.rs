mod support;

use std::sync::Arc;

use metaopt::application::decomposition::{
    DecompositionConfig, Decomposer, InterClusterPolicy, Partition,
};
use metaopt::application::gap::{GapSearchConfig, SearchOptions};
use metaopt::domain::topology::Topology;
use metaopt::error::{ConfigError, Error};

use support::{assert_near, encoders, search};

const TOL: f64 = 1e-4;

/// Four nodes on a line, `0 - 1 - 2 - 3`, capacity 10.
fn line4() -> Arc<Topology> {
    let mut topology = Topology::new("line4", 4);
    for node in 0..3 {
        topology.add_link(node, node + 1, 10.0).unwrap();
    }
    Arc::new(topology)
}

fn halves() -> Partition {
    Partition::new(vec![vec![0, 1], vec![2, 3]])
}

#[test]
fn joint_resolve_covers_every_pair_and_keeps_the_best_stage() {
    let topology = line4();
    let (reference, heuristic) = encoders(&topology, 1);
    let search = search(&topology, GapSearchConfig::kkt(10.0));

    let decomposer = Decomposer::new(&search, &reference, &heuristic, halves(), 7).unwrap();
    let result = decomposer.run(&InterClusterPolicy::JointResolve).unwrap();

    assert!(result.demands.is_complete(&topology));
    let labels: Vec<_> = result.stages.iter().map(|s| s.stage.as_str()).collect();
    assert_eq!(labels, ["cluster 0", "cluster 1", "inter-cluster"]);
    for stage in &result.stages {
        if let Some(validated) = stage.validated_gap {
            assert!(result.gap >= validated - TOL, "{} beats the result", stage.stage);
        }
    }

    let evaluated = search.get_gap(&reference, &heuristic, &result.demands).unwrap();
    assert_near(evaluated.gap, result.gap, TOL);

    let flat = search
        .maximize_gap(&reference, &heuristic, &SearchOptions::default())
        .unwrap();
    assert!(result.gap <= flat.gap + TOL);
}

#[test]
fn sampled_batches_produce_a_validated_matrix() {
    let topology = line4();
    let (reference, heuristic) = encoders(&topology, 1);
    let search = search(&topology, GapSearchConfig::kkt(10.0));
    let policy = InterClusterPolicy::SampledBatches {
        rounds: 3,
        nodes_per_cluster: 1,
    };

    let decomposer = Decomposer::new(&search, &reference, &heuristic, halves(), 3).unwrap();
    let result = decomposer.run(&policy).unwrap();

    assert!(result.demands.is_complete(&topology));
    assert!(result.stages.len() >= 2 && result.stages.len() <= 5);
    assert!(result.gap >= -TOL);
    let evaluated = search.get_gap(&reference, &heuristic, &result.demands).unwrap();
    assert_near(evaluated.gap, result.gap, TOL);
}

#[test]
fn abstracted_policy_adds_an_abstract_stage() {
    let topology = line4();
    let (reference, heuristic) = encoders(&topology, 1);
    let search = search(&topology, GapSearchConfig::kkt(10.0));

    let decomposer = Decomposer::new(&search, &reference, &heuristic, halves(), 11).unwrap();
    let result = decomposer
        .run(&InterClusterPolicy::Abstracted { target_levels: 3 })
        .unwrap();

    assert_eq!(result.stages.last().map(|s| s.stage.as_str()), Some("abstract"));
    assert!(result.demands.is_complete(&topology));
    assert!(result.demands.iter().all(|(_, d)| d <= 10.0 + TOL));
}

#[test]
fn same_seed_same_result() {
    let topology = line4();
    let (reference, heuristic) = encoders(&topology, 1);
    let search = search(&topology, GapSearchConfig::kkt(10.0));
    let policy = InterClusterPolicy::SampledBatches {
        rounds: 2,
        nodes_per_cluster: 1,
    };

    let run = || {
        Decomposer::new(&search, &reference, &heuristic, halves(), 5)
            .unwrap()
            .run(&policy)
            .unwrap()
    };
    let (first, second) = (run(), run());
    assert_eq!(first.demands, second.demands);
    assert_eq!(first.stages.len(), second.stages.len());
}

#[test]
fn invalid_partitions_are_rejected_before_solving() {
    let topology = line4();
    let (reference, heuristic) = encoders(&topology, 1);
    let search = search(&topology, GapSearchConfig::kkt(10.0));

    for clusters in [
        vec![vec![0, 1], vec![1, 2, 3]],
        vec![vec![0, 1], vec![2]],
        vec![vec![0, 1, 2, 3, 4]],
    ] {
        let err = Decomposer::new(&search, &reference, &heuristic, Partition::new(clusters), 0).unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::InvalidPartition { .. })));
    }
}

#[test]
fn generated_partition_is_contiguous_and_complete() {
    let topology = support::ring(16, 10.0);
    let config = DecompositionConfig {
        num_clusters: Some(4),
        seed: 21,
        ..DecompositionConfig::default()
    };

    let partition = config.partition(&topology).unwrap();

    assert_eq!(partition.len(), 4);
    assert!(partition.validate(&topology).is_ok());
    assert!(partition.is_contiguous(&topology));
    let sizes: Vec<_> = partition.clusters().iter().map(Vec::len).collect();
    // A cluster accepts nodes while it is within (1 + tolerance) * (n / k + 1).
    let limit = (1.0 + config.tolerance) * (16 / 4 + 1) as f64;
    assert!(sizes.iter().all(|&s| s >= 1 && s as f64 <= limit + 1.0), "sizes {sizes:?}");
    assert_eq!(sizes.iter().sum::<usize>(), 16);
}

#[cfg(feature = "slow-tests")]
#[test]
fn decomposed_ring_stays_below_the_flat_maximum() {
    let topology = support::ring(12, 10.0);
    let (reference, heuristic) = encoders(&topology, 2);
    let search = search(&topology, GapSearchConfig::quantized(10.0, vec![5.0, 10.0]));
    let partition = DecompositionConfig {
        num_clusters: Some(3),
        seed: 2,
        ..DecompositionConfig::default()
    }
    .partition(&topology)
    .unwrap();

    let decomposed = Decomposer::new(&search, &reference, &heuristic, partition, 2)
        .unwrap()
        .run(&InterClusterPolicy::SampledBatches {
            rounds: 2,
            nodes_per_cluster: 2,
        })
        .unwrap();
    let flat = search
        .maximize_gap(&reference, &heuristic, &SearchOptions::default())
        .unwrap();

    assert!(decomposed.demands.is_complete(&topology));
    assert!(decomposed.gap <= flat.gap + TOL);
}
