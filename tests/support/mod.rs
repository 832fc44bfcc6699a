#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use metaopt::adapter::encoder::{EncoderKind, EncoderSpec, TrafficEncoder};
use metaopt::adapter::solver::HiGHSSolver;
use metaopt::application::gap::{GapSearch, GapSearchConfig};
use metaopt::domain::demand::{DemandMatrix, Pair};
use metaopt::domain::topology::Topology;

/// Pinning threshold used across the fixtures.
pub const THRESHOLD: f64 = 5.0;

/// Three nodes on a line, `0 - 1 - 2`, every link with capacity 10.
///
/// Every pair has a single path, so the worst case of demand pinning is known:
/// pinning 5 units on `0 -> 2` blocks 5 units of both `0 -> 1` and `1 -> 2`,
/// in each direction, for a maximum gap of 10.
pub fn line() -> Arc<Topology> {
    let mut topology = Topology::new("line", 3);
    topology.add_link(0, 1, 10.0).expect("link 0-1");
    topology.add_link(1, 2, 10.0).expect("link 1-2");
    Arc::new(topology)
}

/// Maximum gap of demand pinning on [`line`] with a demand bound of 10.
pub const LINE_MAX_GAP: f64 = 10.0;

pub fn ring(nodes: usize, capacity: f64) -> Arc<Topology> {
    Arc::new(Topology::ring(nodes, capacity).expect("ring"))
}

/// Optimal reference and demand pinning heuristic over `topology`.
pub fn encoders(topology: &Arc<Topology>, num_paths: usize) -> (TrafficEncoder, TrafficEncoder) {
    let reference = TrafficEncoder::build(
        &EncoderSpec::new(EncoderKind::Optimal, num_paths),
        Arc::clone(topology),
        None,
    )
    .expect("reference encoder");
    let heuristic = TrafficEncoder::build(
        &EncoderSpec::new(
            EncoderKind::DemandPinning {
                threshold: THRESHOLD,
            },
            num_paths,
        ),
        Arc::clone(topology),
        None,
    )
    .expect("heuristic encoder");
    (reference, heuristic)
}

pub fn search(topology: &Arc<Topology>, config: GapSearchConfig) -> GapSearch {
    GapSearch::new(Arc::new(HiGHSSolver::new()), Arc::clone(topology), config).expect("gap search")
}

/// The worst case of [`line`] spelled out.
pub fn line_worst_case() -> DemandMatrix {
    DemandMatrix::new()
        .with(Pair::new(0, 1), 10.0)
        .with(Pair::new(1, 2), 10.0)
        .with(Pair::new(0, 2), 5.0)
        .with(Pair::new(1, 0), 10.0)
        .with(Pair::new(2, 1), 10.0)
        .with(Pair::new(2, 0), 5.0)
}

pub fn assert_near(actual: f64, expected: f64, tolerance: f64) {
    assert!(
        (actual - expected).abs() <= tolerance,
        "expected {expected} ± {tolerance}, got {actual}"
    );
}

/// Write `contents` to `name` inside `dir`.
pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("write fixture");
    path
}

/// Run configuration on a ring with an optimal reference and pinning heuristic.
pub fn ring_config(nodes: usize) -> String {
    format!(
        r#"
[logging]
level = "warn"

[topology]
kind = "ring"
nodes = {nodes}
capacity = 10.0

[reference]
kind = "optimal"
num_paths = 1

[heuristic]
kind = "demand_pinning"
threshold = 5.0
num_paths = 1

[search]
demand_ub = 10.0
"#
    )
}
