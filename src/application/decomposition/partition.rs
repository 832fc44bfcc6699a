//! Node partitions for the decomposed search.

use std::collections::{BTreeMap, HashSet};

use rand::rngs::StdRng;
use rand::seq::{IteratorRandom, SliceRandom};
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::demand::Pair;
use crate::domain::path::PathTable;
use crate::domain::topology::{NodeId, Topology};
use crate::error::{ConfigError, Result};

/// Restarts of the randomized partitioner before giving up.
const MAX_PARTITION_ATTEMPTS: usize = 100;

/// Disjoint clusters covering every node of a topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Partition {
    clusters: Vec<Vec<NodeId>>,
}

impl Partition {
    /// Create a partition from explicit clusters; call [`Partition::validate`] before use.
    #[must_use]
    pub fn new(clusters: Vec<Vec<NodeId>>) -> Self {
        Self { clusters }
    }

    /// Build a partition from a cluster id per node.
    #[must_use]
    pub fn from_assignment(assignment: &[usize]) -> Self {
        let mut clusters: BTreeMap<usize, Vec<NodeId>> = BTreeMap::new();
        for (node, &cluster) in assignment.iter().enumerate() {
            clusters.entry(cluster).or_default().push(node);
        }
        Self::new(clusters.into_values().collect())
    }

    /// The clusters.
    #[must_use]
    pub fn clusters(&self) -> &[Vec<NodeId>] {
        &self.clusters
    }

    /// Number of clusters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    /// True when there are no clusters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Cluster id per node; `None` for nodes no cluster contains.
    #[must_use]
    pub fn assignment(&self, num_nodes: usize) -> Vec<Option<usize>> {
        let mut assignment = vec![None; num_nodes];
        for (c, nodes) in self.clusters.iter().enumerate() {
            for &node in nodes {
                if let Some(slot) = assignment.get_mut(node) {
                    *slot = Some(c);
                }
            }
        }
        assignment
    }

    /// Reject overlapping clusters, unknown nodes, empty clusters and uncovered nodes.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPartition`] naming the first violation.
    pub fn validate(&self, topology: &Topology) -> std::result::Result<(), ConfigError> {
        let invalid = |reason: String| Err(ConfigError::InvalidPartition { reason });
        if self.clusters.is_empty() {
            return invalid("no clusters".into());
        }
        let mut seen = HashSet::new();
        for (c, nodes) in self.clusters.iter().enumerate() {
            if nodes.is_empty() {
                return invalid(format!("cluster {c} is empty"));
            }
            for &node in nodes {
                if node >= topology.num_nodes() {
                    return invalid(format!(
                        "cluster {c} contains node {node}, topology has {} nodes",
                        topology.num_nodes()
                    ));
                }
                if !seen.insert(node) {
                    return invalid(format!("node {node} appears in more than one cluster"));
                }
            }
        }
        if let Some(missing) = topology.nodes().find(|n| !seen.contains(n)) {
            return invalid(format!("node {missing} is not in any cluster"));
        }
        Ok(())
    }

    /// True when every cluster induces a connected subgraph.
    #[must_use]
    pub fn is_contiguous(&self, topology: &Topology) -> bool {
        self.clusters
            .iter()
            .all(|nodes| topology.is_connected_within(nodes))
    }

    /// Random contiguous partition with roughly equal cluster sizes.
    ///
    /// Picks `k` random seed nodes, then repeatedly attaches a random
    /// unassigned node to a random neighboring cluster whose size is within
    /// `(1 + tolerance) · (n / k + 1)`. Restarts with new seeds when no
    /// unassigned node can be attached.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPartition`] for `k` outside `1..=n` or
    /// when every attempt gets stuck.
    pub fn leader_election_uniform(
        topology: &Topology,
        k: usize,
        seed: u64,
        tolerance: f64,
    ) -> Result<Self> {
        let n = topology.num_nodes();
        if k == 0 || k > n {
            return Err(ConfigError::InvalidPartition {
                reason: format!("cannot split {n} nodes into {k} clusters"),
            }
            .into());
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let size_limit = (1.0 + tolerance) * (n / k + 1) as f64;

        for attempt in 1..=MAX_PARTITION_ATTEMPTS {
            if let Some(assignment) = grow_clusters(topology, k, size_limit, &mut rng) {
                let partition = Self::from_assignment(&assignment);
                debug!(
                    topology = topology.name(),
                    clusters = k,
                    attempt,
                    sizes = ?partition.clusters.iter().map(Vec::len).collect::<Vec<_>>(),
                    "Partitioned topology"
                );
                return Ok(partition);
            }
            warn!(attempt, "Partition attempt got stuck, restarting with new seeds");
        }
        Err(ConfigError::InvalidPartition {
            reason: format!("no contiguous partition into {k} clusters after {MAX_PARTITION_ATTEMPTS} attempts"),
        }
        .into())
    }

    /// Both endpoints of `pair` lie in the same cluster.
    #[must_use]
    pub fn is_intra(&self, assignment: &[Option<usize>], pair: Pair) -> bool {
        cluster_of(assignment, pair.src).is_some() && cluster_of(assignment, pair.src) == cluster_of(assignment, pair.dst)
    }

    /// Collapse every cluster into one node.
    ///
    /// Edges between clusters are merged and carry the summed capacity.
    ///
    /// # Errors
    ///
    /// Returns an error if the partition does not match `topology`.
    pub fn abstract_topology(&self, topology: &Topology) -> Result<Topology> {
        self.validate(topology)?;
        let assignment = self.assignment(topology.num_nodes());
        let mut capacity: BTreeMap<(usize, usize), f64> = BTreeMap::new();
        for edge in topology.edges() {
            let (Some(a), Some(b)) = (assignment[edge.src], assignment[edge.dst]) else {
                continue;
            };
            if a != b {
                *capacity.entry((a, b)).or_default() += edge.capacity;
            }
        }
        let mut abstracted = Topology::new(format!("{}_abstract", topology.name()), self.len());
        for ((a, b), cap) in capacity {
            abstracted.add_edge(a, b, cap)?;
        }
        Ok(abstracted)
    }
}

/// How well a partition separates the topology.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartitionStats {
    /// Directed edges with both endpoints in one cluster.
    pub intra_edges: usize,
    /// Directed edges crossing a cluster boundary.
    pub inter_edges: usize,
    /// Intra-cluster edges per cluster.
    pub cluster_edges: Vec<usize>,
    /// Paths enumerated per intra-cluster pair.
    pub num_paths: usize,
    /// Candidate paths of intra-cluster pairs that never leave their cluster.
    pub contained_paths: usize,
    pub total_paths: usize,
}

impl PartitionStats {
    /// Share of intra-cluster candidate paths that stay inside the cluster.
    ///
    /// One when there are no intra-cluster pairs.
    #[must_use]
    pub fn contained_fraction(&self) -> f64 {
        if self.total_paths == 0 {
            1.0
        } else {
            self.contained_paths as f64 / self.total_paths as f64
        }
    }
}

impl Partition {
    /// Edge cut and path containment of this partition over `topology`.
    ///
    /// Enumerates up to `num_paths` shortest paths for every pair whose
    /// endpoints share a cluster and counts the ones that never visit
    /// another cluster.
    ///
    /// # Errors
    ///
    /// Returns an error if the partition does not match `topology`.
    pub fn stats(&self, topology: &Topology, num_paths: usize) -> Result<PartitionStats> {
        self.validate(topology)?;
        let assignment = self.assignment(topology.num_nodes());
        let mut cluster_edges = vec![0usize; self.len()];
        let mut inter_edges = 0;
        for edge in topology.edges() {
            match (cluster_of(&assignment, edge.src), cluster_of(&assignment, edge.dst)) {
                (Some(a), Some(b)) if a == b => cluster_edges[a] += 1,
                _ => inter_edges += 1,
            }
        }

        let intra_pairs: Vec<Pair> = topology
            .pairs()
            .filter(|&pair| self.is_intra(&assignment, pair))
            .collect();
        let table = PathTable::compute_for(topology, &intra_pairs, num_paths);
        let (mut contained_paths, mut total_paths) = (0, 0);
        for &pair in &intra_pairs {
            let home = cluster_of(&assignment, pair.src);
            for path in table.paths(pair) {
                total_paths += 1;
                if path.iter().all(|&node| cluster_of(&assignment, node) == home) {
                    contained_paths += 1;
                }
            }
        }

        Ok(PartitionStats {
            intra_edges: cluster_edges.iter().sum(),
            inter_edges,
            cluster_edges,
            num_paths,
            contained_paths,
            total_paths,
        })
    }
}

fn cluster_of(assignment: &[Option<usize>], node: NodeId) -> Option<usize> {
    assignment.get(node).copied().flatten()
}

/// One growth attempt; `None` when some node cannot be attached.
fn grow_clusters(
    topology: &Topology,
    k: usize,
    size_limit: f64,
    rng: &mut StdRng,
) -> Option<Vec<usize>> {
    let n = topology.num_nodes();
    let mut assignment: Vec<Option<usize>> = vec![None; n];
    let mut sizes = vec![0usize; k];
    for (c, node) in topology.nodes().choose_multiple(rng, k).into_iter().enumerate() {
        assignment[node] = Some(c);
        sizes[c] = 1;
    }

    loop {
        let mut unassigned: Vec<NodeId> = (0..n).filter(|&v| assignment[v].is_none()).collect();
        if unassigned.is_empty() {
            break;
        }
        unassigned.shuffle(rng);
        let attached = unassigned.iter().find_map(|&node| {
            let mut options: Vec<usize> = topology
                .neighbors(node)
                .into_iter()
                .filter_map(|v| assignment[v])
                .filter(|&c| (sizes[c] as f64) <= size_limit)
                .collect();
            options.sort_unstable();
            options.dedup();
            options.choose(rng).map(|&c| (node, c))
        });
        let (node, cluster) = attached?;
        assignment[node] = Some(cluster);
        sizes[cluster] += 1;
    }
    assignment.into_iter().collect()
}
