//! Simple-path enumeration.
//!
//! Paths are ranked by hop count with a lexicographic tie-break, so repeated
//! runs over the same topology produce identical path tables. Batch
//! computation fans out over worker threads, each owning a disjoint slice of
//! pairs, and merges into a shared concurrent map.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::Path as FsPath;

use dashmap::DashMap;
use tracing::debug;

use super::demand::Pair;
use super::topology::{NodeId, Topology};
use crate::error::Result;

/// Ordered node sequence from source to destination.
pub type Path = Vec<NodeId>;

/// Iterate over the directed edges of a path.
pub fn path_edges(path: &[NodeId]) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
    path.windows(2).map(|w| (w[0], w[1]))
}

/// Fewest-hop path avoiding the banned nodes and edges.
fn shortest_path(
    topology: &Topology,
    src: NodeId,
    dst: NodeId,
    banned_nodes: &HashSet<NodeId>,
    banned_edges: &HashSet<(NodeId, NodeId)>,
) -> Option<Path> {
    if src >= topology.num_nodes() || dst >= topology.num_nodes() || banned_nodes.contains(&src) {
        return None;
    }
    let mut parent: Vec<Option<NodeId>> = vec![None; topology.num_nodes()];
    let mut seen = vec![false; topology.num_nodes()];
    seen[src] = true;
    let mut queue = VecDeque::from([src]);
    while let Some(u) = queue.pop_front() {
        if u == dst {
            let mut path = vec![dst];
            let mut cur = dst;
            while let Some(p) = parent[cur] {
                path.push(p);
                cur = p;
            }
            path.reverse();
            return Some(path);
        }
        for &v in topology.successors(u) {
            if seen[v] || banned_nodes.contains(&v) || banned_edges.contains(&(u, v)) {
                continue;
            }
            seen[v] = true;
            parent[v] = Some(u);
            queue.push_back(v);
        }
    }
    None
}

/// Up to `k` loop-free paths from `src` to `dst`, fewest hops first (Yen).
#[must_use]
pub fn k_shortest_paths(topology: &Topology, src: NodeId, dst: NodeId, k: usize) -> Vec<Path> {
    if k == 0 || src == dst {
        return Vec::new();
    }
    let Some(first) = shortest_path(topology, src, dst, &HashSet::new(), &HashSet::new()) else {
        return Vec::new();
    };
    let mut accepted: Vec<Path> = vec![first];
    let mut candidates: Vec<Path> = Vec::new();

    while accepted.len() < k {
        let previous = accepted[accepted.len() - 1].clone();
        for j in 0..previous.len() - 1 {
            let spur = previous[j];
            let root = &previous[..=j];

            let banned_edges: HashSet<(NodeId, NodeId)> = accepted
                .iter()
                .filter(|p| p.len() > j + 1 && &p[..=j] == root)
                .map(|p| (p[j], p[j + 1]))
                .collect();
            let banned_nodes: HashSet<NodeId> = root[..j].iter().copied().collect();

            if let Some(spur_path) = shortest_path(topology, spur, dst, &banned_nodes, &banned_edges) {
                let mut total: Path = root[..j].to_vec();
                total.extend(spur_path);
                if !accepted.contains(&total) && !candidates.contains(&total) {
                    candidates.push(total);
                }
            }
        }
        if candidates.is_empty() {
            break;
        }
        candidates.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
        accepted.push(candidates.remove(0));
    }
    accepted
}

/// Candidate paths for every demand pair.
#[derive(Debug, Clone, Default)]
pub struct PathTable {
    paths: BTreeMap<Pair, Vec<Path>>,
    max_paths: usize,
}

impl PathTable {
    /// Compute up to `k` paths for every ordered pair of `topology`.
    #[must_use]
    pub fn compute(topology: &Topology, k: usize) -> Self {
        let pairs: Vec<Pair> = topology.pairs().collect();
        Self::compute_for(topology, &pairs, k)
    }

    /// Compute up to `k` paths for the given pairs in parallel.
    #[must_use]
    pub fn compute_for(topology: &Topology, pairs: &[Pair], k: usize) -> Self {
        let workers = num_cpus::get().max(1).min(pairs.len().max(1));
        let chunk = pairs.len().div_ceil(workers).max(1);
        let shared: DashMap<Pair, Vec<Path>> = DashMap::with_capacity(pairs.len());

        std::thread::scope(|scope| {
            for slice in pairs.chunks(chunk) {
                let shared = &shared;
                scope.spawn(move || {
                    for pair in slice {
                        let found = k_shortest_paths(topology, pair.src, pair.dst, k);
                        if !found.is_empty() {
                            shared.insert(*pair, found);
                        }
                    }
                });
            }
        });

        debug!(
            topology = topology.name(),
            pairs = pairs.len(),
            reachable = shared.len(),
            workers,
            "Computed path table"
        );
        Self {
            paths: shared.into_iter().collect(),
            max_paths: k,
        }
    }

    /// Build a table from caller-supplied paths.
    #[must_use]
    pub fn predetermined(paths: BTreeMap<Pair, Vec<Path>>) -> Self {
        let max_paths = paths.values().map(Vec::len).max().unwrap_or(0);
        Self { paths, max_paths }
    }

    /// Parse predetermined paths from JSON keyed by `"(src, dst)"`.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed JSON or pair keys.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: BTreeMap<String, Vec<Path>> = serde_json::from_str(json)?;
        let paths = raw
            .into_iter()
            .map(|(key, paths)| Ok((key.parse::<Pair>()?, paths)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        Ok(Self::predetermined(paths))
    }

    /// Load predetermined paths from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<FsPath>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Paths of `pair`, empty when unreachable.
    #[must_use]
    pub fn paths(&self, pair: Pair) -> &[Path] {
        self.paths.get(&pair).map_or(&[], Vec::as_slice)
    }

    /// Fewest-hop path of `pair`.
    #[must_use]
    pub fn shortest(&self, pair: Pair) -> Option<&Path> {
        self.paths.get(&pair).and_then(|p| p.first())
    }

    /// True when `pair` has at least one path.
    #[must_use]
    pub fn is_reachable(&self, pair: Pair) -> bool {
        self.paths.get(&pair).is_some_and(|p| !p.is_empty())
    }

    /// Pairs with at least one path.
    pub fn pairs(&self) -> impl Iterator<Item = Pair> + '_ {
        self.paths.keys().copied()
    }

    /// Path budget the table was computed with.
    #[must_use]
    pub const fn max_paths(&self) -> usize {
        self.max_paths
    }

    /// Number of pairs with paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// True when no pair has a path.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}
