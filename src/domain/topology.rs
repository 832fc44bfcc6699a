//! Directed capacitated network topologies.
//!
//! Topologies load from the networkx node-link JSON layout used by the
//! topology files (`nodes`, `links`/`edges` with `source`, `target`,
//! `capacity`); undirected files get both directions.

use std::collections::{HashMap, VecDeque};
use std::path::Path;

use serde::Deserialize;

use super::demand::Pair;
use super::error::DomainError;
use crate::error::Result;

/// Node identifier; nodes are numbered `0..num_nodes`.
pub type NodeId = usize;

/// A directed, capacitated link.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    /// Tail node.
    pub src: NodeId,
    /// Head node.
    pub dst: NodeId,
    /// Link capacity.
    pub capacity: f64,
}

/// Directed graph with per-edge capacities.
#[derive(Debug, Clone)]
pub struct Topology {
    name: String,
    num_nodes: usize,
    edges: Vec<Edge>,
    out: Vec<Vec<NodeId>>,
    index: HashMap<(NodeId, NodeId), usize>,
}

impl Topology {
    /// Empty topology with `num_nodes` isolated nodes.
    #[must_use]
    pub fn new(name: impl Into<String>, num_nodes: usize) -> Self {
        Self {
            name: name.into(),
            num_nodes,
            edges: Vec::new(),
            out: vec![Vec::new(); num_nodes],
            index: HashMap::new(),
        }
    }

    /// Bidirectional ring `0 - 1 - ... - (n-1) - 0` with uniform capacity.
    ///
    /// # Errors
    ///
    /// Returns an error for non-positive capacities.
    pub fn ring(num_nodes: usize, capacity: f64) -> Result<Self> {
        let mut topology = Self::new(format!("ring_{num_nodes}"), num_nodes);
        if num_nodes < 2 {
            return Ok(topology);
        }
        for node in 0..num_nodes {
            let next = (node + 1) % num_nodes;
            if node == next || topology.capacity(node, next).is_some() {
                continue;
            }
            topology.add_link(node, next, capacity)?;
        }
        Ok(topology)
    }

    /// Add a directed edge; an existing edge has its capacity replaced.
    ///
    /// # Errors
    ///
    /// Rejects unknown nodes, self loops and invalid capacities.
    pub fn add_edge(&mut self, src: NodeId, dst: NodeId, capacity: f64) -> Result<()> {
        self.check_node(src)?;
        self.check_node(dst)?;
        if src == dst {
            return Err(DomainError::SelfLoop { node: src }.into());
        }
        if !(capacity.is_finite() && capacity > 0.0) {
            return Err(DomainError::InvalidCapacity { src, dst, capacity }.into());
        }
        if let Some(&i) = self.index.get(&(src, dst)) {
            self.edges[i].capacity = capacity;
            return Ok(());
        }
        self.index.insert((src, dst), self.edges.len());
        self.edges.push(Edge { src, dst, capacity });
        let out = &mut self.out[src];
        out.push(dst);
        out.sort_unstable();
        Ok(())
    }

    /// Add edges in both directions.
    ///
    /// # Errors
    ///
    /// See [`Topology::add_edge`].
    pub fn add_link(&mut self, a: NodeId, b: NodeId, capacity: f64) -> Result<()> {
        self.add_edge(a, b, capacity)?;
        self.add_edge(b, a, capacity)
    }

    /// Parse a node-link JSON document.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed JSON or invalid links.
    pub fn from_node_link_json(name: impl Into<String>, json: &str) -> Result<Self> {
        let raw: NodeLinkGraph = serde_json::from_str(json)?;
        let mut ids: Vec<i64> = raw.nodes.iter().map(|n| n.id).collect();
        ids.sort_unstable();
        ids.dedup();
        let dense: HashMap<i64, NodeId> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();

        let mut topology = Self::new(name, ids.len());
        for link in &raw.links {
            let lookup = |id: i64| {
                dense.get(&id).copied().ok_or(DomainError::UnknownNode {
                    node: usize::try_from(id).unwrap_or(usize::MAX),
                    num_nodes: ids.len(),
                })
            };
            let src = lookup(link.source)?;
            let dst = lookup(link.target)?;
            let capacity = link.capacity.unwrap_or(raw.default_capacity());
            if raw.directed {
                topology.add_edge(src, dst, capacity)?;
            } else {
                topology.add_link(src, dst, capacity)?;
            }
        }
        Ok(topology)
    }

    /// Load a node-link JSON file; the file stem becomes the topology name.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "topology".into());
        Self::from_node_link_json(name, &content)
    }

    /// Topology name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of nodes.
    #[must_use]
    pub const fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    /// Number of ordered pairs of distinct nodes.
    #[must_use]
    pub const fn num_pairs(&self) -> usize {
        self.num_nodes * self.num_nodes.saturating_sub(1)
    }

    /// Node ids.
    pub fn nodes(&self) -> std::ops::Range<NodeId> {
        0..self.num_nodes
    }

    /// All directed edges.
    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Capacity of edge `(src, dst)` if present.
    #[must_use]
    pub fn capacity(&self, src: NodeId, dst: NodeId) -> Option<f64> {
        self.index.get(&(src, dst)).map(|&i| self.edges[i].capacity)
    }

    /// Largest edge capacity, zero for an edgeless topology.
    #[must_use]
    pub fn max_capacity(&self) -> f64 {
        self.edges.iter().map(|e| e.capacity).fold(0.0, f64::max)
    }

    /// Out-neighbors of `node` in ascending order.
    #[must_use]
    pub fn successors(&self, node: NodeId) -> &[NodeId] {
        self.out.get(node).map_or(&[], Vec::as_slice)
    }

    /// Neighbors ignoring edge direction, ascending and deduplicated.
    #[must_use]
    pub fn neighbors(&self, node: NodeId) -> Vec<NodeId> {
        let mut all: Vec<NodeId> = self.successors(node).to_vec();
        all.extend(self.edges.iter().filter(|e| e.dst == node).map(|e| e.src));
        all.sort_unstable();
        all.dedup();
        all
    }

    /// Every ordered pair of distinct nodes.
    pub fn pairs(&self) -> impl Iterator<Item = Pair> + '_ {
        let n = self.num_nodes;
        (0..n).flat_map(move |s| (0..n).filter(move |t| *t != s).map(move |t| Pair::new(s, t)))
    }

    /// Hop distances from `src` along directed edges; `None` when unreachable.
    #[must_use]
    pub fn hop_distances(&self, src: NodeId) -> Vec<Option<usize>> {
        let mut dist = vec![None; self.num_nodes];
        if src >= self.num_nodes {
            return dist;
        }
        dist[src] = Some(0);
        let mut queue = VecDeque::from([src]);
        while let Some(u) = queue.pop_front() {
            let next = dist[u].map_or(0, |d| d + 1);
            for &v in self.successors(u) {
                if dist[v].is_none() {
                    dist[v] = Some(next);
                    queue.push_back(v);
                }
            }
        }
        dist
    }

    /// Hop distance table for every pair.
    #[must_use]
    pub fn all_hop_distances(&self) -> HashMap<Pair, usize> {
        let mut table = HashMap::new();
        for src in self.nodes() {
            for (dst, d) in self.hop_distances(src).into_iter().enumerate() {
                if let (Some(d), true) = (d, dst != src) {
                    table.insert(Pair::new(src, dst), d);
                }
            }
        }
        table
    }

    /// True when `nodes` induce a weakly connected subgraph.
    #[must_use]
    pub fn is_connected_within(&self, nodes: &[NodeId]) -> bool {
        let Some(&start) = nodes.first() else {
            return true;
        };
        let member: std::collections::HashSet<NodeId> = nodes.iter().copied().collect();
        let mut seen = std::collections::HashSet::from([start]);
        let mut queue = VecDeque::from([start]);
        while let Some(u) = queue.pop_front() {
            for v in self.neighbors(u) {
                if member.contains(&v) && seen.insert(v) {
                    queue.push_back(v);
                }
            }
        }
        seen.len() == member.len()
    }

    fn check_node(&self, node: NodeId) -> Result<()> {
        if node < self.num_nodes {
            Ok(())
        } else {
            Err(DomainError::UnknownNode {
                node,
                num_nodes: self.num_nodes,
            }
            .into())
        }
    }
}

#[derive(Debug, Deserialize)]
struct NodeLinkGraph {
    #[serde(default)]
    directed: bool,
    nodes: Vec<NodeLinkNode>,
    #[serde(alias = "edges")]
    links: Vec<NodeLinkEdge>,
    #[serde(default)]
    graph: Option<serde_json::Value>,
}

impl NodeLinkGraph {
    fn default_capacity(&self) -> f64 {
        self.graph
            .as_ref()
            .and_then(|g| g.get("capacity"))
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(DEFAULT_LINK_CAPACITY)
    }
}

#[derive(Debug, Deserialize)]
struct NodeLinkNode {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct NodeLinkEdge {
    source: i64,
    target: i64,
    #[serde(default)]
    capacity: Option<f64>,
}

/// Capacity assigned to links without one.
pub const DEFAULT_LINK_CAPACITY: f64 = 1000.0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_has_bidirectional_links() {
        let ring = Topology::ring(4, 10.0).unwrap();
        assert_eq!(ring.edges().len(), 8);
        assert_eq!(ring.capacity(0, 1), Some(10.0));
        assert_eq!(ring.capacity(1, 0), Some(10.0));
        assert_eq!(ring.capacity(0, 2), None);
        assert_eq!(ring.num_pairs(), 12);
    }

    #[test]
    fn test_hop_distances_on_ring() {
        let ring = Topology::ring(6, 1.0).unwrap();
        let dist = ring.hop_distances(0);
        assert_eq!(dist, vec![Some(0), Some(1), Some(2), Some(3), Some(2), Some(1)]);
    }

    #[test]
    fn test_node_link_json_directed_and_undirected() {
        let directed = r#"{"directed": true, "nodes": [{"id": 0}, {"id": 1}],
            "links": [{"source": 0, "target": 1, "capacity": 5.0}]}"#;
        let t = Topology::from_node_link_json("d", directed).unwrap();
        assert_eq!(t.capacity(0, 1), Some(5.0));
        assert_eq!(t.capacity(1, 0), None);

        let undirected = r#"{"directed": false, "nodes": [{"id": 10}, {"id": 20}],
            "edges": [{"source": 10, "target": 20}]}"#;
        let t = Topology::from_node_link_json("u", undirected).unwrap();
        assert_eq!(t.capacity(0, 1), Some(DEFAULT_LINK_CAPACITY));
        assert_eq!(t.capacity(1, 0), Some(DEFAULT_LINK_CAPACITY));
    }

    #[test]
    fn test_rejects_self_loops_and_bad_capacity() {
        let mut t = Topology::new("t", 2);
        assert!(t.add_edge(0, 0, 1.0).is_err());
        assert!(t.add_edge(0, 1, 0.0).is_err());
        assert!(t.add_edge(0, 5, 1.0).is_err());
    }

    #[test]
    fn test_connected_within() {
        let ring = Topology::ring(6, 1.0).unwrap();
        assert!(ring.is_connected_within(&[0, 1, 2]));
        assert!(!ring.is_connected_within(&[0, 2]));
    }
}
