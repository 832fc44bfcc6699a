//! Demand pairs and demand matrices.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::DomainError;
use super::topology::{NodeId, Topology};

/// Values at or below this are treated as zero demand.
pub const DEMAND_EPSILON: f64 = 1e-6;

/// Ordered source/destination pair of an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Pair {
    /// Source node.
    pub src: NodeId,
    /// Destination node.
    pub dst: NodeId,
}

impl Pair {
    /// Create a pair.
    #[must_use]
    pub const fn new(src: NodeId, dst: NodeId) -> Self {
        Self { src, dst }
    }

    /// The same pair in the opposite direction.
    #[must_use]
    pub const fn reversed(self) -> Self {
        Self {
            src: self.dst,
            dst: self.src,
        }
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.src, self.dst)
    }
}

impl FromStr for Pair {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DomainError::InvalidPair { raw: s.to_string() };
        let inner = s
            .trim()
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(invalid)?;
        let (src, dst) = inner.split_once(',').ok_or_else(invalid)?;
        let src = src.trim().parse().map_err(|_| invalid())?;
        let dst = dst.trim().parse().map_err(|_| invalid())?;
        Ok(Self { src, dst })
    }
}

/// Resolved numeric value per input pair.
///
/// Serialized as a JSON object keyed by `"(src, dst)"`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, f64>", into = "BTreeMap<String, f64>")]
pub struct DemandMatrix {
    values: BTreeMap<Pair, f64>,
}

impl DemandMatrix {
    /// Empty matrix.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Value for `pair`, zero when absent.
    #[must_use]
    pub fn get(&self, pair: Pair) -> f64 {
        self.values.get(&pair).copied().unwrap_or(0.0)
    }

    /// True when `pair` has an explicit entry.
    #[must_use]
    pub fn contains(&self, pair: Pair) -> bool {
        self.values.contains_key(&pair)
    }

    /// Set the value for `pair`.
    pub fn set(&mut self, pair: Pair, value: f64) {
        self.values.insert(pair, value);
    }

    /// Builder form of [`DemandMatrix::set`].
    #[must_use]
    pub fn with(mut self, pair: Pair, value: f64) -> Self {
        self.set(pair, value);
        self
    }

    /// Remove the entry for `pair`.
    pub fn remove(&mut self, pair: Pair) -> Option<f64> {
        self.values.remove(&pair)
    }

    /// Iterate over explicit entries.
    pub fn iter(&self) -> impl Iterator<Item = (Pair, f64)> + '_ {
        self.values.iter().map(|(p, v)| (*p, *v))
    }

    /// Mutable access to a value, inserting zero first.
    pub fn entry_mut(&mut self, pair: Pair) -> &mut f64 {
        self.values.entry(pair).or_insert(0.0)
    }

    /// Number of explicit entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Copy every entry of `other` into this matrix.
    pub fn extend_from(&mut self, other: &DemandMatrix) {
        for (pair, value) in other.iter() {
            self.set(pair, value);
        }
    }

    /// Give every ordered node pair of `topology` an entry, defaulting to zero.
    pub fn complete(&mut self, topology: &Topology) {
        for pair in topology.pairs() {
            self.values.entry(pair).or_insert(0.0);
        }
    }

    /// True when every ordered node pair of `topology` has an entry.
    #[must_use]
    pub fn is_complete(&self, topology: &Topology) -> bool {
        topology.pairs().all(|pair| self.values.contains_key(&pair))
    }

    /// Sum of all values.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.values.values().sum()
    }

    /// Number of strictly positive entries.
    #[must_use]
    pub fn count_positive(&self) -> usize {
        self.values.values().filter(|v| **v > DEMAND_EPSILON).count()
    }

    /// Fraction of the topology's pairs carrying positive demand.
    #[must_use]
    pub fn density(&self, topology: &Topology) -> f64 {
        let pairs = topology.num_pairs();
        if pairs == 0 {
            return 0.0;
        }
        self.count_positive() as f64 / pairs as f64
    }

    /// Replace values within `DEMAND_EPSILON` of zero by exactly zero.
    pub fn clean(&mut self) {
        for value in self.values.values_mut() {
            if value.abs() <= DEMAND_EPSILON {
                *value = 0.0;
            }
        }
    }
}

impl FromIterator<(Pair, f64)> for DemandMatrix {
    fn from_iter<I: IntoIterator<Item = (Pair, f64)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl TryFrom<BTreeMap<String, f64>> for DemandMatrix {
    type Error = DomainError;

    fn try_from(raw: BTreeMap<String, f64>) -> Result<Self, Self::Error> {
        raw.into_iter()
            .map(|(key, value)| Ok((key.parse::<Pair>()?, value)))
            .collect()
    }
}

impl From<DemandMatrix> for BTreeMap<String, f64> {
    fn from(matrix: DemandMatrix) -> Self {
        matrix
            .values
            .into_iter()
            .map(|(pair, value)| (pair.to_string(), value))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_round_trips_through_display() {
        let pair = Pair::new(3, 11);
        assert_eq!(pair.to_string(), "(3, 11)");
        assert_eq!("(3, 11)".parse::<Pair>().unwrap(), pair);
        assert_eq!(" (3,11) ".parse::<Pair>().unwrap(), pair);
    }

    #[test]
    fn test_pair_parse_rejects_garbage() {
        assert!(matches!(
            "3-11".parse::<Pair>(),
            Err(DomainError::InvalidPair { .. })
        ));
    }

    #[test]
    fn test_complete_fills_zeros() {
        let topology = Topology::ring(4, 10.0).unwrap();
        let mut demands = DemandMatrix::new().with(Pair::new(0, 1), 2.5);

        assert!(!demands.is_complete(&topology));
        demands.complete(&topology);

        assert!(demands.is_complete(&topology));
        assert_eq!(demands.len(), 12);
        assert_eq!(demands.get(Pair::new(0, 1)), 2.5);
        assert_eq!(demands.count_positive(), 1);
    }

    #[test]
    fn test_json_uses_pair_keys() {
        let demands = DemandMatrix::new().with(Pair::new(0, 2), 1.0);
        let json = serde_json::to_string(&demands).unwrap();
        assert_eq!(json, r#"{"(0, 2)":1.0}"#);
        let back: DemandMatrix = serde_json::from_str(&json).unwrap();
        assert_eq!(back, demands);
    }
}
