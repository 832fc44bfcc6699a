//! Per-pair admissibility of inputs.

use std::collections::BTreeMap;

use serde::Serialize;

use super::demand::Pair;

/// Why an input pair carries no decision variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Exclusion {
    /// No path connects the pair.
    Unreachable,
    /// Every quantization level was filtered out for this pair.
    NoAdmissibleLevel,
    /// The pair's upper bound is zero.
    ZeroBound,
    /// The pair is further apart than the locality limit.
    OutOfRange,
}

/// What an input pair may take in a search session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Admissibility {
    /// Free decision variable.
    Free,
    /// Pinned to a constant.
    Pinned(f64),
    /// Forced to zero.
    Excluded(Exclusion),
}

/// Locality/validity record for every pair of a session.
///
/// Computed once while inputs are built and read-only afterwards.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LocalityMap {
    entries: BTreeMap<Pair, Admissibility>,
}

impl LocalityMap {
    pub(crate) fn insert(&mut self, pair: Pair, admissibility: Admissibility) {
        self.entries.insert(pair, admissibility);
    }

    /// Admissibility of `pair`; pairs never recorded are excluded as unreachable.
    #[must_use]
    pub fn get(&self, pair: Pair) -> Admissibility {
        self.entries
            .get(&pair)
            .copied()
            .unwrap_or(Admissibility::Excluded(Exclusion::Unreachable))
    }

    /// True when `pair` has a free decision variable.
    #[must_use]
    pub fn is_free(&self, pair: Pair) -> bool {
        matches!(self.get(pair), Admissibility::Free)
    }

    /// Pairs with a free decision variable.
    pub fn free_pairs(&self) -> impl Iterator<Item = Pair> + '_ {
        self.entries
            .iter()
            .filter(|(_, a)| matches!(a, Admissibility::Free))
            .map(|(p, _)| *p)
    }

    /// Number of excluded pairs.
    #[must_use]
    pub fn excluded_count(&self) -> usize {
        self.entries
            .values()
            .filter(|a| matches!(a, Admissibility::Excluded(_)))
            .count()
    }

    /// Iterate over every recorded pair.
    pub fn iter(&self) -> impl Iterator<Item = (Pair, Admissibility)> + '_ {
        self.entries.iter().map(|(p, a)| (*p, *a))
    }
}
