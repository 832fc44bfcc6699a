//! Input variables shared by the reference and heuristic encoders.
//!
//! One [`InputVariable`] exists per admissible demand pair. Both inner
//! problems of a search read the same set, which is what ties the two
//! encodings together inside one flat model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::constraint::VariableBounds;
use super::demand::{DemandMatrix, Pair, DEMAND_EPSILON};
use super::locality::{Admissibility, Exclusion, LocalityMap};
use super::model::{Model, ModelId};
use super::polynomial::{Polynomial, Var};
use super::topology::Topology;

/// Tolerance used when comparing demand values against levels and bounds.
const LEVEL_TOLERANCE: f64 = 1e-9;

/// How input pairs are represented in the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// One continuous variable per pair.
    Continuous,
    /// A weighted sum of binary level selectors per pair.
    Quantized,
    /// Constants taken from a demand matrix.
    Fixed,
}

/// Binary selector for one quantization level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Selector {
    /// Demand value selected by the indicator.
    pub level: f64,
    /// The binary indicator.
    pub var: Var,
}

/// Representation of one input pair.
#[derive(Debug, Clone, PartialEq)]
pub enum InputVariable {
    /// Continuous decision variable.
    Continuous(Var),
    /// `Σ level·selector` with at most one selector set.
    Quantized(Vec<Selector>),
    /// Constant value.
    Fixed(f64),
}

impl InputVariable {
    /// Linear expression of the input value.
    #[must_use]
    pub fn expression(&self) -> Polynomial {
        match self {
            Self::Continuous(var) => Polynomial::from(*var),
            Self::Quantized(selectors) => selectors
                .iter()
                .fold(Polynomial::new(), |acc, s| acc.with_term(s.var, s.level)),
            Self::Fixed(value) => Polynomial::constant(*value),
        }
    }

    /// Split the input into the parts at or below `threshold` and above it.
    ///
    /// Only exact for quantized and fixed inputs, whose values are known per
    /// selector; continuous inputs return `None`.
    #[must_use]
    pub fn split_at(&self, threshold: f64) -> Option<(Polynomial, Polynomial)> {
        match self {
            Self::Continuous(_) => None,
            Self::Quantized(selectors) => {
                let mut small = Polynomial::new();
                let mut large = Polynomial::new();
                for s in selectors {
                    if s.level <= threshold + LEVEL_TOLERANCE {
                        small.add_term(s.var, s.level);
                    } else {
                        large.add_term(s.var, s.level);
                    }
                }
                Some((small, large))
            }
            Self::Fixed(value) if *value <= threshold + LEVEL_TOLERANCE => {
                Some((Polynomial::constant(*value), Polynomial::new()))
            }
            Self::Fixed(value) => Some((Polynomial::new(), Polynomial::constant(*value))),
        }
    }

    /// Number of non-zero values this input takes, as an expression.
    ///
    /// Quantized inputs sum their selectors; a strictly positive fixed input
    /// is the constant one. Continuous inputs count as zero.
    #[must_use]
    pub fn selector_sum(&self) -> Polynomial {
        match self {
            Self::Quantized(selectors) => selectors
                .iter()
                .fold(Polynomial::new(), |acc, s| acc.with_term(s.var, 1.0)),
            Self::Fixed(value) if *value > DEMAND_EPSILON => Polynomial::constant(1.0),
            _ => Polynomial::new(),
        }
    }
}

/// Distance-based restriction of quantization levels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelRestriction {
    /// Levels at or above this value are "large".
    pub large_demand_lb: f64,
    /// Small levels are only allowed for pairs at most this many hops apart.
    pub max_small_distance: Option<usize>,
    /// Large levels are only allowed for pairs at most this many hops apart.
    pub max_large_distance: Option<usize>,
}

impl LevelRestriction {
    /// True when `level` is admissible for a pair `distance` hops apart.
    #[must_use]
    pub fn admits(&self, level: f64, distance: usize) -> bool {
        let limit = if level >= self.large_demand_lb {
            self.max_large_distance
        } else {
            self.max_small_distance
        };
        limit.map_or(true, |max| distance <= max)
    }
}

/// What to build for a search session.
#[derive(Debug, Clone, Copy)]
pub struct InputSpec<'a> {
    /// Representation of free pairs.
    pub mode: InputMode,
    /// Global upper bound.
    pub demand_ub: Option<f64>,
    /// Per-pair upper bounds; pairs missing from the map are bounded by zero.
    pub demand_ubs: Option<&'a BTreeMap<Pair, f64>>,
    /// Quantization levels for [`InputMode::Quantized`].
    pub levels: &'a [f64],
    /// Optional distance restriction of levels.
    pub restriction: Option<&'a LevelRestriction>,
    /// Pairs further apart than this many hops are forced to zero.
    pub max_distance: Option<usize>,
    /// Pairs pinned to constants.
    pub pinned: &'a DemandMatrix,
}

/// Inputs of one search session.
#[derive(Debug, Clone)]
pub struct InputSet {
    model_id: ModelId,
    mode: InputMode,
    inputs: BTreeMap<Pair, InputVariable>,
    bounds: BTreeMap<Pair, f64>,
    locality: LocalityMap,
}

impl InputSet {
    /// Create the input variables of every pair of `topology` in `model`.
    ///
    /// Pairs without a directed path are excluded. In quantized mode the
    /// per-pair selectors get a `Σ selectors <= 1` constraint, and pairs left
    /// without any admissible level are recorded as excluded.
    pub fn build(model: &mut Model, topology: &Topology, spec: &InputSpec<'_>) -> Self {
        let distances = topology.all_hop_distances();
        let mut set = Self::empty(model.id(), spec.mode);

        for pair in topology.pairs() {
            let Some(&distance) = distances.get(&pair) else {
                set.locality
                    .insert(pair, Admissibility::Excluded(Exclusion::Unreachable));
                continue;
            };
            if spec.max_distance.is_some_and(|max| distance > max) && !spec.pinned.contains(pair) {
                set.locality
                    .insert(pair, Admissibility::Excluded(Exclusion::OutOfRange));
                continue;
            }
            if spec.mode == InputMode::Fixed || spec.pinned.contains(pair) {
                let value = spec.pinned.get(pair);
                set.inputs.insert(pair, InputVariable::Fixed(value));
                set.locality.insert(pair, Admissibility::Pinned(value));
                continue;
            }

            let ub = match (spec.demand_ubs, spec.demand_ub) {
                (Some(per_pair), _) => per_pair.get(&pair).copied().unwrap_or(0.0),
                (None, Some(ub)) => ub,
                (None, None) => 0.0,
            };

            let input = match spec.mode {
                InputMode::Continuous if ub > DEMAND_EPSILON => Some(InputVariable::Continuous(
                    model.continuous(format!("demand{pair}"), VariableBounds::bounded(0.0, ub)),
                )),
                InputMode::Quantized => {
                    let admissible: Vec<f64> = spec
                        .levels
                        .iter()
                        .copied()
                        .filter(|&level| level > DEMAND_EPSILON && level <= ub + LEVEL_TOLERANCE)
                        .filter(|&level| spec.restriction.map_or(true, |r| r.admits(level, distance)))
                        .collect();
                    if admissible.is_empty() {
                        None
                    } else {
                        let selectors: Vec<Selector> = admissible
                            .into_iter()
                            .map(|level| Selector {
                                level,
                                var: model.binary(format!("demand{pair}@{level}")),
                            })
                            .collect();
                        let one_hot = selectors
                            .iter()
                            .fold(Polynomial::constant(-1.0), |acc, s| acc.with_term(s.var, 1.0));
                        model.add_leq_zero(one_hot);
                        Some(InputVariable::Quantized(selectors))
                    }
                }
                _ => None,
            };

            match input {
                Some(input) => {
                    set.inputs.insert(pair, input);
                    set.bounds.insert(pair, ub);
                    set.locality.insert(pair, Admissibility::Free);
                }
                None if ub <= DEMAND_EPSILON => {
                    set.locality
                        .insert(pair, Admissibility::Excluded(Exclusion::ZeroBound));
                }
                None => {
                    set.locality
                        .insert(pair, Admissibility::Excluded(Exclusion::NoAdmissibleLevel));
                }
            }
        }
        set
    }

    /// Inputs fixed to the values of `demands`; missing pairs are zero.
    #[must_use]
    pub fn fixed(model_id: ModelId, topology: &Topology, demands: &DemandMatrix) -> Self {
        let distances = topology.all_hop_distances();
        let mut set = Self::empty(model_id, InputMode::Fixed);
        for pair in topology.pairs() {
            if distances.contains_key(&pair) {
                let value = demands.get(pair);
                set.inputs.insert(pair, InputVariable::Fixed(value));
                set.locality.insert(pair, Admissibility::Pinned(value));
            } else {
                set.locality
                    .insert(pair, Admissibility::Excluded(Exclusion::Unreachable));
            }
        }
        set
    }

    fn empty(model_id: ModelId, mode: InputMode) -> Self {
        Self {
            model_id,
            mode,
            inputs: BTreeMap::new(),
            bounds: BTreeMap::new(),
            locality: LocalityMap::default(),
        }
    }

    /// Model the variables were created in.
    #[must_use]
    pub const fn model_id(&self) -> ModelId {
        self.model_id
    }

    /// Representation of free pairs.
    #[must_use]
    pub const fn mode(&self) -> InputMode {
        self.mode
    }

    /// Input of `pair`, `None` when excluded.
    #[must_use]
    pub fn get(&self, pair: Pair) -> Option<&InputVariable> {
        self.inputs.get(&pair)
    }

    /// Linear expression of `pair`'s value; zero when excluded.
    #[must_use]
    pub fn expression(&self, pair: Pair) -> Polynomial {
        self.inputs
            .get(&pair)
            .map_or_else(Polynomial::new, InputVariable::expression)
    }

    /// All represented pairs.
    pub fn iter(&self) -> impl Iterator<Item = (Pair, &InputVariable)> + '_ {
        self.inputs.iter().map(|(p, i)| (*p, i))
    }

    /// Pairs with a free decision variable.
    pub fn free_pairs(&self) -> impl Iterator<Item = Pair> + '_ {
        self.locality.free_pairs()
    }

    /// Upper bound a free pair was built with.
    #[must_use]
    pub fn upper_bound(&self, pair: Pair) -> f64 {
        self.bounds.get(&pair).copied().unwrap_or(0.0)
    }

    /// Locality map of the session.
    #[must_use]
    pub const fn locality(&self) -> &LocalityMap {
        &self.locality
    }

    /// Every model variable owned by the inputs.
    #[must_use]
    pub fn parameters(&self) -> Vec<Var> {
        self.inputs
            .values()
            .flat_map(|input| match input {
                InputVariable::Continuous(var) => vec![*var],
                InputVariable::Quantized(selectors) => selectors.iter().map(|s| s.var).collect(),
                InputVariable::Fixed(_) => Vec::new(),
            })
            .collect()
    }

    /// Every selector indicator.
    #[must_use]
    pub fn selector_vars(&self) -> Vec<Var> {
        self.inputs
            .values()
            .flat_map(|input| match input {
                InputVariable::Quantized(selectors) => selectors.iter().map(|s| s.var).collect(),
                _ => Vec::new(),
            })
            .collect()
    }

    /// Number of non-zero inputs: selector indicators plus positive fixed inputs.
    #[must_use]
    pub fn indicator_sum(&self) -> Polynomial {
        self.inputs
            .values()
            .map(InputVariable::selector_sum)
            .sum()
    }

    /// Sum of all input expressions.
    #[must_use]
    pub fn total(&self) -> Polynomial {
        self.inputs.values().map(InputVariable::expression).sum()
    }

    /// Demand values at a model point.
    #[must_use]
    pub fn resolve(&self, values: &[f64]) -> DemandMatrix {
        let mut demands: DemandMatrix = self
            .inputs
            .iter()
            .map(|(pair, input)| (*pair, input.expression().evaluate(values)))
            .collect();
        demands.clean();
        demands
    }

    /// Selector assignment reproducing `demands`, if every free value is representable.
    ///
    /// Continuous inputs accept any value within bounds; quantized inputs
    /// need each value to be zero or one of their levels.
    #[must_use]
    pub fn seed_assignment(&self, demands: &DemandMatrix) -> Option<Vec<(Var, f64)>> {
        let mut assignment = Vec::new();
        for (pair, input) in &self.inputs {
            let value = demands.get(*pair);
            match input {
                InputVariable::Continuous(var) => {
                    if value > self.upper_bound(*pair) + LEVEL_TOLERANCE || value < -LEVEL_TOLERANCE {
                        return None;
                    }
                    assignment.push((*var, value.max(0.0)));
                }
                InputVariable::Quantized(selectors) => {
                    let chosen = selectors
                        .iter()
                        .position(|s| (s.level - value).abs() <= LEVEL_TOLERANCE.max(1e-6 * s.level));
                    if chosen.is_none() && value > DEMAND_EPSILON {
                        return None;
                    }
                    for (i, s) in selectors.iter().enumerate() {
                        assignment.push((s.var, if Some(i) == chosen { 1.0 } else { 0.0 }));
                    }
                }
                InputVariable::Fixed(_) => {}
            }
        }
        Some(assignment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec<'a>(mode: InputMode, levels: &'a [f64], pinned: &'a DemandMatrix) -> InputSpec<'a> {
        InputSpec {
            mode,
            demand_ub: Some(10.0),
            demand_ubs: None,
            levels,
            restriction: None,
            max_distance: None,
            pinned,
        }
    }

    #[test]
    fn test_quantized_inputs_get_one_hot_constraint() {
        let ring = Topology::ring(3, 10.0).unwrap();
        let mut model = Model::new();
        let pinned = DemandMatrix::new();
        let inputs = InputSet::build(&mut model, &ring, &spec(InputMode::Quantized, &[2.0, 5.0], &pinned));

        assert_eq!(inputs.selector_vars().len(), 12);
        // one "sum of selectors <= 1" per pair
        assert_eq!(model.num_constraints(), 6);
        let expr = inputs.expression(Pair::new(0, 1));
        assert_eq!(expr.len(), 2);
    }

    #[test]
    fn test_levels_above_bound_are_filtered() {
        let ring = Topology::ring(3, 10.0).unwrap();
        let mut model = Model::new();
        let pinned = DemandMatrix::new();
        let inputs = InputSet::build(
            &mut model,
            &ring,
            &spec(InputMode::Quantized, &[20.0, 30.0], &pinned),
        );

        assert!(inputs.selector_vars().is_empty());
        assert_eq!(
            inputs.locality().get(Pair::new(0, 1)),
            Admissibility::Excluded(Exclusion::NoAdmissibleLevel)
        );
    }

    #[test]
    fn test_distance_restriction_limits_large_levels() {
        let ring = Topology::ring(6, 10.0).unwrap();
        let mut model = Model::new();
        let pinned = DemandMatrix::new();
        let restriction = LevelRestriction {
            large_demand_lb: 5.0,
            max_small_distance: None,
            max_large_distance: Some(1),
        };
        let mut s = spec(InputMode::Quantized, &[1.0, 8.0], &pinned);
        s.restriction = Some(&restriction);
        let inputs = InputSet::build(&mut model, &ring, &s);

        let adjacent = inputs.get(Pair::new(0, 1)).unwrap();
        let far = inputs.get(Pair::new(0, 3)).unwrap();
        assert!(matches!(adjacent, InputVariable::Quantized(s) if s.len() == 2));
        assert!(matches!(far, InputVariable::Quantized(s) if s.len() == 1 && s[0].level == 1.0));
    }

    #[test]
    fn test_pinned_pairs_become_constants() {
        let ring = Topology::ring(3, 10.0).unwrap();
        let mut model = Model::new();
        let pinned = DemandMatrix::new().with(Pair::new(0, 1), 4.0);
        let inputs = InputSet::build(&mut model, &ring, &spec(InputMode::Continuous, &[], &pinned));

        assert_eq!(inputs.get(Pair::new(0, 1)), Some(&InputVariable::Fixed(4.0)));
        assert_eq!(inputs.locality().get(Pair::new(0, 1)), Admissibility::Pinned(4.0));
        assert_eq!(inputs.parameters().len(), 5);
    }

    #[test]
    fn test_positive_pins_count_towards_the_indicator_sum() {
        let ring = Topology::ring(3, 10.0).unwrap();
        let mut model = Model::new();
        let pinned = DemandMatrix::new()
            .with(Pair::new(0, 1), 5.0)
            .with(Pair::new(1, 0), 0.0);
        let inputs = InputSet::build(&mut model, &ring, &spec(InputMode::Quantized, &[5.0], &pinned));

        let count = inputs.indicator_sum();
        assert_eq!(count.constant_term(), 1.0);
        assert_eq!(count.len(), 4);
    }

    #[test]
    fn test_unreachable_pairs_are_excluded() {
        let mut line = Topology::new("line", 3);
        line.add_edge(0, 1, 1.0).unwrap();
        line.add_edge(1, 2, 1.0).unwrap();
        let mut model = Model::new();
        let pinned = DemandMatrix::new();
        let inputs = InputSet::build(&mut model, &line, &spec(InputMode::Continuous, &[], &pinned));

        assert_eq!(inputs.iter().count(), 3);
        assert_eq!(
            inputs.locality().get(Pair::new(2, 0)),
            Admissibility::Excluded(Exclusion::Unreachable)
        );
    }

    #[test]
    fn test_max_distance_excludes_far_pairs() {
        let ring = Topology::ring(6, 10.0).unwrap();
        let mut model = Model::new();
        let pinned = DemandMatrix::new();
        let mut s = spec(InputMode::Quantized, &[1.0], &pinned);
        s.max_distance = Some(2);
        let inputs = InputSet::build(&mut model, &ring, &s);

        assert!(inputs.get(Pair::new(0, 2)).is_some());
        assert_eq!(
            inputs.locality().get(Pair::new(0, 3)),
            Admissibility::Excluded(Exclusion::OutOfRange)
        );
        assert_eq!(inputs.locality().excluded_count(), 6);
    }

    #[test]
    fn test_split_at_threshold() {
        let input = InputVariable::Quantized(vec![
            Selector { level: 2.0, var: Var(0) },
            Selector { level: 6.0, var: Var(1) },
        ]);
        let (small, large) = input.split_at(5.0).unwrap();
        assert_eq!(small.coefficient(Var(0)), 2.0);
        assert_eq!(large.coefficient(Var(1)), 6.0);
        assert!(InputVariable::Continuous(Var(0)).split_at(5.0).is_none());
    }

    #[test]
    fn test_seed_assignment_requires_representable_values() {
        let ring = Topology::ring(3, 10.0).unwrap();
        let mut model = Model::new();
        let pinned = DemandMatrix::new();
        let inputs = InputSet::build(&mut model, &ring, &spec(InputMode::Quantized, &[2.0, 5.0], &pinned));

        let good = DemandMatrix::new().with(Pair::new(0, 1), 5.0);
        let bad = DemandMatrix::new().with(Pair::new(0, 1), 3.0);

        let assignment = inputs.seed_assignment(&good).unwrap();
        assert_eq!(assignment.iter().filter(|(_, v)| *v == 1.0).count(), 1);
        assert!(inputs.seed_assignment(&bad).is_none());
    }
}
