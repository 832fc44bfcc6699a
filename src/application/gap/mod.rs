//! Gap search controller.
//!
//! Builds one flat model per search holding the shared inputs, the reference
//! and heuristic encodings and the global input constraints, and maximizes
//! `reference − heuristic` (or variants of it) with the configured solver.
//!
//! # Overview
//!
//! - [`GapSearch::maximize_gap`]: worst-case input for the heuristic
//! - [`GapSearch::maximize_gap_given_reference_value`]: worst heuristic loss at a fixed optimum
//! - [`GapSearch::find_gap_at_least`]: feasibility of a target gap
//! - [`GapSearch::find_maximum_gap_interval`]: bracket the maximum gap with feasibility checks
//! - [`GapSearch::get_gap`]: gap of a fixed demand matrix

#![allow(clippy::result_large_err)]

mod interval;
mod session;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::application::rewrite::{Rewrite, RewriteKind};
use crate::domain::constraint::Constraint;
use crate::domain::demand::{DemandMatrix, Pair};
use crate::domain::input::{InputMode, InputSet, InputSpec, LevelRestriction};
use crate::domain::model::{ConstraintId, Model};
use crate::domain::polynomial::Polynomial;
use crate::domain::topology::Topology;
use crate::error::{ConfigError, Result, SolverError};
use crate::port::{Encoder, InnerSolution, Optimality, Solution, SolveOutcome, Solver};

pub use interval::{Feasibility, GapInterval};
pub use session::SearchSession;

/// Name of the warm-start cutoff constraint.
const WARM_START_CUTOFF: &str = "warm_start_cutoff";

/// Name of the simplification floor.
const SIMPLIFY_FLOOR: &str = "simplify_floor";

/// Name of the reference value pin.
const REFERENCE_VALUE: &str = "reference_value";

/// Name of the density cap.
const DENSITY: &str = "density";

/// Absolute slack given to cutoffs derived from evaluated gaps.
const CUTOFF_SLACK: f64 = 1e-6;

/// Settings shared by every search of a controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GapSearchConfig {
    /// Rewrite strategy.
    #[serde(default = "default_rewrite")]
    pub rewrite: RewriteKind,

    /// Quantization levels for the primal-dual rewrite.
    #[serde(default)]
    pub levels: Vec<f64>,

    /// Global demand upper bound.
    #[serde(default)]
    pub demand_ub: Option<f64>,

    /// Per-pair demand upper bounds; missing pairs are bounded by zero.
    #[serde(default)]
    pub demand_ubs: Option<DemandMatrix>,

    /// Big-M constant of the linearizations.
    #[serde(default = "default_big_m")]
    pub big_m: f64,

    /// Maximum fraction of pairs with a non-zero demand.
    #[serde(default)]
    pub density: Option<f64>,

    /// Distance-based level restriction.
    #[serde(default)]
    pub restriction: Option<LevelRestriction>,

    /// Pairs further apart than this many hops carry no demand.
    #[serde(default)]
    pub locality: Option<usize>,

    /// Relative gap loss accepted by the simplification pass.
    #[serde(default = "default_simplify_tolerance")]
    pub simplify_tolerance: f64,
}

fn default_rewrite() -> RewriteKind {
    RewriteKind::Kkt
}

fn default_big_m() -> f64 {
    1e4
}

fn default_simplify_tolerance() -> f64 {
    0.01
}

impl Default for GapSearchConfig {
    fn default() -> Self {
        Self {
            rewrite: default_rewrite(),
            levels: Vec::new(),
            demand_ub: None,
            demand_ubs: None,
            big_m: default_big_m(),
            density: None,
            restriction: None,
            locality: None,
            simplify_tolerance: default_simplify_tolerance(),
        }
    }
}

impl GapSearchConfig {
    /// Configuration of a continuous (KKT) search.
    #[must_use]
    pub fn kkt(demand_ub: f64) -> Self {
        Self {
            demand_ub: Some(demand_ub),
            ..Self::default()
        }
    }

    /// Configuration of a quantized (primal-dual) search.
    #[must_use]
    pub fn quantized(demand_ub: f64, levels: Vec<f64>) -> Self {
        Self {
            rewrite: RewriteKind::PrimalDual,
            levels,
            demand_ub: Some(demand_ub),
            ..Self::default()
        }
    }

    /// Largest demand any pair may take.
    #[must_use]
    pub fn max_demand(&self) -> f64 {
        match (&self.demand_ubs, self.demand_ub) {
            (Some(per_pair), _) => per_pair.iter().map(|(_, v)| v).fold(0.0, f64::max),
            (None, Some(ub)) => ub,
            (None, None) => 0.0,
        }
    }

    /// Upper bound of one pair.
    #[must_use]
    pub fn upper_bound(&self, pair: Pair) -> f64 {
        match (&self.demand_ubs, self.demand_ub) {
            (Some(per_pair), _) => per_pair.get(pair),
            (None, Some(ub)) => ub,
            (None, None) => 0.0,
        }
    }

    /// Check the settings against `topology`.
    ///
    /// # Errors
    ///
    /// Returns the first violated precondition.
    pub fn validate(&self, topology: &Topology) -> std::result::Result<(), ConfigError> {
        let levels = self.rewrite.uses_levels();
        if levels && self.levels.is_empty() {
            return Err(ConfigError::MissingLevels);
        }
        if let Some(level) = self.levels.iter().find(|l| !l.is_finite() || **l <= 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "levels",
                reason: format!("level {level} must be positive"),
            });
        }
        match (self.demand_ub, &self.demand_ubs) {
            (Some(_), Some(_)) => return Err(ConfigError::ConflictingBounds),
            (None, None) => return Err(ConfigError::MissingField { field: "demand_ub" }),
            (Some(ub), None) if !ub.is_finite() || ub < 0.0 => {
                return Err(ConfigError::InvalidValue {
                    field: "demand_ub",
                    reason: format!("{ub} must be non-negative"),
                })
            }
            _ => {}
        }
        if !levels {
            if self.density.is_some() {
                return Err(ConfigError::RestrictionRequiresLevels { restriction: "density" });
            }
            if self.restriction.is_some() {
                return Err(ConfigError::RestrictionRequiresLevels {
                    restriction: "distance restriction",
                });
            }
            if self.locality.is_some() {
                return Err(ConfigError::RestrictionRequiresLevels { restriction: "locality" });
            }
        }
        if let Some(d) = self.density {
            if !(0.0..=1.0).contains(&d) {
                return Err(ConfigError::InvalidValue {
                    field: "density",
                    reason: format!("{d} is outside [0, 1]"),
                });
            }
        }
        if !(0.0..1.0).contains(&self.simplify_tolerance) {
            return Err(ConfigError::InvalidValue {
                field: "simplify_tolerance",
                reason: format!("{} is outside [0, 1)", self.simplify_tolerance),
            });
        }
        let required = topology
            .max_capacity()
            .max(self.max_demand())
            .max(self.levels.iter().copied().fold(0.0, f64::max));
        if self.big_m.is_nan() || self.big_m < required {
            return Err(ConfigError::BigMTooSmall {
                big_m: self.big_m,
                required,
            });
        }
        Ok(())
    }

    fn input_mode(&self) -> InputMode {
        match self.rewrite {
            RewriteKind::Kkt => InputMode::Continuous,
            RewriteKind::PrimalDual => InputMode::Quantized,
        }
    }
}

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Pairs pinned to exact values.
    pub pins: DemandMatrix,
    /// Matrix whose gap the search must not fall below.
    pub warm_start: Option<DemandMatrix>,
    /// Run the sparsest-input post-pass.
    pub simplify: bool,
    /// Number of distinct solutions to enumerate (given-reference mode only).
    pub num_solutions: usize,
}

impl SearchOptions {
    /// Options with the given pins.
    #[must_use]
    pub fn pinned(pins: DemandMatrix) -> Self {
        Self {
            pins,
            ..Self::default()
        }
    }
}

/// Outcome of a gap search.
#[derive(Debug, Clone, Serialize)]
pub struct GapResult {
    /// `reference − heuristic` at the returned input.
    pub gap: f64,
    /// Demand matrix realizing the gap.
    pub demands: DemandMatrix,
    /// Reference solution.
    pub reference: InnerSolution,
    /// Heuristic solution.
    pub heuristic: InnerSolution,
}

impl GapResult {
    /// Fraction of the reference objective lost by the heuristic.
    #[must_use]
    pub fn relative_gap(&self) -> f64 {
        if self.reference.objective.abs() < f64::EPSILON {
            0.0
        } else {
            self.gap / self.reference.objective
        }
    }
}

/// Adversarial gap search over one topology.
#[derive(Clone)]
pub struct GapSearch {
    solver: Arc<dyn Solver>,
    topology: Arc<Topology>,
    config: GapSearchConfig,
}

impl std::fmt::Debug for GapSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GapSearch")
            .field("solver", &self.solver.name())
            .field("topology", &self.topology.name())
            .field("config", &self.config)
            .finish()
    }
}

impl GapSearch {
    /// Create a controller after validating `config` against `topology`.
    ///
    /// # Errors
    ///
    /// Returns the first violated precondition.
    pub fn new(solver: Arc<dyn Solver>, topology: Arc<Topology>, config: GapSearchConfig) -> Result<Self> {
        config.validate(&topology)?;
        Ok(Self {
            solver,
            topology,
            config,
        })
    }

    /// Settings of the controller.
    #[must_use]
    pub const fn config(&self) -> &GapSearchConfig {
        &self.config
    }

    /// Topology searched over.
    #[must_use]
    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }

    /// The solver.
    #[must_use]
    pub fn solver(&self) -> &Arc<dyn Solver> {
        &self.solver
    }

    /// The same controller over another topology and settings.
    ///
    /// # Errors
    ///
    /// Returns the first violated precondition.
    pub fn with_topology(&self, topology: Arc<Topology>, config: GapSearchConfig) -> Result<Self> {
        Self::new(Arc::clone(&self.solver), topology, config)
    }

    /// Build a session: inputs, both encodings, bound handles and density.
    ///
    /// The heuristic is always encoded with enforced optimality.
    ///
    /// # Errors
    ///
    /// Returns configuration and rewrite validation errors.
    pub fn open_session(
        &self,
        reference: &dyn Encoder,
        heuristic: &dyn Encoder,
        pins: &DemandMatrix,
        reference_optimality: Optimality,
    ) -> Result<SearchSession> {
        let cfg = &self.config;
        let mut model = Model::new();
        let per_pair: Option<BTreeMap<Pair, f64>> = cfg
            .demand_ubs
            .as_ref()
            .map(|ubs| ubs.iter().collect());
        let spec = InputSpec {
            mode: cfg.input_mode(),
            demand_ub: cfg.demand_ub,
            demand_ubs: per_pair.as_ref(),
            levels: &cfg.levels,
            restriction: cfg.restriction.as_ref(),
            max_distance: cfg.locality,
            pinned: pins,
        };
        let inputs = InputSet::build(&mut model, &self.topology, &spec);
        let parameters = inputs.parameters();

        let mut rewrite = Rewrite::with_parameters(cfg.rewrite, cfg.big_m, &model, &parameters)?;
        let reference_encoding = reference.encode(&mut model, &inputs, &mut rewrite, reference_optimality)?;
        let mut rewrite = Rewrite::with_parameters(cfg.rewrite, cfg.big_m, &model, &parameters)?;
        let heuristic_encoding = heuristic.encode(&mut model, &inputs, &mut rewrite, Optimality::Enforced)?;

        let mut session = SearchSession::open(model, inputs, reference_encoding, heuristic_encoding)?;

        if let Some(density) = cfg.density {
            let cap = (density * self.topology.num_pairs() as f64).floor();
            let indicators = session.inputs.indicator_sum();
            let pinned = indicators.constant_term();
            if pinned > cap {
                return Err(ConfigError::InvalidValue {
                    field: "density",
                    reason: format!("{pinned} non-zero pins exceed the cap of {cap} non-zero demands"),
                }
                .into());
            }
            session.model.add_constraint(
                Constraint::leq_zero(indicators - Polynomial::constant(cap)).named(DENSITY),
            )?;
        }

        debug!(
            topology = self.topology.name(),
            rewrite = %cfg.rewrite,
            reference = reference.name(),
            heuristic = heuristic.name(),
            free_pairs = session.inputs.free_pairs().count(),
            excluded = session.inputs.locality().excluded_count(),
            variables = session.model.num_variables(),
            constraints = session.model.num_constraints(),
            "Opened search session"
        );
        Ok(session)
    }

    /// Decode a solution of `session`.
    #[must_use]
    pub fn extract(
        &self,
        session: &SearchSession,
        reference: &dyn Encoder,
        heuristic: &dyn Encoder,
        solution: &Solution,
    ) -> GapResult {
        let reference_solution = reference.extract(&session.reference, solution);
        let heuristic_solution = heuristic.extract(&session.heuristic, solution);
        GapResult {
            gap: reference_solution.objective - heuristic_solution.objective,
            demands: session.inputs.resolve(solution.values()),
            reference: reference_solution,
            heuristic: heuristic_solution,
        }
    }

    /// Input maximizing `reference − heuristic`.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::Infeasible`] when the pins admit no input, and
    /// configuration, rewrite and backend errors.
    pub fn maximize_gap(
        &self,
        reference: &dyn Encoder,
        heuristic: &dyn Encoder,
        options: &SearchOptions,
    ) -> Result<GapResult> {
        let started = Instant::now();
        let mut session = self.open_session(reference, heuristic, &options.pins, Optimality::Relaxed)?;

        let cutoff = match &options.warm_start {
            Some(seed) => self.add_warm_start(&mut session, reference, heuristic, seed)?,
            None => None,
        };

        let mut outcome = session.maximize(self.solver.as_ref())?;
        if outcome == SolveOutcome::Infeasible {
            if let Some(id) = cutoff {
                warn!("Warm-start cutoff made the model infeasible, solving without it");
                session.remove(id)?;
                outcome = session.maximize(self.solver.as_ref())?;
            }
        }
        let solution = outcome.into_result()?;
        let mut result = self.extract(&session, reference, heuristic, &solution);

        if options.simplify {
            result = self.simplify(&mut session, reference, heuristic, result)?;
        }

        info!(
            gap = result.gap,
            reference = result.reference.objective,
            heuristic = result.heuristic.objective,
            nonzero = result.demands.count_positive(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Maximized gap"
        );
        Ok(result)
    }

    /// Worst heuristic objective when the reference optimum equals `value`.
    ///
    /// With `options.num_solutions > 1`, up to that many distinct inputs are
    /// returned in non-increasing order of heuristic loss.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::SimplifyWithEnumeration`] and
    /// [`ConfigError::EnumerationRequiresLevels`] for unsupported option
    /// combinations, [`SolverError::Infeasible`] when no input reaches `value`.
    pub fn maximize_gap_given_reference_value(
        &self,
        reference: &dyn Encoder,
        heuristic: &dyn Encoder,
        value: f64,
        options: &SearchOptions,
    ) -> Result<Vec<GapResult>> {
        let enumerate = options.num_solutions > 1;
        if enumerate && options.simplify {
            return Err(ConfigError::SimplifyWithEnumeration.into());
        }
        if enumerate && !self.config.rewrite.uses_levels() {
            return Err(ConfigError::EnumerationRequiresLevels.into());
        }

        let mut session = self.open_session(reference, heuristic, &options.pins, Optimality::Enforced)?;
        let reference_var = session.reference.objective_var;
        session.model.add_constraint(
            Constraint::eq_zero(
                Polynomial::term(reference_var, 1.0)
                    - Polynomial::constant(value),
            )
            .named(REFERENCE_VALUE),
        )?;
        session.set_objective(-Polynomial::term(session.heuristic.objective_var, 1.0));

        let results = if enumerate {
            let selectors = session.inputs.selector_vars();
            let objective = session.objective.clone();
            let solutions = self.solver.maximize_distinct(
                &mut session.model,
                &objective,
                options.num_solutions,
                &selectors,
            )?;
            if solutions.is_empty() {
                return Err(SolverError::Infeasible.into());
            }
            solutions
                .iter()
                .map(|s| self.extract(&session, reference, heuristic, s))
                .collect()
        } else {
            let solution = session.maximize(self.solver.as_ref())?.into_result()?;
            let mut result = self.extract(&session, reference, heuristic, &solution);
            if options.simplify {
                result = self.simplify(&mut session, reference, heuristic, result)?;
            }
            vec![result]
        };

        info!(
            reference_value = value,
            solutions = results.len(),
            best_gap = results.first().map(|r| r.gap),
            "Maximized gap at fixed reference value"
        );
        Ok(results)
    }

    /// Gap of a fixed demand matrix; each inner problem is solved on its own.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::PinningInfeasible`](crate::domain::error::DomainError)
    /// when an encoder rejects the demands, and solver errors when an inner
    /// problem has no optimum.
    pub fn get_gap(
        &self,
        reference: &dyn Encoder,
        heuristic: &dyn Encoder,
        demands: &DemandMatrix,
    ) -> Result<GapResult> {
        reference.check_inputs(demands)?;
        heuristic.check_inputs(demands)?;
        let reference_solution = self.solve_fixed(reference, demands)?;
        let heuristic_solution = self.solve_fixed(heuristic, demands)?;
        let mut resolved = demands.clone();
        resolved.clean();
        let result = GapResult {
            gap: reference_solution.objective - heuristic_solution.objective,
            demands: resolved,
            reference: reference_solution,
            heuristic: heuristic_solution,
        };
        debug!(gap = result.gap, "Evaluated fixed demands");
        Ok(result)
    }

    fn solve_fixed(&self, encoder: &dyn Encoder, demands: &DemandMatrix) -> Result<InnerSolution> {
        let mut model = Model::new();
        let inputs = InputSet::fixed(model.id(), &self.topology, demands);
        let mut rewrite = Rewrite::new(self.config.rewrite, self.config.big_m);
        let encoding = encoder.encode(&mut model, &inputs, &mut rewrite, Optimality::Relaxed)?;
        let objective = Polynomial::term(encoding.objective_var, 1.0);
        let solution = self.solver.maximize(&model, &objective)?.into_result()?;
        Ok(encoder.extract(&encoding, &solution))
    }

    /// Sparsest input keeping the objective within tolerance of `best`.
    ///
    /// Falls back to `best` when the re-solve fails.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn simplify(
        &self,
        session: &mut SearchSession,
        reference: &dyn Encoder,
        heuristic: &dyn Encoder,
        best: GapResult,
    ) -> Result<GapResult> {
        let target = session.objective.evaluate_with(|v| {
            if v == session.reference.objective_var {
                best.reference.objective
            } else if v == session.heuristic.objective_var {
                best.heuristic.objective
            } else {
                0.0
            }
        });
        let floor = target - self.config.simplify_tolerance * target.abs() - CUTOFF_SLACK;
        let id = session.add_floor(SIMPLIFY_FLOOR, floor)?;

        let size = match session.inputs.mode() {
            InputMode::Quantized => session.inputs.indicator_sum(),
            _ => session.inputs.total(),
        };
        let outcome = self.solver.minimize(&session.model, &size)?;
        session.remove(id)?;

        match outcome {
            SolveOutcome::Optimal(solution) => {
                let simplified = self.extract(session, reference, heuristic, &solution);
                info!(
                    before = best.demands.count_positive(),
                    after = simplified.demands.count_positive(),
                    gap = simplified.gap,
                    "Simplified demands"
                );
                Ok(simplified)
            }
            other => {
                warn!(?other, "Simplification failed, keeping the original result");
                Ok(best)
            }
        }
    }

    /// Add `gap >= incumbent` for a representable warm-start matrix.
    fn add_warm_start(
        &self,
        session: &mut SearchSession,
        reference: &dyn Encoder,
        heuristic: &dyn Encoder,
        seed: &DemandMatrix,
    ) -> Result<Option<ConstraintId>> {
        if session.inputs.seed_assignment(seed).is_none() {
            warn!("Warm-start demands are not representable by the inputs, ignoring them");
            return Ok(None);
        }
        let incumbent = match self.get_gap(reference, heuristic, seed) {
            Ok(result) => result.gap,
            Err(e) => {
                warn!(error = %e, "Could not evaluate warm-start demands, ignoring them");
                return Ok(None);
            }
        };
        debug!(incumbent, "Adding warm-start cutoff");
        session
            .add_floor(WARM_START_CUTOFF, incumbent - CUTOFF_SLACK)
            .map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring() -> Topology {
        Topology::ring(4, 10.0).unwrap()
    }

    #[test]
    fn test_quantized_without_levels_rejected() {
        let config = GapSearchConfig::quantized(10.0, vec![]);
        assert_eq!(config.validate(&ring()), Err(ConfigError::MissingLevels));
    }

    #[test]
    fn test_conflicting_bounds_rejected() {
        let mut config = GapSearchConfig::kkt(10.0);
        config.demand_ubs = Some(DemandMatrix::new().with(Pair::new(0, 1), 5.0));
        assert_eq!(config.validate(&ring()), Err(ConfigError::ConflictingBounds));
    }

    #[test]
    fn test_kkt_with_density_rejected() {
        let mut config = GapSearchConfig::kkt(10.0);
        config.density = Some(0.5);
        assert_eq!(
            config.validate(&ring()),
            Err(ConfigError::RestrictionRequiresLevels { restriction: "density" })
        );
    }

    #[test]
    fn test_kkt_with_locality_rejected() {
        let mut config = GapSearchConfig::kkt(10.0);
        config.locality = Some(1);
        assert!(matches!(
            config.validate(&ring()),
            Err(ConfigError::RestrictionRequiresLevels { .. })
        ));
    }

    #[test]
    fn test_big_m_below_capacity_rejected() {
        let mut config = GapSearchConfig::kkt(5.0);
        config.big_m = 8.0;
        assert_eq!(
            config.validate(&ring()),
            Err(ConfigError::BigMTooSmall {
                big_m: 8.0,
                required: 10.0
            })
        );
    }

    #[test]
    fn test_big_m_at_boundary_accepted() {
        let mut config = GapSearchConfig::kkt(10.0);
        config.big_m = 10.0;
        assert!(config.validate(&ring()).is_ok());
    }

    #[test]
    fn test_missing_bound_rejected() {
        let config = GapSearchConfig::default();
        assert_eq!(
            config.validate(&ring()),
            Err(ConfigError::MissingField { field: "demand_ub" })
        );
    }

    #[test]
    fn test_per_pair_bounds_drive_max_demand() {
        let mut config = GapSearchConfig::quantized(0.0, vec![1.0]);
        config.demand_ub = None;
        config.demand_ubs = Some(
            DemandMatrix::new()
                .with(Pair::new(0, 1), 3.0)
                .with(Pair::new(1, 2), 7.0),
        );
        assert_eq!(config.max_demand(), 7.0);
        assert!(config.validate(&ring()).is_ok());
    }

    #[test]
    fn test_config_from_toml() {
        let config: GapSearchConfig = toml::from_str(
            r#"
            rewrite = "primal_dual"
            levels = [1.0, 5.0]
            demand_ub = 5.0
            density = 0.5

            [restriction]
            large_demand_lb = 5.0
            max_large_distance = 1
            "#,
        )
        .unwrap();
        assert_eq!(config.rewrite, RewriteKind::PrimalDual);
        assert_eq!(config.restriction.unwrap().max_small_distance, None);
        assert!(config.validate(&ring()).is_ok());
    }
}
