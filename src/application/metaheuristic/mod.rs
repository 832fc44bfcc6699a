//! Local search over fixed demand matrices.
//!
//! Used when the flat model is too large, or to find a warm start for it.
//! Every candidate is evaluated exactly with [`GapSearch::get_gap`];
//! pinning overloads are repaired by scaling the offending demands.

#![allow(clippy::result_large_err)]

mod annealing;
mod hill_climb;
mod progress;
mod random;
mod repair;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::application::gap::{GapResult, GapSearch};
use crate::domain::demand::DemandMatrix;
use crate::error::{ConfigError, Result};
use crate::port::Encoder;

pub use progress::ProgressLog;

use progress::Incumbent;
use random::Sampler;
use repair::Evaluator;

/// Local search strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetaStrategy {
    /// Independent random trials.
    Random,
    /// First-improvement hill climbing with restarts.
    #[default]
    HillClimbing,
    /// Simulated annealing with restarts.
    SimulatedAnnealing,
}

impl std::fmt::Display for MetaStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Random => "random",
            Self::HillClimbing => "hill_climbing",
            Self::SimulatedAnnealing => "simulated_annealing",
        };
        f.write_str(name)
    }
}

/// Local search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    #[serde(default)]
    pub strategy: MetaStrategy,

    /// Wall-clock budget in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,

    /// Stop after this many evaluations.
    #[serde(default)]
    pub max_evaluations: Option<usize>,

    /// Neighbors sampled per step.
    #[serde(default = "default_num_neighbors")]
    pub num_neighbors: usize,

    /// Standard deviation of neighbor perturbations, relative to each pair's bound.
    #[serde(default = "default_std_dev")]
    pub std_dev: f64,

    #[serde(default = "default_initial_temperature")]
    pub initial_temperature: f64,

    /// Geometric temperature decay per step.
    #[serde(default = "default_cooling")]
    pub cooling: f64,

    /// Annealing steps without a new best before restarting.
    #[serde(default = "default_restart_after")]
    pub restart_after: usize,

    /// Pinning repairs tried before a candidate is dropped.
    #[serde(default = "default_repair_attempts")]
    pub repair_attempts: usize,

    #[serde(default)]
    pub seed: u64,

    /// Probability of a pair being non-zero in random samples.
    #[serde(default)]
    pub density: Option<f64>,

    /// File receiving `elapsedMillis, bestGap` lines.
    #[serde(default)]
    pub progress_log: Option<PathBuf>,
}

fn default_timeout_secs() -> f64 {
    60.0
}

fn default_num_neighbors() -> usize {
    10
}

fn default_std_dev() -> f64 {
    0.1
}

fn default_initial_temperature() -> f64 {
    1.0
}

fn default_cooling() -> f64 {
    0.95
}

fn default_restart_after() -> usize {
    20
}

fn default_repair_attempts() -> usize {
    10
}

impl Default for MetaConfig {
    fn default() -> Self {
        Self {
            strategy: MetaStrategy::default(),
            timeout_secs: default_timeout_secs(),
            max_evaluations: None,
            num_neighbors: default_num_neighbors(),
            std_dev: default_std_dev(),
            initial_temperature: default_initial_temperature(),
            cooling: default_cooling(),
            restart_after: default_restart_after(),
            repair_attempts: default_repair_attempts(),
            seed: 0,
            density: None,
            progress_log: None,
        }
    }
}

impl MetaConfig {
    /// Wall-clock budget.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_secs.max(0.0))
    }

    /// Check the settings.
    ///
    /// # Errors
    ///
    /// Returns the first invalid value.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let invalid = |field: &'static str, reason: String| Err(ConfigError::InvalidValue { field, reason });
        if !(self.timeout_secs > 0.0 && self.timeout_secs.is_finite()) {
            return invalid("timeout_secs", format!("{} must be positive", self.timeout_secs));
        }
        if self.num_neighbors == 0 {
            return invalid("num_neighbors", "must be at least 1".into());
        }
        if !(self.std_dev > 0.0 && self.std_dev.is_finite()) {
            return invalid("std_dev", format!("{} must be positive", self.std_dev));
        }
        if !(self.initial_temperature >= 0.0 && self.initial_temperature.is_finite()) {
            return invalid(
                "initial_temperature",
                format!("{} must be non-negative", self.initial_temperature),
            );
        }
        if !(self.cooling > 0.0 && self.cooling <= 1.0) {
            return invalid("cooling", format!("{} is outside (0, 1]", self.cooling));
        }
        if self.restart_after == 0 {
            return invalid("restart_after", "must be at least 1".into());
        }
        if let Some(d) = self.density {
            if !(0.0..=1.0).contains(&d) {
                return invalid("density", format!("{d} is outside [0, 1]"));
            }
        }
        Ok(())
    }
}

/// Outcome of a local search.
#[derive(Debug, Clone, Serialize)]
pub struct MetaResult {
    pub strategy: MetaStrategy,
    /// Best evaluated matrix; `None` if no candidate could be evaluated.
    pub best: Option<GapResult>,
    /// Calls to the exact evaluation, repairs included.
    pub evaluations: usize,
    /// Pinning repairs applied.
    pub repairs: usize,
    pub elapsed_ms: u64,
}

impl MetaResult {
    /// Best demands, usable as a warm start of the flat search.
    #[must_use]
    pub fn warm_start(&self) -> Option<DemandMatrix> {
        self.best.as_ref().map(|b| b.demands.clone())
    }
}

/// State shared by the strategies during one run.
pub(crate) struct Run<'a> {
    config: &'a MetaConfig,
    evaluator: Evaluator<'a>,
    sampler: Sampler,
    incumbent: Incumbent,
    rng: StdRng,
    deadline: Instant,
}

impl Run<'_> {
    /// Out of time or evaluations.
    fn exhausted(&self) -> bool {
        Instant::now() >= self.deadline
            || self
                .config
                .max_evaluations
                .is_some_and(|max| self.evaluator.evaluations >= max)
    }

    /// Evaluate and record a candidate.
    fn evaluate(&mut self, demands: DemandMatrix) -> Result<Option<GapResult>> {
        let result = self.evaluator.evaluate(demands)?;
        if let Some(result) = &result {
            self.incumbent.offer(result)?;
        }
        Ok(result)
    }

    /// Evaluated random point; resamples candidates that cannot be repaired.
    fn random_point(&mut self) -> Result<Option<GapResult>> {
        while !self.exhausted() {
            let demands = self.sampler.sample(&mut self.rng);
            if let Some(result) = self.evaluate(demands)? {
                return Ok(Some(result));
            }
        }
        Ok(None)
    }

    fn neighbor(&mut self, current: &DemandMatrix) -> DemandMatrix {
        self.sampler.neighbor(current, &mut self.rng)
    }
}

/// Runs one local search strategy.
pub struct MetaSearch<'a> {
    search: &'a GapSearch,
    reference: &'a dyn Encoder,
    heuristic: &'a dyn Encoder,
    config: MetaConfig,
}

impl std::fmt::Debug for MetaSearch<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetaSearch")
            .field("reference", &self.reference.name())
            .field("heuristic", &self.heuristic.name())
            .field("config", &self.config)
            .finish()
    }
}

impl<'a> MetaSearch<'a> {
    /// Create a local search after validating `config`.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting.
    pub fn new(
        search: &'a GapSearch,
        reference: &'a dyn Encoder,
        heuristic: &'a dyn Encoder,
        config: MetaConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            search,
            reference,
            heuristic,
            config,
        })
    }

    /// Run the configured strategy until the budget runs out.
    ///
    /// # Errors
    ///
    /// Returns evaluation errors other than pinning overloads, and I/O errors
    /// of the progress log.
    pub fn run(&self) -> Result<MetaResult> {
        let config = &self.config;
        let log = config
            .progress_log
            .as_deref()
            .map(ProgressLog::create)
            .transpose()?;
        let started = Instant::now();
        let mut run = Run {
            config,
            evaluator: Evaluator::new(self.search, self.reference, self.heuristic, config.repair_attempts),
            sampler: Sampler::new(self.search, config.std_dev, config.density)?,
            incumbent: Incumbent::new(log),
            rng: StdRng::seed_from_u64(config.seed),
            deadline: started + config.timeout(),
        };

        match config.strategy {
            MetaStrategy::Random => random::random_search(&mut run)?,
            MetaStrategy::HillClimbing => hill_climb::hill_climb(&mut run)?,
            MetaStrategy::SimulatedAnnealing => annealing::anneal(&mut run)?,
        }

        let result = MetaResult {
            strategy: config.strategy,
            evaluations: run.evaluator.evaluations,
            repairs: run.evaluator.repairs,
            elapsed_ms: started.elapsed().as_millis() as u64,
            best: run.incumbent.into_best(),
        };
        info!(
            strategy = %result.strategy,
            best_gap = result.best.as_ref().map(|b| b.gap),
            evaluations = result.evaluations,
            repairs = result.repairs,
            elapsed_ms = result.elapsed_ms,
            "Local search finished"
        );
        Ok(result)
    }
}
