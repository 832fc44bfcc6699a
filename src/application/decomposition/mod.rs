//! Cluster decomposition of the gap search.
//!
//! Large topologies are split into clusters. The gap is first maximized per
//! cluster with only intra-cluster pairs free, then the inter-cluster pairs are
//! filled in by one of the [`InterClusterPolicy`] variants. All flat solves of
//! a run share one [`SearchSession`](crate::application::gap::SearchSession);
//! pairs are freed and fixed by moving their named bound constraints.
//!
//! Flat gaps are lower bounds (the reference is relaxed), so every cumulative
//! matrix is re-evaluated with [`GapSearch::get_gap`] and the best validated
//! one is returned.

#![allow(clippy::result_large_err)]

mod abstraction;
mod levels;
mod partition;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::application::gap::{GapResult, GapSearch, SearchSession};
use crate::domain::demand::{DemandMatrix, Pair};
use crate::domain::topology::Topology;
use crate::error::{ConfigError, Error, Result};
use crate::port::{Encoder, Optimality, SolveOutcome};

pub use abstraction::{abstract_config, disaggregate};
pub use levels::{geometric_downsample, pairwise_sum_levels};
pub use partition::{Partition, PartitionStats};

/// How inter-cluster pairs are filled in after the per-cluster stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InterClusterPolicy {
    /// One solve with every inter-cluster pair free.
    #[default]
    JointResolve,
    /// Repeated solves over a random sample of nodes per cluster.
    SampledBatches {
        rounds: usize,
        nodes_per_cluster: usize,
    },
    /// Solve the cluster graph, then spread the result over concrete pairs.
    Abstracted { target_levels: usize },
}

impl InterClusterPolicy {
    fn validate(&self) -> std::result::Result<(), ConfigError> {
        match *self {
            Self::JointResolve => Ok(()),
            Self::SampledBatches { rounds, nodes_per_cluster } => {
                if rounds == 0 {
                    return Err(ConfigError::InvalidValue {
                        field: "rounds",
                        reason: "must be at least 1".into(),
                    });
                }
                if nodes_per_cluster == 0 {
                    return Err(ConfigError::InvalidValue {
                        field: "nodes_per_cluster",
                        reason: "must be at least 1".into(),
                    });
                }
                Ok(())
            }
            Self::Abstracted { target_levels } if target_levels == 0 => Err(ConfigError::InvalidValue {
                field: "target_levels",
                reason: "must be at least 1".into(),
            }),
            Self::Abstracted { .. } => Ok(()),
        }
    }
}

/// Decomposition settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecompositionConfig {
    /// Explicit clusters; generated when absent.
    #[serde(default)]
    pub clusters: Option<Partition>,

    /// Number of generated clusters; defaults to the square root of the node count.
    #[serde(default)]
    pub num_clusters: Option<usize>,

    /// Allowed cluster size excess of the generated partition.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    /// Seed of the partitioner and of all sampling.
    #[serde(default)]
    pub seed: u64,

    #[serde(default)]
    pub policy: InterClusterPolicy,
}

fn default_tolerance() -> f64 {
    0.2
}

impl Default for DecompositionConfig {
    fn default() -> Self {
        Self {
            clusters: None,
            num_clusters: None,
            tolerance: default_tolerance(),
            seed: 0,
            policy: InterClusterPolicy::default(),
        }
    }
}

impl DecompositionConfig {
    /// Check the settings.
    ///
    /// # Errors
    ///
    /// Returns the first invalid value.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.clusters.is_some() && self.num_clusters.is_some() {
            return Err(ConfigError::InvalidValue {
                field: "num_clusters",
                reason: "cannot be combined with explicit clusters".into(),
            });
        }
        if !(self.tolerance >= 0.0 && self.tolerance.is_finite()) {
            return Err(ConfigError::InvalidValue {
                field: "tolerance",
                reason: format!("{} must be non-negative", self.tolerance),
            });
        }
        self.policy.validate()
    }

    /// The configured partition, or a generated one.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPartition`] for clusters that do not
    /// cover `topology` exactly.
    pub fn partition(&self, topology: &Topology) -> Result<Partition> {
        if let Some(clusters) = &self.clusters {
            clusters.validate(topology)?;
            return Ok(clusters.clone());
        }
        let n = topology.num_nodes();
        let k = self
            .num_clusters
            .unwrap_or_else(|| ((n as f64).sqrt().round() as usize).max(1));
        Partition::leader_election_uniform(topology, k, self.seed, self.tolerance)
    }
}

/// Flat and validated gap of one stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    /// Stage label.
    pub stage: String,
    /// Gap reported by the flat solve; a lower bound.
    pub flat_gap: Option<f64>,
    /// Gap of the cumulative matrix after this stage, if it could be evaluated.
    pub validated_gap: Option<f64>,
}

/// Outcome of a decomposed search.
#[derive(Debug, Clone, Serialize)]
pub struct DecompositionResult {
    /// Best validated matrix, completed with zeros.
    pub demands: DemandMatrix,
    /// Its gap.
    pub gap: f64,
    /// Its evaluation.
    pub result: GapResult,
    /// One report per stage.
    pub stages: Vec<StageReport>,
}

/// Runs the decomposed search over one partition.
pub struct Decomposer<'a> {
    search: &'a GapSearch,
    reference: &'a dyn Encoder,
    heuristic: &'a dyn Encoder,
    partition: Partition,
    seed: u64,
}

impl std::fmt::Debug for Decomposer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decomposer")
            .field("reference", &self.reference.name())
            .field("heuristic", &self.heuristic.name())
            .field("partition", &self.partition)
            .field("seed", &self.seed)
            .finish()
    }
}

/// Cumulative matrix recorded after a stage.
struct Stage {
    label: String,
    flat_gap: Option<f64>,
    demands: DemandMatrix,
}

impl<'a> Decomposer<'a> {
    /// Create a decomposer after validating `partition`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPartition`].
    pub fn new(
        search: &'a GapSearch,
        reference: &'a dyn Encoder,
        heuristic: &'a dyn Encoder,
        partition: Partition,
        seed: u64,
    ) -> Result<Self> {
        partition.validate(search.topology())?;
        Ok(Self {
            search,
            reference,
            heuristic,
            partition,
            seed,
        })
    }

    /// The partition.
    #[must_use]
    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    /// Run the per-cluster stage and then `policy`.
    ///
    /// # Errors
    ///
    /// Returns configuration errors, backend errors, and the last evaluation
    /// error when no cumulative matrix can be evaluated.
    pub fn run(&self, policy: &InterClusterPolicy) -> Result<DecompositionResult> {
        policy.validate()?;
        let started = Instant::now();
        let topology = self.search.topology();
        let assignment = self.partition.assignment(topology.num_nodes());
        let mut rng = StdRng::seed_from_u64(self.seed);

        let mut session = self.search.open_session(
            self.reference,
            self.heuristic,
            &DemandMatrix::new(),
            Optimality::Relaxed,
        )?;
        let mut merged = DemandMatrix::new();
        let mut stages = Vec::new();

        for (c, nodes) in self.partition.clusters().iter().enumerate() {
            let members: BTreeSet<_> = nodes.iter().copied().collect();
            let free: Vec<Pair> = session
                .bounded_pairs()
                .filter(|p| members.contains(&p.src) && members.contains(&p.dst))
                .collect();
            let flat_gap = self.solve_and_fix(&mut session, &free, &mut merged)?;
            stages.push(Stage {
                label: format!("cluster {c}"),
                flat_gap,
                demands: merged.clone(),
            });
        }

        match *policy {
            InterClusterPolicy::JointResolve => {
                let free: Vec<Pair> = session
                    .bounded_pairs()
                    .filter(|&p| !self.partition.is_intra(&assignment, p))
                    .collect();
                let flat_gap = self.solve_and_fix(&mut session, &free, &mut merged)?;
                stages.push(Stage {
                    label: "inter-cluster".into(),
                    flat_gap,
                    demands: merged.clone(),
                });
            }
            InterClusterPolicy::SampledBatches {
                rounds,
                nodes_per_cluster,
            } => {
                for round in 0..rounds {
                    let sampled: BTreeSet<_> = self
                        .partition
                        .clusters()
                        .iter()
                        .flat_map(|nodes| {
                            nodes
                                .choose_multiple(&mut rng, nodes_per_cluster)
                                .copied()
                                .collect::<Vec<_>>()
                        })
                        .collect();
                    let free: Vec<Pair> = session
                        .bounded_pairs()
                        .filter(|&p| {
                            sampled.contains(&p.src)
                                && sampled.contains(&p.dst)
                                && !self.partition.is_intra(&assignment, p)
                                && !session.is_fixed(p)
                        })
                        .collect();
                    debug!(round, sampled = sampled.len(), free = free.len(), "Sampled inter-cluster batch");
                    if free.is_empty() {
                        continue;
                    }
                    let flat_gap = self.solve_and_fix(&mut session, &free, &mut merged)?;
                    stages.push(Stage {
                        label: format!("batch {round}"),
                        flat_gap,
                        demands: merged.clone(),
                    });
                }
            }
            InterClusterPolicy::Abstracted { target_levels } => {
                let flat_gap = self.solve_abstract(target_levels, &mut rng, &mut merged)?;
                stages.push(Stage {
                    label: "abstract".into(),
                    flat_gap,
                    demands: merged.clone(),
                });
            }
        }

        let result = self.validate_stages(stages)?;
        info!(
            clusters = self.partition.len(),
            gap = result.gap,
            nonzero = result.demands.count_positive(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Decomposed search finished"
        );
        Ok(result)
    }

    /// Maximize with only `free` unbound, then fix the found values.
    fn solve_and_fix(
        &self,
        session: &mut SearchSession,
        free: &[Pair],
        merged: &mut DemandMatrix,
    ) -> Result<Option<f64>> {
        if free.is_empty() {
            return Ok(None);
        }
        let keep: BTreeSet<Pair> = free.iter().copied().collect();
        session.restrict_to(|p| keep.contains(&p))?;

        let solver = Arc::clone(self.search.solver());
        match session.maximize(solver.as_ref())? {
            SolveOutcome::Optimal(solution) => {
                let result = self.search.extract(session, self.reference, self.heuristic, &solution);
                for &pair in free {
                    let value = result.demands.get(pair);
                    session.fix(pair, value)?;
                    if value > 0.0 {
                        merged.set(pair, value);
                    }
                }
                debug!(free = free.len(), gap = result.gap, "Solved decomposition stage");
                Ok(Some(result.gap))
            }
            other => {
                warn!(?other, free = free.len(), "Decomposition stage has no optimum, leaving its pairs at zero");
                for &pair in free {
                    session.fix(pair, 0.0)?;
                }
                Ok(None)
            }
        }
    }

    /// Solve the cluster graph and spread its demands over the inter-cluster pairs.
    fn solve_abstract(
        &self,
        target_levels: usize,
        rng: &mut StdRng,
        merged: &mut DemandMatrix,
    ) -> Result<Option<f64>> {
        let abstracted = Arc::new(self.partition.abstract_topology(self.search.topology())?);
        let config = abstract_config(self.search.config(), &self.partition, &abstracted, target_levels);
        let search = self.search.with_topology(Arc::clone(&abstracted), config)?;
        let reference = self.reference.for_topology(Arc::clone(&abstracted))?;
        let heuristic = self.heuristic.for_topology(Arc::clone(&abstracted))?;

        let result = search.maximize_gap(reference.as_ref(), heuristic.as_ref(), &Default::default())?;
        let concrete = disaggregate(
            &result.demands,
            &self.partition,
            self.search.topology(),
            self.search.config(),
            rng,
        );
        debug!(
            abstract_gap = result.gap,
            abstract_total = result.demands.total(),
            placed = concrete.total(),
            "Disaggregated abstract demands"
        );
        merged.extend_from(&concrete);
        Ok(Some(result.gap))
    }

    /// Evaluate every cumulative matrix and keep the best.
    fn validate_stages(&self, stages: Vec<Stage>) -> Result<DecompositionResult> {
        let topology = self.search.topology();
        let mut reports = Vec::with_capacity(stages.len());
        let mut best: Option<GapResult> = None;
        let mut last_error: Option<Error> = None;

        for stage in stages {
            let mut demands = stage.demands;
            demands.complete(topology);
            let validated = match self.search.get_gap(self.reference, self.heuristic, &demands) {
                Ok(result) => Some(result),
                Err(e) if e.as_pinning_infeasible().is_some() => {
                    warn!(stage = %stage.label, error = %e, "Skipping stage the heuristic cannot evaluate");
                    last_error = Some(e);
                    None
                }
                Err(e) => return Err(e),
            };
            reports.push(StageReport {
                stage: stage.label,
                flat_gap: stage.flat_gap,
                validated_gap: validated.as_ref().map(|r| r.gap),
            });
            if let Some(result) = validated {
                if best.as_ref().map_or(true, |b| result.gap > b.gap) {
                    best = Some(result);
                }
            }
        }

        let Some(result) = best else {
            return Err(last_error.unwrap_or_else(|| {
                ConfigError::InvalidPartition {
                    reason: "decomposition produced no stages".into(),
                }
                .into()
            }));
        };
        let mut demands = result.demands.clone();
        demands.complete(topology);
        Ok(DecompositionResult {
            demands,
            gap: result.gap,
            result,
            stages: reports,
        })
    }
}
