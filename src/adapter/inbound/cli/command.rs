//! Command-line interface definitions.
//!
//! Every subcommand reads one TOML run configuration and overrides a few of
//! its fields from flags.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::application::metaheuristic::MetaStrategy;

/// Adversarial gap search between an exact and a heuristic algorithm
#[derive(Parser, Debug)]
#[command(name = "metaopt")]
#[command(version)]
pub struct Cli {
    /// Color output mode [auto, always, never]
    #[arg(
        long,
        global = true,
        default_value = "auto",
        hide_possible_values = true
    )]
    pub color: ColorChoice,

    /// JSON output for scripting
    #[arg(long, global = true)]
    pub json: bool,

    /// Decrease output verbosity
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase output verbosity
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Color output mode for terminal rendering.
#[derive(Clone, Debug, Default, clap::ValueEnum)]
pub enum ColorChoice {
    /// Detect automatically
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Find the demand matrix maximizing the gap
    Gap(GapArgs),

    /// Bracket the maximum gap by threshold checks
    Interval(IntervalArgs),

    /// Search cluster by cluster on a partitioned topology
    Decompose(DecomposeArgs),

    /// Local search over fixed demand matrices
    Search(SearchArgs),

    /// Print the cluster partition of the topology
    Partition(PartitionArgs),

    /// Evaluate the gap of a fixed demand matrix
    Evaluate(EvaluateArgs),
}

/// Arguments shared by every subcommand.
#[derive(Args, Debug)]
pub struct CommonArgs {
    /// Path to the run configuration.
    #[arg(short, long, default_value = "metaopt.toml")]
    pub config: PathBuf,

    /// Write the result document to this file.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the `gap` subcommand.
#[derive(Args, Debug)]
pub struct GapArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// JSON demand matrix of pinned pairs.
    #[arg(long)]
    pub pins: Option<PathBuf>,

    /// JSON demand matrix whose gap the search must not fall below.
    #[arg(long)]
    pub warm_start: Option<PathBuf>,

    /// Return the sparsest input within tolerance of the best gap.
    #[arg(long)]
    pub simplify: bool,

    /// Fix the reference objective and minimize the heuristic instead.
    #[arg(long)]
    pub reference_value: Option<f64>,

    /// Distinct solutions to enumerate with --reference-value.
    #[arg(long, default_value_t = 1, requires = "reference_value")]
    pub num_solutions: usize,
}

/// Arguments for the `interval` subcommand.
#[derive(Args, Debug)]
pub struct IntervalArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// First threshold tried.
    #[arg(long, default_value_t = 1.0)]
    pub start: f64,

    /// Relative width at which bisection stops.
    #[arg(long, default_value_t = 0.05)]
    pub rel_tol: f64,

    /// Run a single check at this threshold instead of bracketing.
    #[arg(long, conflicts_with_all = ["start", "rel_tol"])]
    pub min_gap: Option<f64>,

    /// JSON demand matrix of pinned pairs.
    #[arg(long)]
    pub pins: Option<PathBuf>,
}

/// Arguments for the `decompose` subcommand.
#[derive(Args, Debug)]
pub struct DecomposeArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Number of clusters; overrides the configuration.
    #[arg(long)]
    pub clusters: Option<usize>,

    /// Seed of partitioning and sampling; overrides the configuration.
    #[arg(long)]
    pub seed: Option<u64>,
}

/// Local search strategies selectable from the command line.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum StrategyArg {
    Random,
    HillClimbing,
    SimulatedAnnealing,
}

impl From<StrategyArg> for MetaStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Random => Self::Random,
            StrategyArg::HillClimbing => Self::HillClimbing,
            StrategyArg::SimulatedAnnealing => Self::SimulatedAnnealing,
        }
    }
}

/// Arguments for the `search` subcommand.
#[derive(Args, Debug)]
pub struct SearchArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Strategy; overrides the configuration.
    #[arg(long, value_enum)]
    pub strategy: Option<StrategyArg>,

    /// Wall-clock budget in seconds.
    #[arg(long)]
    pub timeout: Option<f64>,

    /// Stop after this many evaluations.
    #[arg(long)]
    pub max_evaluations: Option<usize>,

    #[arg(long)]
    pub seed: Option<u64>,

    /// Append `elapsedMillis, bestGap` lines to this file.
    #[arg(long)]
    pub progress_log: Option<PathBuf>,

    /// Warm start the exact search with the best matrix found.
    #[arg(long)]
    pub refine: bool,
}

/// Arguments for the `partition` subcommand.
#[derive(Args, Debug)]
pub struct PartitionArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Number of clusters; overrides the configuration.
    #[arg(long)]
    pub clusters: Option<usize>,

    #[arg(long)]
    pub seed: Option<u64>,

    /// Shortest paths per intra-cluster pair when measuring containment;
    /// defaults to the reference encoder's path count.
    #[arg(long)]
    pub num_paths: Option<usize>,
}

/// Arguments for the `evaluate` subcommand.
#[derive(Args, Debug)]
pub struct EvaluateArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// JSON demand matrix to evaluate.
    pub demands: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["metaopt", "gap", "-c", "run.toml", "--json", "-vv"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Gap(args) => assert_eq!(args.common.config, PathBuf::from("run.toml")),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_num_solutions_needs_reference_value() {
        assert!(Cli::try_parse_from(["metaopt", "gap", "--num-solutions", "3"]).is_err());
        assert!(Cli::try_parse_from([
            "metaopt",
            "gap",
            "--reference-value",
            "12",
            "--num-solutions",
            "3"
        ])
        .is_ok());
    }

    #[test]
    fn test_strategy_value_names() {
        let cli = Cli::try_parse_from(["metaopt", "search", "--strategy", "simulated-annealing"]).unwrap();
        match cli.command {
            Commands::Search(args) => assert!(matches!(
                args.strategy.map(MetaStrategy::from),
                Some(MetaStrategy::SimulatedAnnealing)
            )),
            other => panic!("unexpected command {other:?}"),
        }
    }
}
