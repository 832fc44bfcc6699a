//! Handlers of the subcommands.

use std::path::Path;

use anyhow::Context;
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tabled::Tabled;

use crate::adapter::inbound::cli::command::{
    Cli, Commands, CommonArgs, DecomposeArgs, EvaluateArgs, GapArgs, IntervalArgs, PartitionArgs,
    SearchArgs,
};
use crate::adapter::inbound::cli::output;
use crate::application::decomposition::{Decomposer, StageReport};
use crate::application::gap::{Feasibility, GapResult, SearchOptions};
use crate::application::metaheuristic::MetaSearch;
use crate::domain::demand::DemandMatrix;
use crate::infrastructure::bootstrap::Engine;
use crate::infrastructure::config::Config;
use crate::port::Encoder;

/// Rows shown in the demand table without `-v`.
const DEMAND_ROWS: usize = 10;

/// Dispatch the parsed command line.
///
/// # Errors
///
/// Returns configuration, I/O and search errors with context.
pub fn execute(cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Gap(args) => gap(args),
        Commands::Interval(args) => interval(args),
        Commands::Decompose(args) => decompose(args),
        Commands::Search(args) => search(args),
        Commands::Partition(args) => partition(args),
        Commands::Evaluate(args) => evaluate(args),
    }
}

fn load_config(common: &CommonArgs) -> anyhow::Result<Config> {
    let mut config = Config::load(&common.config)
        .with_context(|| format!("failed to load {}", common.config.display()))?;
    match output::verbosity() {
        0 => {}
        1 => config.logging.level = "debug".into(),
        _ => config.logging.level = "trace".into(),
    }
    config.init_logging();
    Ok(config)
}

fn build_engine(config: &Config) -> anyhow::Result<Engine> {
    Engine::from_config(config).context("failed to set up the search")
}

fn read_demands(path: &Path) -> anyhow::Result<DemandMatrix> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid demand matrix in {}", path.display()))
}

fn read_optional_demands(path: Option<&Path>) -> anyhow::Result<Option<DemandMatrix>> {
    path.map(read_demands).transpose()
}

/// Print the result document in JSON mode and write it to `-o`.
fn finish<T: Serialize>(common: &CommonArgs, command: &str, result: &T) -> anyhow::Result<()> {
    let document = json!({
        "command": command,
        "version": env!("CARGO_PKG_VERSION"),
        "generated_at": Utc::now().to_rfc3339(),
        "result": serde_json::to_value(result)?,
    });
    output::json_output(&document);
    if let Some(path) = &common.output {
        let pretty = serde_json::to_string_pretty(&document)?;
        std::fs::write(path, pretty).with_context(|| format!("failed to write {}", path.display()))?;
        output::success(&format!("Result written to {}", path.display()));
    }
    Ok(())
}

fn print_setup(engine: &Engine) {
    output::field("Topology", engine.topology.name());
    output::field("Nodes", engine.topology.num_nodes());
    output::field("Reference", engine.reference.name());
    output::field("Heuristic", engine.heuristic.name());
    output::field("Rewrite", &engine.search.config().rewrite);
}

#[derive(Tabled)]
struct DemandRow {
    #[tabled(rename = "Pair")]
    pair: String,
    #[tabled(rename = "Demand")]
    demand: String,
    #[tabled(rename = "Reference Flow")]
    reference: String,
    #[tabled(rename = "Heuristic Flow")]
    heuristic: String,
}

fn print_result(result: &GapResult) {
    output::field("Gap", output::gap(result.gap));
    output::field("Relative gap", format!("{:.2}%", result.relative_gap() * 100.0));
    output::field("Reference", format!("{:.4}", result.reference.objective));
    output::field("Heuristic", format!("{:.4}", result.heuristic.objective));
    output::field("Non-zero pairs", result.demands.count_positive());

    let mut demands: Vec<_> = result.demands.iter().filter(|(_, d)| *d > 0.0).collect();
    if demands.is_empty() {
        return;
    }
    demands.sort_by(|a, b| b.1.total_cmp(&a.1));
    if output::verbosity() == 0 {
        demands.truncate(DEMAND_ROWS);
    }
    output::section("Demands");
    output::table(demands.into_iter().map(|(pair, demand)| DemandRow {
        pair: pair.to_string(),
        demand: format!("{demand:.4}"),
        reference: format!("{:.4}", result.reference.flows.get(pair)),
        heuristic: format!("{:.4}", result.heuristic.flows.get(pair)),
    }));
}

fn gap(args: &GapArgs) -> anyhow::Result<()> {
    let config = load_config(&args.common)?;
    let engine = build_engine(&config)?;
    output::header("gap");
    print_setup(&engine);

    let options = SearchOptions {
        pins: read_optional_demands(args.pins.as_deref())?.unwrap_or_default(),
        warm_start: read_optional_demands(args.warm_start.as_deref())?,
        simplify: args.simplify,
        num_solutions: args.num_solutions,
    };

    let spinner = output::spinner("Solving");
    let outcome = match args.reference_value {
        Some(value) => engine.search.maximize_gap_given_reference_value(
            &engine.reference,
            &engine.heuristic,
            value,
            &options,
        ),
        None => engine
            .search
            .maximize_gap(&engine.reference, &engine.heuristic, &options)
            .map(|result| vec![result]),
    };
    let results = match outcome {
        Ok(results) => {
            output::spinner_success(&spinner, "Solved");
            results
        }
        Err(e) => {
            output::spinner_fail(&spinner, "Solve failed");
            return Err(e.into());
        }
    };

    for (i, result) in results.iter().enumerate() {
        output::section(&format!("Solution {}", i + 1));
        print_result(result);
    }
    finish(&args.common, "gap", &results)
}

fn interval(args: &IntervalArgs) -> anyhow::Result<()> {
    let config = load_config(&args.common)?;
    let engine = build_engine(&config)?;
    output::header("interval");
    print_setup(&engine);

    let options = SearchOptions::pinned(read_optional_demands(args.pins.as_deref())?.unwrap_or_default());
    let (reference, heuristic) = (&engine.reference, &engine.heuristic);

    if let Some(min_gap) = args.min_gap {
        let spinner = output::spinner(&format!("Checking gap >= {min_gap}"));
        let feasibility = engine
            .search
            .find_gap_at_least(reference, heuristic, min_gap, &options)?;
        match &feasibility {
            Feasibility::Feasible(witness) => {
                output::spinner_success(&spinner, "Feasible");
                print_result(witness);
            }
            Feasibility::Infeasible => output::spinner_fail(&spinner, "Infeasible"),
        }
        return finish(&args.common, "interval", &feasibility);
    }

    let spinner = output::spinner("Bracketing the maximum gap");
    let bracket = engine.search.find_maximum_gap_interval(
        reference,
        heuristic,
        args.start,
        args.rel_tol,
        &options,
    )?;
    output::spinner_success(&spinner, &format!("{} checks", bracket.checks));
    output::field("Lower", output::gap(bracket.lower));
    output::field(
        "Upper",
        bracket
            .upper
            .map_or_else(|| "unbounded".to_string(), |u| format!("{u:.4}")),
    );
    if let Some(best) = &bracket.best {
        output::section("Witness");
        print_result(best);
    }
    finish(&args.common, "interval", &bracket)
}

#[derive(Tabled)]
struct StageRow {
    #[tabled(rename = "Stage")]
    stage: String,
    #[tabled(rename = "Flat Gap")]
    flat: String,
    #[tabled(rename = "Validated Gap")]
    validated: String,
}

impl From<&StageReport> for StageRow {
    fn from(report: &StageReport) -> Self {
        let show = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| format!("{v:.4}"));
        Self {
            stage: report.stage.clone(),
            flat: show(report.flat_gap),
            validated: show(report.validated_gap),
        }
    }
}

fn decompose(args: &DecomposeArgs) -> anyhow::Result<()> {
    let mut config = load_config(&args.common)?;
    if let Some(k) = args.clusters {
        config.decomposition.clusters = None;
        config.decomposition.num_clusters = Some(k);
    }
    if let Some(seed) = args.seed {
        config.decomposition.seed = seed;
    }
    let engine = build_engine(&config)?;
    output::header("decompose");
    print_setup(&engine);

    let partition = config.decomposition.partition(&engine.topology)?;
    output::field("Clusters", partition.len());
    let decomposer = Decomposer::new(
        &engine.search,
        &engine.reference,
        &engine.heuristic,
        partition,
        config.decomposition.seed,
    )?;

    let spinner = output::spinner("Solving clusters");
    let result = match decomposer.run(&config.decomposition.policy) {
        Ok(result) => {
            output::spinner_success(&spinner, &format!("{} stages", result.stages.len()));
            result
        }
        Err(e) => {
            output::spinner_fail(&spinner, "Decomposition failed");
            return Err(e.into());
        }
    };

    output::section("Stages");
    output::table(result.stages.iter().map(StageRow::from));
    output::section("Best");
    print_result(&result.result);
    finish(&args.common, "decompose", &result)
}

fn search(args: &SearchArgs) -> anyhow::Result<()> {
    let mut config = load_config(&args.common)?;
    let progress_log = match &args.progress_log {
        Some(path) => Some(path.clone()),
        None => config
            .metaheuristic
            .progress_log
            .as_deref()
            .map(|p| config.resolve(p)),
    };
    let meta = &mut config.metaheuristic;
    meta.progress_log = progress_log;
    if let Some(strategy) = args.strategy {
        meta.strategy = strategy.into();
    }
    if let Some(timeout) = args.timeout {
        meta.timeout_secs = timeout;
    }
    if args.max_evaluations.is_some() {
        meta.max_evaluations = args.max_evaluations;
    }
    if let Some(seed) = args.seed {
        meta.seed = seed;
    }
    let meta = config.metaheuristic.clone();

    let engine = build_engine(&config)?;
    output::header("search");
    print_setup(&engine);
    output::field("Strategy", meta.strategy);

    let local = MetaSearch::new(&engine.search, &engine.reference, &engine.heuristic, meta)?;
    let spinner = output::spinner("Searching");
    let result = local.run()?;
    output::spinner_success(&spinner, &format!("{} evaluations", result.evaluations));
    output::field("Repairs", result.repairs);
    output::field("Elapsed", format!("{} ms", result.elapsed_ms));

    let Some(best) = &result.best else {
        output::warning("No candidate could be evaluated");
        return finish(&args.common, "search", &result);
    };
    output::section("Best");
    print_result(best);

    if !args.refine {
        return finish(&args.common, "search", &result);
    }
    let options = SearchOptions {
        warm_start: result.warm_start(),
        ..SearchOptions::default()
    };
    let spinner = output::spinner("Refining with the exact search");
    let refined = engine
        .search
        .maximize_gap(&engine.reference, &engine.heuristic, &options)?;
    output::spinner_success(&spinner, "Refined");
    output::section("Refined");
    print_result(&refined);
    finish(
        &args.common,
        "search",
        &json!({ "local": result, "refined": refined }),
    )
}

#[derive(Tabled)]
struct ClusterRow {
    #[tabled(rename = "Cluster")]
    index: usize,
    #[tabled(rename = "Size")]
    size: usize,
    #[tabled(rename = "Edges")]
    edges: usize,
    #[tabled(rename = "Nodes")]
    nodes: String,
}

fn partition(args: &PartitionArgs) -> anyhow::Result<()> {
    let mut config = load_config(&args.common)?;
    if let Some(k) = args.clusters {
        config.decomposition.clusters = None;
        config.decomposition.num_clusters = Some(k);
    }
    if let Some(seed) = args.seed {
        config.decomposition.seed = seed;
    }
    let topology = config
        .topology
        .load(config.base_dir.as_deref())
        .context("failed to load the topology")?;
    let partition = config.decomposition.partition(&topology)?;
    let num_paths = args.num_paths.unwrap_or(config.reference.num_paths);
    let stats = partition.stats(&topology, num_paths)?;

    output::header("partition");
    output::field("Topology", topology.name());
    output::field("Clusters", partition.len());
    output::field("Contiguous", partition.is_contiguous(&topology));
    output::field("Intra-cluster edges", stats.intra_edges);
    output::field("Inter-cluster edges", stats.inter_edges);
    output::field(
        &format!("Contained {num_paths}-shortest paths"),
        format!(
            "{} of {} ({:.1}%)",
            stats.contained_paths,
            stats.total_paths,
            stats.contained_fraction() * 100.0
        ),
    );
    output::section("Clusters");
    output::table(partition.clusters().iter().enumerate().map(|(index, nodes)| ClusterRow {
        index,
        size: nodes.len(),
        edges: stats.cluster_edges[index],
        nodes: nodes
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", "),
    }));
    finish(
        &args.common,
        "partition",
        &json!({
            "clusters": partition,
            "stats": stats,
            "contained_fraction": stats.contained_fraction(),
        }),
    )
}

#[derive(Serialize)]
struct Evaluation<'a> {
    #[serde(flatten)]
    result: &'a GapResult,
    non_zero: usize,
    density: f64,
}

fn evaluate(args: &EvaluateArgs) -> anyhow::Result<()> {
    let config = load_config(&args.common)?;
    let engine = build_engine(&config)?;
    let demands = read_demands(&args.demands)?;
    output::header("evaluate");
    print_setup(&engine);

    let result = engine
        .search
        .get_gap(&engine.reference, &engine.heuristic, &demands)?;
    let non_zero = demands.count_positive();
    let density = demands.density(&engine.topology);
    output::section("Evaluation");
    print_result(&result);
    output::field(
        "Density",
        format!("{non_zero} of {} pairs ({:.2}%)", engine.topology.num_pairs(), density * 100.0),
    );
    finish(
        &args.common,
        "evaluate",
        &Evaluation {
            result: &result,
            non_zero,
            density,
        },
    )
}
