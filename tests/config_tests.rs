mod support;

use metaopt::adapter::encoder::EncoderKind;
use metaopt::application::decomposition::InterClusterPolicy;
use metaopt::application::metaheuristic::MetaStrategy;
use metaopt::application::rewrite::RewriteKind;
use metaopt::error::{ConfigError, Error};
use metaopt::infrastructure::bootstrap::Engine;
use metaopt::infrastructure::config::{Config, TopologySource};

use support::{ring_config, write_file};

const LINE_JSON: &str = r#"{
    "directed": false,
    "graph": {"capacity": 10.0},
    "nodes": [{"id": 0}, {"id": 1}, {"id": 2}],
    "links": [{"source": 0, "target": 1}, {"source": 1, "target": 2, "capacity": 4.0}]
}"#;

#[test]
fn full_config_round_trips_every_section() {
    let toml = r#"
[logging]
level = "debug"
format = "json"

[topology]
kind = "ring"
nodes = 6

[solver]
time_limit_secs = 30.0

[reference]
kind = "optimal"
num_paths = 3

[heuristic]
kind = "demand_pinning"
threshold = 2.5

[search]
rewrite = "primal_dual"
levels = [1.0, 2.0, 4.0]
demand_ub = 4.0
density = 0.25
locality = 2

[decomposition]
num_clusters = 2
seed = 4

[decomposition.policy]
kind = "abstracted"
target_levels = 4

[metaheuristic]
strategy = "simulated_annealing"
timeout_secs = 10.0
"#;

    let config = Config::parse_toml(toml).unwrap();

    assert_eq!(config.logging.format, "json");
    assert_eq!(
        config.topology,
        TopologySource::Ring {
            nodes: 6,
            capacity: 1000.0
        }
    );
    assert_eq!(config.solver.time_limit().map(|d| d.as_secs()), Some(30));
    assert_eq!(config.reference.num_paths, 3);
    assert_eq!(config.heuristic.num_paths, 2);
    assert_eq!(config.heuristic.kind, EncoderKind::DemandPinning { threshold: 2.5 });
    assert_eq!(config.search.rewrite, RewriteKind::PrimalDual);
    assert_eq!(config.search.locality, Some(2));
    assert_eq!(
        config.decomposition.policy,
        InterClusterPolicy::Abstracted { target_levels: 4 }
    );
    assert_eq!(config.metaheuristic.strategy, MetaStrategy::SimulatedAnnealing);
}

#[test]
fn topology_and_paths_resolve_against_the_config_directory() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "line.json", LINE_JSON);
    write_file(
        dir.path(),
        "paths.json",
        r#"{"(0, 1)": [[0, 1]], "(1, 0)": [[1, 0]], "(1, 2)": [[1, 2]],
            "(2, 1)": [[2, 1]], "(0, 2)": [[0, 1, 2]], "(2, 0)": [[2, 1, 0]]}"#,
    );
    let path = write_file(
        dir.path(),
        "run.toml",
        r#"
paths = "paths.json"

[topology]
kind = "file"
path = "line.json"

[reference]
kind = "optimal"
path_mode = "predetermined"

[heuristic]
kind = "demand_pinning"
threshold = 1.0
path_mode = "predetermined"

[search]
demand_ub = 4.0
"#,
    );

    let config = Config::load(&path).unwrap();
    assert_eq!(config.base_dir.as_deref(), Some(dir.path()));

    let engine = Engine::from_config(&config).unwrap();
    assert_eq!(engine.topology.name(), "line");
    assert_eq!(engine.topology.num_nodes(), 3);
    assert_eq!(engine.topology.capacity(1, 2), Some(4.0));
    assert_eq!(engine.topology.capacity(0, 1), Some(10.0));
}

#[test]
fn missing_file_reports_its_path() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.toml");

    match Config::load(&missing) {
        Err(Error::Config(ConfigError::ReadFile(message))) => {
            assert!(message.contains("absent.toml"));
        }
        other => panic!("expected a read error, got {other:?}"),
    }
}

#[test]
fn paths_without_predetermined_mode_are_rejected() {
    let toml = format!("paths = \"paths.json\"\n{}", ring_config(4));
    assert!(matches!(
        Config::parse_toml(&toml),
        Err(Error::Config(ConfigError::PathModeMismatch))
    ));
}

#[test]
fn search_preconditions_surface_when_the_engine_is_built() {
    let conflicting = ring_config(4).replace(
        "demand_ub = 10.0",
        "demand_ub = 10.0\ndemand_ubs = { \"(0, 1)\" = 5.0 }",
    );
    let config = Config::parse_toml(&conflicting).unwrap();
    assert!(matches!(
        Engine::from_config(&config),
        Err(Error::Config(ConfigError::ConflictingBounds))
    ));

    let no_levels = ring_config(4).replace("demand_ub = 10.0", "demand_ub = 10.0\nrewrite = \"primal_dual\"");
    let config = Config::parse_toml(&no_levels).unwrap();
    assert!(matches!(
        Engine::from_config(&config),
        Err(Error::Config(ConfigError::MissingLevels))
    ));

    let small_m = ring_config(4).replace("demand_ub = 10.0", "demand_ub = 10.0\nbig_m = 5.0");
    let config = Config::parse_toml(&small_m).unwrap();
    assert!(matches!(
        Engine::from_config(&config),
        Err(Error::Config(ConfigError::BigMTooSmall { .. }))
    ));

    let density_without_levels = ring_config(4).replace("demand_ub = 10.0", "demand_ub = 10.0\ndensity = 0.5");
    let config = Config::parse_toml(&density_without_levels).unwrap();
    assert!(matches!(
        Engine::from_config(&config),
        Err(Error::Config(ConfigError::RestrictionRequiresLevels { .. }))
    ));
}

#[test]
fn invalid_strategy_settings_fail_at_load() {
    let toml = format!("{}\n[metaheuristic]\ncooling = 0.0\n", ring_config(4));
    assert!(matches!(
        Config::parse_toml(&toml),
        Err(Error::Config(ConfigError::InvalidValue { field: "cooling", .. }))
    ));

    let toml = format!(
        "{}\n[decomposition]\nnum_clusters = 2\nclusters = [[0, 1], [2, 3]]\n",
        ring_config(4)
    );
    assert!(matches!(
        Config::parse_toml(&toml),
        Err(Error::Config(ConfigError::InvalidValue { field: "num_clusters", .. }))
    ));
}
