mod support;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;

use support::{ring_config, write_file};

fn metaopt() -> Command {
    Command::cargo_bin("metaopt").unwrap()
}

fn stdout_json(output: &std::process::Output) -> Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let line = stdout.lines().last().expect("a JSON document on stdout");
    serde_json::from_str(line).unwrap()
}

#[test]
fn partition_reports_the_clusters_as_json() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_file(dir.path(), "ring.toml", &ring_config(9));

    let output = metaopt()
        .args(["partition", "--clusters", "3", "--json", "-c"])
        .arg(&config)
        .output()
        .unwrap();

    assert!(output.status.success());
    let document = stdout_json(&output);
    assert_eq!(document["command"], "partition");
    let clusters = document["result"]["clusters"].as_array().unwrap();
    assert_eq!(clusters.len(), 3);
    let nodes: usize = clusters.iter().map(|c| c.as_array().unwrap().len()).sum();
    assert_eq!(nodes, 9);
}

#[test]
fn partition_reports_the_edge_cut_and_path_containment() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_file(dir.path(), "ring.toml", &ring_config(9));

    let output = metaopt()
        .args(["partition", "--clusters", "3", "--num-paths", "1", "--json", "-c"])
        .arg(&config)
        .output()
        .unwrap();

    assert!(output.status.success());
    let document = stdout_json(&output);
    let stats = &document["result"]["stats"];
    // a ring of 9 has 18 directed edges; three contiguous arcs cut 3 links
    assert_eq!(stats["intra_edges"], 12);
    assert_eq!(stats["inter_edges"], 6);
    assert_eq!(stats["num_paths"], 1);
    let fraction = document["result"]["contained_fraction"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&fraction));
}

#[test]
fn evaluate_reads_a_demand_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_file(dir.path(), "ring.toml", &ring_config(4));
    let demands = write_file(dir.path(), "demands.json", r#"{"(0, 1)": 10.0, "(0, 2)": 5.0}"#);

    let output = metaopt()
        .args(["--json", "evaluate", "-c"])
        .arg(&config)
        .arg(&demands)
        .output()
        .unwrap();

    assert!(output.status.success());
    let document = stdout_json(&output);
    assert_eq!(document["command"], "evaluate");
    let gap = document["result"]["gap"].as_f64().unwrap();
    assert!(gap >= -1e-6);
    assert_eq!(document["result"]["demands"]["(0, 2)"], 5.0);
    // two of the twelve ordered pairs of a 4-ring carry demand
    assert_eq!(document["result"]["non_zero"], 2);
    let density = document["result"]["density"].as_f64().unwrap();
    assert!((density - 2.0 / 12.0).abs() < 1e-9);
}

#[test]
fn gap_writes_the_result_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_file(dir.path(), "ring.toml", &ring_config(4));
    let out = dir.path().join("out.json");

    metaopt()
        .args(["gap", "-q", "-c"])
        .arg(&config)
        .arg("-o")
        .arg(&out)
        .assert()
        .success();

    let document: Value = serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(document["command"], "gap");
    assert!(document["generated_at"].is_string());
    assert!(document["result"]["gap"].as_f64().unwrap() >= -1e-6);
}

#[test]
fn invalid_config_fails_with_the_offending_field() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_file(
        dir.path(),
        "bad.toml",
        &ring_config(4).replace("nodes = 4", "nodes = 1"),
    );

    metaopt()
        .args(["partition", "-c"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("nodes"));
}

#[test]
fn missing_config_fails_to_load() {
    let dir = tempfile::tempdir().unwrap();

    metaopt()
        .args(["evaluate", "-c"])
        .arg(dir.path().join("absent.toml"))
        .arg(dir.path().join("demands.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load"));
}

#[test]
fn num_solutions_needs_a_reference_value() {
    metaopt()
        .args(["gap", "--num-solutions", "3"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("reference-value"));
}
