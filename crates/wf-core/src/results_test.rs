use super::*;
use crate::resource::Resource;
use crate::unique_id::ResourceName;
use std::path::PathBuf;
use tempfile::tempdir;

fn result(name: &str, status: NodeStatus) -> NodeResult {
    NodeResult::new(
        UniqueId::new(format!("model.proj.{}", name)),
        status,
        None,
        0.1,
    )
}

#[test]
fn test_results_sorted_by_id() {
    let run = RunResult::new(
        vec![
            result("z", NodeStatus::Success),
            result("a", NodeStatus::Success),
            result("m", NodeStatus::Success),
        ],
        1.0,
    );
    let ids: Vec<&str> = run.results.iter().map(|r| r.unique_id.as_str()).collect();
    assert_eq!(ids, vec!["model.proj.a", "model.proj.m", "model.proj.z"]);
}

#[test]
fn test_exit_code_zero_for_pass_warn_success() {
    let run = RunResult::new(
        vec![
            result("a", NodeStatus::Success),
            result("b", NodeStatus::Pass),
            result("c", NodeStatus::Warn),
        ],
        1.0,
    );
    assert!(run.success());
    assert_eq!(run.exit_code(), 0);
}

#[test]
fn test_exit_code_nonzero_for_error_and_fail() {
    for bad in [NodeStatus::Error, NodeStatus::Fail] {
        let run = RunResult::new(
            vec![result("a", NodeStatus::Success), result("b", bad)],
            1.0,
        );
        assert!(!run.success());
        assert_eq!(run.exit_code(), 1);
    }
}

#[test]
fn test_skips_do_not_fail_the_run_by_themselves() {
    // A skip only ever accompanies an error/fail in a real run, but the
    // aggregator itself treats it as non-failing.
    let run = RunResult::new(vec![result("a", NodeStatus::Skipped)], 1.0);
    assert!(run.success());
}

#[test]
fn test_status_counts() {
    let run = RunResult::new(
        vec![
            result("a", NodeStatus::Success),
            result("b", NodeStatus::Success),
            result("c", NodeStatus::Error),
            result("d", NodeStatus::Skipped),
        ],
        1.0,
    );
    let counts = run.status_counts();
    assert_eq!(counts.get(&NodeStatus::Success), Some(&2));
    assert_eq!(counts.get(&NodeStatus::Error), Some(&1));
    assert_eq!(counts.get(&NodeStatus::Skipped), Some(&1));
    assert_eq!(counts.get(&NodeStatus::Fail), None);
}

#[test]
fn test_kind_counts_resolve_against_manifest() {
    let mut manifest = Manifest::new("proj");
    manifest
        .insert(Resource::new(
            UniqueId::new("model.proj.a"),
            ResourceName::new("a"),
            ResourceKind::Model,
            PathBuf::from("models/a.sql"),
            "select 1".to_string(),
        ))
        .unwrap();
    let run = RunResult::new(vec![result("a", NodeStatus::Success)], 1.0);
    let counts = run.kind_counts(&manifest);
    assert_eq!(counts.get(&ResourceKind::Model), Some(&1));
}

#[test]
fn test_save_artifact() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("target").join("run_results.json");
    let run = RunResult::new(vec![result("a", NodeStatus::Success)], 1.0);
    run.save(&path).unwrap();
    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("model.proj.a"));
    assert!(content.contains("\"success\""));
}
