use super::*;
use crate::resource::{Resource, TestDetails};
use crate::testing::{TestKind, TestSeverity};
use crate::unique_id::ResourceName;
use std::path::PathBuf;

fn model(manifest: &mut Manifest, name: &str, refs: &[&str]) {
    let mut r = Resource::new(
        UniqueId::from_parts(ResourceKind::Model, "proj", name),
        ResourceName::new(name),
        ResourceKind::Model,
        PathBuf::from(format!("models/{}.sql", name)),
        format!("select * from {}", name),
    );
    r.refs = refs.iter().map(|n| ResourceName::new(*n)).collect();
    manifest.insert(r).unwrap();
}

fn test_node(manifest: &mut Manifest, name: &str, refs: &[&str], severity: TestSeverity) {
    let mut r = Resource::new(
        UniqueId::from_parts(ResourceKind::Test, "proj", name),
        ResourceName::new(name),
        ResourceKind::Test,
        PathBuf::from("models/schema.yml"),
        String::new(),
    );
    r.refs = refs.iter().map(|n| ResourceName::new(*n)).collect();
    r.test = Some(TestDetails {
        kind: TestKind::NotNull,
        severity,
        tested_node: Some(ResourceName::new(refs[0])),
        column: Some("id".to_string()),
    });
    manifest.insert(r).unwrap();
}

fn id(kind: ResourceKind, name: &str) -> UniqueId {
    UniqueId::from_parts(kind, "proj", name)
}

#[test]
fn test_build_resolves_refs() {
    let mut manifest = Manifest::new("proj");
    model(&mut manifest, "a", &[]);
    model(&mut manifest, "b", &["a"]);
    let graph = Graph::build(&mut manifest).unwrap();

    assert_eq!(
        manifest.get(&id(ResourceKind::Model, "b")).unwrap().depends_on,
        vec![id(ResourceKind::Model, "a")]
    );
    assert_eq!(
        graph.dependencies(&id(ResourceKind::Model, "b")),
        vec![id(ResourceKind::Model, "a")]
    );
    assert_eq!(
        graph.dependents(&id(ResourceKind::Model, "a")),
        vec![id(ResourceKind::Model, "b")]
    );
}

#[test]
fn test_unresolved_ref_is_hard_error() {
    let mut manifest = Manifest::new("proj");
    model(&mut manifest, "b", &["missing"]);
    let err = Graph::build(&mut manifest).unwrap_err();
    match err {
        CoreError::UnresolvedRef { resource, reference } => {
            assert_eq!(resource, "model.proj.b");
            assert_eq!(reference, "missing");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_cycle_reports_full_path() {
    let mut manifest = Manifest::new("proj");
    model(&mut manifest, "a", &["c"]);
    model(&mut manifest, "b", &["a"]);
    model(&mut manifest, "c", &["b"]);
    let err = Graph::build(&mut manifest).unwrap_err();
    match err {
        CoreError::CircularDependency { cycle } => {
            // All three nodes appear, and the path closes on its start
            for name in ["model.proj.a", "model.proj.b", "model.proj.c"] {
                assert!(cycle.contains(name), "cycle '{}' missing {}", cycle, name);
            }
            let first = cycle.split(" -> ").next().unwrap();
            let last = cycle.split(" -> ").last().unwrap();
            assert_eq!(first, last);
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_determinism_same_manifest_same_graph() {
    let build = || {
        let mut manifest = Manifest::new("proj");
        model(&mut manifest, "a", &[]);
        model(&mut manifest, "b", &["a"]);
        model(&mut manifest, "c", &["a", "b"]);
        model(&mut manifest, "d", &["b"]);
        let graph = Graph::build(&mut manifest).unwrap();
        graph.topological_order()
    };
    assert_eq!(build(), build());
}

#[test]
fn test_topological_order_ties_break_by_id() {
    let mut manifest = Manifest::new("proj");
    model(&mut manifest, "z", &[]);
    model(&mut manifest, "a", &[]);
    model(&mut manifest, "m", &["a", "z"]);
    let graph = Graph::build(&mut manifest).unwrap();
    let order = graph.topological_order();
    assert_eq!(
        order,
        vec![
            id(ResourceKind::Model, "a"),
            id(ResourceKind::Model, "z"),
            id(ResourceKind::Model, "m"),
        ]
    );
}

#[test]
fn test_descendants_are_transitive() {
    let mut manifest = Manifest::new("proj");
    model(&mut manifest, "a", &[]);
    model(&mut manifest, "b", &["a"]);
    model(&mut manifest, "c", &["b"]);
    let graph = Graph::build(&mut manifest).unwrap();
    assert_eq!(
        graph.descendants(&id(ResourceKind::Model, "a")),
        vec![id(ResourceKind::Model, "b"), id(ResourceKind::Model, "c")]
    );
    assert_eq!(
        graph.ancestors(&id(ResourceKind::Model, "c")),
        vec![id(ResourceKind::Model, "a"), id(ResourceKind::Model, "b")]
    );
}

#[test]
fn test_blocking_edges_gate_dependents() {
    let mut manifest = Manifest::new("proj");
    model(&mut manifest, "a", &[]);
    model(&mut manifest, "b", &["a"]);
    test_node(&mut manifest, "not_null_a_id", &["a"], TestSeverity::Error);
    let mut graph = Graph::build(&mut manifest).unwrap();
    graph.add_test_blocking_edges(&manifest);

    // b now waits on the test as well as on a
    let deps = graph.dependencies(&id(ResourceKind::Model, "b"));
    assert!(deps.contains(&id(ResourceKind::Test, "not_null_a_id")));
    assert!(deps.contains(&id(ResourceKind::Model, "a")));
}

#[test]
fn test_warn_severity_tests_do_not_gate() {
    let mut manifest = Manifest::new("proj");
    model(&mut manifest, "a", &[]);
    model(&mut manifest, "b", &["a"]);
    test_node(&mut manifest, "warn_test", &["a"], TestSeverity::Warn);
    let mut graph = Graph::build(&mut manifest).unwrap();
    graph.add_test_blocking_edges(&manifest);

    let deps = graph.dependencies(&id(ResourceKind::Model, "b"));
    assert!(!deps.contains(&id(ResourceKind::Test, "warn_test")));
}

#[test]
fn test_relationship_tests_do_not_cycle() {
    // Two models whose relationship tests each reference the other model.
    // The ref edges are: rel_a depends on {a, b}; rel_b depends on {a, b}.
    // Blocking edges rel_a -> b and rel_b -> a would each close a cycle
    // through the test's own ref on that model, so they are not inserted,
    // and the project still builds.
    let mut manifest = Manifest::new("proj");
    model(&mut manifest, "a", &[]);
    model(&mut manifest, "b", &[]);
    test_node(&mut manifest, "rel_a", &["a", "b"], TestSeverity::Error);
    test_node(&mut manifest, "rel_b", &["b", "a"], TestSeverity::Error);

    let mut graph = Graph::build(&mut manifest).unwrap();
    graph.add_test_blocking_edges(&manifest);

    // Still schedulable: a full topological order exists.
    let order = graph.topological_order();
    assert_eq!(order.len(), 4);

    // And neither test gained an edge onto a model it already refs.
    assert!(!graph
        .dependencies(&id(ResourceKind::Model, "a"))
        .contains(&id(ResourceKind::Test, "rel_a")));
    assert!(!graph
        .dependencies(&id(ResourceKind::Model, "b"))
        .contains(&id(ResourceKind::Test, "rel_b")));
}

#[test]
fn test_blocking_edge_skipped_when_dependent_is_upstream_of_test() {
    // b depends on a; a's relationship test also references b. The
    // candidate blocking edge rel_a -> b would close a cycle because the
    // test already depends on b, so it must not be inserted.
    let mut manifest = Manifest::new("proj");
    model(&mut manifest, "a", &[]);
    model(&mut manifest, "b", &["a"]);
    test_node(&mut manifest, "rel_a", &["a", "b"], TestSeverity::Error);

    let mut graph = Graph::build(&mut manifest).unwrap();
    graph.add_test_blocking_edges(&manifest);

    let deps = graph.dependencies(&id(ResourceKind::Model, "b"));
    assert!(!deps.contains(&id(ResourceKind::Test, "rel_a")));
    assert_eq!(graph.topological_order().len(), 3);
}

#[test]
fn test_disabled_resources_stay_out_of_graph() {
    let mut manifest = Manifest::new("proj");
    model(&mut manifest, "a", &[]);
    let disabled_id = id(ResourceKind::Model, "a");
    manifest.resources.get_mut(&disabled_id).unwrap().enabled = false;
    let graph = Graph::build(&mut manifest).unwrap();
    assert!(!graph.contains(&disabled_id));
}
