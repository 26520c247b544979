use super::*;
use std::path::PathBuf;

fn model(name: &str) -> Resource {
    Resource::new(
        UniqueId::from_parts(ResourceKind::Model, "proj", name),
        ResourceName::new(name),
        ResourceKind::Model,
        PathBuf::from(format!("models/{}.sql", name)),
        format!("select * from {}", name),
    )
}

#[test]
fn test_new_computes_checksum() {
    let r = model("customers");
    assert_eq!(r.checksum, crate::checksum::compute_checksum(&r.raw_sql));
    assert!(r.enabled);
    assert!(r.compiled_sql.is_none());
}

#[test]
fn test_relation_name_unqualified() {
    let r = model("customers");
    assert_eq!(r.relation_name().as_deref(), Some("customers"));
}

#[test]
fn test_relation_name_with_schema() {
    let mut r = model("customers");
    r.schema = Some("staging".to_string());
    assert_eq!(r.relation_name().as_deref(), Some("staging.customers"));
}

#[test]
fn test_source_relation_uses_identifier() {
    let mut r = Resource::new(
        UniqueId::new("source.proj.raw.orders"),
        ResourceName::new("orders"),
        ResourceKind::Source,
        PathBuf::from("models/sources.yml"),
        String::new(),
    );
    r.source = Some(SourceDetails {
        source_name: "raw".to_string(),
        schema: "landing".to_string(),
        identifier: Some("orders_v2".to_string()),
    });
    assert_eq!(r.relation_name().as_deref(), Some("landing.orders_v2"));
}

#[test]
fn test_tests_have_no_relation() {
    let mut r = model("t");
    r.kind = ResourceKind::Test;
    assert!(r.relation_name().is_none());
}

#[test]
fn test_kind_parse_roundtrip() {
    for kind in [
        ResourceKind::Model,
        ResourceKind::Test,
        ResourceKind::Seed,
        ResourceKind::Snapshot,
        ResourceKind::Source,
        ResourceKind::Exposure,
    ] {
        assert_eq!(ResourceKind::parse(kind.label()), Some(kind));
    }
    assert_eq!(ResourceKind::parse("metric"), None);
}

#[test]
fn test_executability() {
    assert!(ResourceKind::Model.is_executable());
    assert!(ResourceKind::Test.is_executable());
    assert!(!ResourceKind::Source.is_executable());
    assert!(!ResourceKind::Exposure.is_executable());
}

#[test]
fn test_blocking_test_severity() {
    let mut r = model("t");
    r.kind = ResourceKind::Test;
    r.test = Some(TestDetails {
        kind: crate::testing::TestKind::NotNull,
        severity: TestSeverity::Error,
        tested_node: Some(ResourceName::new("customers")),
        column: Some("id".to_string()),
    });
    assert!(r.is_blocking_test());

    r.test.as_mut().unwrap().severity = TestSeverity::Warn;
    assert!(!r.is_blocking_test());
}
