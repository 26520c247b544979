use super::*;
use crate::resource::SourceDetails;
use crate::unique_id::ResourceName;
use std::path::PathBuf;
use tempfile::tempdir;

fn resource(kind: ResourceKind, name: &str) -> Resource {
    Resource::new(
        UniqueId::from_parts(kind, "proj", name),
        ResourceName::new(name),
        kind,
        PathBuf::from(format!("{}s/{}", kind, name)),
        format!("select '{}'", name),
    )
}

#[test]
fn test_insert_rejects_duplicates() {
    let mut manifest = Manifest::new("proj");
    manifest.insert(resource(ResourceKind::Model, "orders")).unwrap();

    let err = manifest
        .insert(resource(ResourceKind::Model, "orders"))
        .unwrap_err();
    assert!(matches!(err, CoreError::DuplicateResource { .. }));
}

#[test]
fn test_resolve_ref_searches_kinds_in_order() {
    let mut manifest = Manifest::new("proj");
    manifest.insert(resource(ResourceKind::Seed, "countries")).unwrap();
    manifest.insert(resource(ResourceKind::Model, "orders")).unwrap();

    assert_eq!(
        manifest.resolve_ref("orders").unwrap().kind,
        ResourceKind::Model
    );
    assert_eq!(
        manifest.resolve_ref("countries").unwrap().kind,
        ResourceKind::Seed
    );
    assert!(manifest.resolve_ref("missing").is_none());
}

#[test]
fn test_resolve_source() {
    let mut manifest = Manifest::new("proj");
    let mut src = resource(ResourceKind::Source, "raw.orders");
    src.source = Some(SourceDetails {
        source_name: "raw".to_string(),
        schema: "landing".to_string(),
        identifier: None,
    });
    manifest.insert(src).unwrap();

    assert!(manifest.resolve_source("raw", "orders").is_some());
    assert!(manifest.resolve_source("raw", "customers").is_none());
}

#[test]
fn test_save_and_load_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("target").join("manifest.json");

    let mut manifest = Manifest::new("proj");
    manifest.insert(resource(ResourceKind::Model, "orders")).unwrap();
    manifest.record_env_var("WAREHOUSE", "dev");
    manifest.save(&path).unwrap();

    let loaded = Manifest::load(&path).unwrap().unwrap();
    assert_eq!(loaded.project_name, "proj");
    assert_eq!(loaded.resources.len(), 1);
    assert_eq!(loaded.env_vars.get("WAREHOUSE").map(String::as_str), Some("dev"));
}

#[test]
fn test_load_missing_is_none() {
    let dir = tempdir().unwrap();
    assert!(Manifest::load(&dir.path().join("nope.json")).unwrap().is_none());
}
