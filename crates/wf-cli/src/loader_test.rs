use super::*;
use chrono::{DateTime, Utc};
use tempfile::TempDir;
use wf_core::error::CoreError;
use wf_core::unique_id::UniqueId;

fn scaffold(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("wrenflow.yml"), "name: jaffle\n").unwrap();
    write_files(&dir, files);
    dir
}

fn write_files(dir: &TempDir, files: &[(&str, &str)]) {
    for (rel, contents) in files {
        let path = dir.path().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }
}

fn env(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn load(dir: &TempDir, env: BTreeMap<String, String>) -> CoreResult<LoadedProject> {
    load_project(
        dir.path(),
        &LoaderOptions {
            env,
            ..Default::default()
        },
    )
}

fn mid(name: &str) -> UniqueId {
    UniqueId::new(format!("model.jaffle.{}", name))
}

fn created_at(loaded: &LoadedProject, id: &UniqueId) -> DateTime<Utc> {
    loaded.manifest.get(id).unwrap().created_at
}

#[test]
fn test_initial_load_parses_full_project() {
    let dir = scaffold(&[
        ("models/plain.sql", "select 1 as id"),
        ("models/child.sql", "select * from {{ ref('plain') }}"),
        (
            "models/schema.yml",
            "models:\n  - name: plain\n    columns:\n      - name: id\n        tests: [not_null, unique]\n",
        ),
        ("seeds/countries.csv", "code\nus\n"),
        ("tests/plain_positive.sql", "select * from {{ ref('plain') }} where id <= 0"),
    ]);

    let loaded = load(&dir, env(&[])).unwrap();
    assert_eq!(loaded.reused, 0);
    assert!(loaded.reparsed >= 5);

    let manifest = &loaded.manifest;
    assert!(manifest.get(&mid("plain")).is_some());
    assert!(manifest.get(&mid("child")).is_some());
    assert!(manifest.get(&UniqueId::new("seed.jaffle.countries")).is_some());
    assert!(manifest.get(&UniqueId::new("test.jaffle.not_null_plain_id")).is_some());
    assert!(manifest.get(&UniqueId::new("test.jaffle.unique_plain_id")).is_some());
    assert!(manifest.get(&UniqueId::new("test.jaffle.plain_positive")).is_some());

    // child resolved against plain
    assert_eq!(
        manifest.get(&mid("child")).unwrap().depends_on,
        vec![mid("plain")]
    );

    // artifacts written
    assert!(dir.path().join("target/manifest.json").exists());
    assert!(dir.path().join("target/partial_parse.json").exists());
}

#[test]
fn test_unchanged_rerun_reparses_nothing() {
    let dir = scaffold(&[
        ("models/plain.sql", "select 1 as id"),
        ("models/child.sql", "select * from {{ ref('plain') }}"),
        ("macros/money.sql", "{% macro cents(c) %}({{ c }} / 100.0){% endmacro %}"),
        ("models/uses_macro.sql", "select {{ cents('amount') }} as amount from {{ ref('plain') }}"),
    ]);

    let first = load(&dir, env(&[])).unwrap();
    let second = load(&dir, env(&[])).unwrap();

    assert_eq!(second.reparsed, 0, "no file changed, nothing to reparse");
    assert_eq!(second.reused, first.manifest.resources.len());
    for id in [mid("plain"), mid("child"), mid("uses_macro")] {
        assert_eq!(
            created_at(&first, &id),
            created_at(&second, &id),
            "created_at must survive a cache hit for {}",
            id
        );
    }
}

#[test]
fn test_env_var_change_reparses_only_referencing_resource() {
    let dir = scaffold(&[
        ("models/plain.sql", "select 1 as id"),
        (
            "models/env_model.sql",
            "select '{{ env_var('ENV_VAR_TEST') }}' as env_value",
        ),
    ]);

    let first = load(&dir, env(&[("ENV_VAR_TEST", "first")])).unwrap();
    assert_eq!(
        first.manifest.env_vars.get("ENV_VAR_TEST").map(String::as_str),
        Some("first")
    );

    // Same value: full cache hit.
    let second = load(&dir, env(&[("ENV_VAR_TEST", "first")])).unwrap();
    assert_eq!(second.reparsed, 0);

    // Changed value: only env_model re-parses; its created_at moves.
    let third = load(&dir, env(&[("ENV_VAR_TEST", "second")])).unwrap();
    assert_eq!(third.reparsed, 1);
    assert_ne!(
        created_at(&second, &mid("env_model")),
        created_at(&third, &mid("env_model"))
    );
    assert_eq!(
        created_at(&second, &mid("plain")),
        created_at(&third, &mid("plain"))
    );
    assert_eq!(
        third.manifest.env_vars.get("ENV_VAR_TEST").map(String::as_str),
        Some("second")
    );
}

#[test]
fn test_undefined_env_var_is_structural_failure_stub() {
    let dir = scaffold(&[
        ("models/plain.sql", "select 1 as id"),
        (
            "models/env_model.sql",
            "select '{{ env_var('ENV_VAR_TEST') }}' as env_value",
        ),
    ]);

    let loaded = load(&dir, env(&[])).unwrap();
    let stub = loaded.manifest.get(&mid("env_model")).unwrap();
    let error = stub.parse_error.as_deref().unwrap();
    assert!(error.contains("E012"), "got: {}", error);
    assert!(error.contains("ENV_VAR_TEST"));

    // Unrelated model is untouched.
    assert!(loaded.manifest.get(&mid("plain")).unwrap().parse_error.is_none());

    // Once the var is defined the stub parses for real.
    let fixed = load(&dir, env(&[("ENV_VAR_TEST", "ok")])).unwrap();
    assert!(fixed.manifest.get(&mid("env_model")).unwrap().parse_error.is_none());
}

#[test]
fn test_macro_change_reparses_users_only() {
    let dir = scaffold(&[
        ("models/plain.sql", "select 1 as id"),
        ("macros/money.sql", "{% macro cents(c) %}({{ c }} / 100.0){% endmacro %}"),
        ("models/uses_macro.sql", "select {{ cents('amount') }} as amount"),
    ]);

    let first = load(&dir, env(&[])).unwrap();
    write_files(
        &dir,
        &[("macros/money.sql", "{% macro cents(c) %}({{ c }} / 100){% endmacro %}")],
    );
    let second = load(&dir, env(&[])).unwrap();

    assert_ne!(
        created_at(&first, &mid("uses_macro")),
        created_at(&second, &mid("uses_macro")),
        "macro user must re-parse"
    );
    assert_eq!(
        created_at(&first, &mid("plain")),
        created_at(&second, &mid("plain")),
        "non-user must carry over"
    );
}

#[test]
fn test_content_change_reparses_only_that_file() {
    let dir = scaffold(&[
        ("models/plain.sql", "select 1 as id"),
        ("models/child.sql", "select * from {{ ref('plain') }}"),
    ]);

    let first = load(&dir, env(&[])).unwrap();
    write_files(&dir, &[("models/plain.sql", "select 2 as id")]);
    let second = load(&dir, env(&[])).unwrap();

    assert_eq!(second.reparsed, 1);
    assert_ne!(created_at(&first, &mid("plain")), created_at(&second, &mid("plain")));
    assert_eq!(created_at(&first, &mid("child")), created_at(&second, &mid("child")));
}

#[test]
fn test_seed_config_change_reparses_seed() {
    let dir = scaffold(&[
        ("seeds/countries.csv", "code\nus\n"),
        ("seeds/countries.yml", "schema: ref_data\n"),
    ]);

    let first = load(&dir, env(&[])).unwrap();
    let seed_id = UniqueId::new("seed.jaffle.countries");
    assert_eq!(
        first.manifest.get(&seed_id).unwrap().schema.as_deref(),
        Some("ref_data")
    );

    write_files(&dir, &[("seeds/countries.yml", "schema: reference\n")]);
    let second = load(&dir, env(&[])).unwrap();
    assert_ne!(
        created_at(&first, &seed_id),
        created_at(&second, &seed_id),
        "seed config change must re-parse the seed"
    );
    assert_eq!(
        second.manifest.get(&seed_id).unwrap().schema.as_deref(),
        Some("reference")
    );
}

#[test]
fn test_removed_file_drops_resource() {
    let dir = scaffold(&[
        ("models/plain.sql", "select 1 as id"),
        ("models/extra.sql", "select 2 as id"),
    ]);

    let first = load(&dir, env(&[])).unwrap();
    assert!(first.manifest.get(&mid("extra")).is_some());

    std::fs::remove_file(dir.path().join("models/extra.sql")).unwrap();
    let second = load(&dir, env(&[])).unwrap();
    assert!(second.manifest.get(&mid("extra")).is_none());
    assert_eq!(
        created_at(&first, &mid("plain")),
        created_at(&second, &mid("plain"))
    );
}

#[test]
fn test_removing_a_dependency_surfaces_unresolved_ref() {
    let dir = scaffold(&[
        ("models/plain.sql", "select 1 as id"),
        ("models/child.sql", "select * from {{ ref('plain') }}"),
    ]);

    load(&dir, env(&[])).unwrap();
    std::fs::remove_file(dir.path().join("models/plain.sql")).unwrap();

    let err = load(&dir, env(&[])).unwrap_err();
    match err {
        CoreError::UnresolvedRef { resource, reference } => {
            assert_eq!(resource, "model.jaffle.child");
            assert_eq!(reference, "plain");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_cycle_is_structural_error() {
    let dir = scaffold(&[
        ("models/a.sql", "select * from {{ ref('b') }}"),
        ("models/b.sql", "select * from {{ ref('a') }}"),
    ]);
    let err = load(&dir, env(&[])).unwrap_err();
    assert!(matches!(err, CoreError::CircularDependency { .. }));
}

#[test]
fn test_no_partial_parse_forces_full_reparse() {
    let dir = scaffold(&[("models/plain.sql", "select 1 as id")]);

    let first = load(&dir, env(&[])).unwrap();
    let second = load_project(
        dir.path(),
        &LoaderOptions {
            no_partial_parse: true,
            ..Default::default()
        },
    )
    .unwrap();

    assert_eq!(second.reused, 0);
    assert_ne!(created_at(&first, &mid("plain")), created_at(&second, &mid("plain")));
}

#[test]
fn test_corrupt_cache_degrades_to_full_reparse() {
    let dir = scaffold(&[("models/plain.sql", "select 1 as id")]);
    load(&dir, env(&[])).unwrap();
    std::fs::write(dir.path().join("target/partial_parse.json"), "{ nope").unwrap();

    let loaded = load(&dir, env(&[])).unwrap();
    assert_eq!(loaded.reused, 0);
    assert!(loaded.manifest.get(&mid("plain")).is_some());
}

#[test]
fn test_parse_failures_always_reparse_next_run() {
    let dir = scaffold(&[(
        "models/env_model.sql",
        "select '{{ env_var('ENV_VAR_TEST') }}' as v",
    )]);

    let first = load(&dir, env(&[])).unwrap();
    assert!(first.manifest.get(&mid("env_model")).unwrap().parse_error.is_some());

    // Still broken: the file parses again rather than being cache-hit.
    let second = load(&dir, env(&[])).unwrap();
    assert_eq!(second.reparsed, 1);
    assert!(second.manifest.get(&mid("env_model")).unwrap().parse_error.is_some());
}

#[test]
fn test_sources_resolve_for_models() {
    let dir = scaffold(&[
        (
            "models/sources.yml",
            "sources:\n  - name: raw\n    schema: landing\n    tables:\n      - name: orders\n",
        ),
        (
            "models/stg_orders.sql",
            "select * from {{ source('raw', 'orders') }}",
        ),
    ]);

    let loaded = load(&dir, env(&[])).unwrap();
    let model = loaded.manifest.get(&mid("stg_orders")).unwrap();
    assert_eq!(
        model.depends_on,
        vec![UniqueId::new("source.jaffle.raw.orders")]
    );
}

#[test]
fn test_vars_override_merges_over_config() {
    let dir = scaffold(&[(
        "models/plain.sql",
        "select {{ var('limit', 5) }} as lim",
    )]);
    let loaded = load_project(
        dir.path(),
        &LoaderOptions {
            vars: Some(r#"{"limit": 9}"#.to_string()),
            ..Default::default()
        },
    )
    .unwrap();
    // Parse succeeded with the override in place.
    assert!(loaded.manifest.get(&mid("plain")).unwrap().parse_error.is_none());
}
