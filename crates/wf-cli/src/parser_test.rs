use super::*;
use std::collections::BTreeMap;
use tempfile::TempDir;
use wf_core::checksum::compute_checksum;
use wf_jinja::RendererOptions;

struct Fixture {
    dir: TempDir,
    project: Project,
    registry: MacroRegistry,
    env: BTreeMap<String, String>,
}

impl Fixture {
    fn new(files: &[(&str, &str)]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("wrenflow.yml"), "name: jaffle\n").unwrap();
        for (rel, contents) in files {
            let path = dir.path().join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, contents).unwrap();
        }
        let project = Project::load(dir.path()).unwrap();
        Self {
            dir,
            project,
            registry: MacroRegistry::from_files(&[]),
            env: BTreeMap::new(),
        }
    }

    fn with_env(mut self, pairs: &[(&str, &str)]) -> Self {
        self.env = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self
    }

    fn parse(&self, rel: &str, kind: FileKind) -> CoreResult<ParsedFile> {
        let renderer = JinjaRenderer::new(RendererOptions {
            env: self.env.clone(),
            macro_prelude: self.registry.prelude().to_string(),
            ..Default::default()
        });
        let parser = FileParser {
            project: &self.project,
            renderer: &renderer,
            registry: &self.registry,
            env: &self.env,
        };
        let contents = std::fs::read_to_string(self.dir.path().join(rel)).unwrap();
        let file = SourceFileInfo {
            path: PathBuf::from(rel),
            kind,
            checksum: compute_checksum(&contents),
        };
        parser.parse_file(&file)
    }
}

#[test]
fn test_parse_model_captures_refs_and_config() {
    let fx = Fixture::new(&[(
        "models/orders.sql",
        "{{ config(materialized='table', schema='marts', tags=['daily']) }}\nselect * from {{ ref('stg_orders') }}",
    )]);
    let out = fx.parse("models/orders.sql", FileKind::ModelSql).unwrap();
    assert!(!out.failed);
    let model = &out.resources[0];
    assert_eq!(model.unique_id.as_str(), "model.jaffle.orders");
    assert_eq!(model.kind, ResourceKind::Model);
    assert_eq!(model.refs, vec!["stg_orders"]);
    assert_eq!(model.materialization, Some(Materialization::Table));
    assert_eq!(model.schema.as_deref(), Some("marts"));
    assert_eq!(model.tags, vec!["daily"]);
}

#[test]
fn test_parse_model_env_vars_captured() {
    let fx = Fixture::new(&[(
        "models/m.sql",
        "select '{{ env_var('WAREHOUSE') }}' as w",
    )])
    .with_env(&[("WAREHOUSE", "dev")]);
    let out = fx.parse("models/m.sql", FileKind::ModelSql).unwrap();
    let model = &out.resources[0];
    assert!(model.env_vars.contains("WAREHOUSE"));
    assert_eq!(out.observed_env.get("WAREHOUSE").map(String::as_str), Some("dev"));
}

#[test]
fn test_parse_model_undefined_env_var_yields_stub() {
    let fx = Fixture::new(&[(
        "models/m.sql",
        "select '{{ env_var('MISSING') }}' as w",
    )]);
    let out = fx.parse("models/m.sql", FileKind::ModelSql).unwrap();
    assert!(out.failed);
    let model = &out.resources[0];
    let error = model.parse_error.as_deref().unwrap();
    assert!(error.contains("MISSING"));
    assert!(model.refs.is_empty());
}

#[test]
fn test_parse_properties_yields_tests_sources_exposures() {
    let fx = Fixture::new(&[(
        "models/schema.yml",
        r#"
models:
  - name: orders
    columns:
      - name: id
        tests:
          - not_null
          - unique
      - name: status
        tests:
          - accepted_values:
              values: ["placed", "shipped"]
      - name: customer_id
        tests:
          - relationships:
              to: customers
              field: id
sources:
  - name: raw
    schema: landing
    tables:
      - name: payments
        identifier: payments_v2
exposures:
  - name: weekly_report
    owner: data-team
    depends_on: [orders]
"#,
    )]);
    let out = fx.parse("models/schema.yml", FileKind::PropertiesYaml).unwrap();

    let ids: Vec<&str> = out.resources.iter().map(|r| r.unique_id.as_str()).collect();
    assert!(ids.contains(&"test.jaffle.not_null_orders_id"));
    assert!(ids.contains(&"test.jaffle.unique_orders_id"));
    assert!(ids.contains(&"test.jaffle.accepted_values_orders_status"));
    assert!(ids.contains(&"test.jaffle.relationships_orders_customer_id"));
    assert!(ids.contains(&"source.jaffle.raw.payments"));
    assert!(ids.contains(&"exposure.jaffle.weekly_report"));

    let rel_test = out
        .resources
        .iter()
        .find(|r| r.unique_id == "test.jaffle.relationships_orders_customer_id")
        .unwrap();
    let refs: Vec<&str> = rel_test.refs.iter().map(|r| r.as_str()).collect();
    assert!(refs.contains(&"orders"));
    assert!(refs.contains(&"customers"));

    let source = out
        .resources
        .iter()
        .find(|r| r.unique_id == "source.jaffle.raw.payments")
        .unwrap();
    assert_eq!(source.relation_name().as_deref(), Some("landing.payments_v2"));
}

#[test]
fn test_parse_properties_unknown_test_is_error() {
    let fx = Fixture::new(&[(
        "models/schema.yml",
        "models:\n  - name: orders\n    columns:\n      - name: id\n        tests: [does_not_exist]\n",
    )]);
    let err = fx
        .parse("models/schema.yml", FileKind::PropertiesYaml)
        .unwrap_err();
    assert!(matches!(err, CoreError::ResourceParseError { .. }));
}

#[test]
fn test_parse_properties_undefined_env_var_is_hard_error() {
    let fx = Fixture::new(&[(
        "models/schema.yml",
        "models:\n  - name: \"{{ env_var('MODEL_NAME') }}\"\n    columns: []\n",
    )]);
    let err = fx
        .parse("models/schema.yml", FileKind::PropertiesYaml)
        .unwrap_err();
    assert!(matches!(err, CoreError::UndefinedEnvVar { .. }));
}

#[test]
fn test_parse_seed_with_config() {
    let fx = Fixture::new(&[
        ("seeds/countries.csv", "code,population\nus,331\n"),
        (
            "seeds/countries.yml",
            "schema: ref_data\ncolumn_types:\n  population: BIGINT\ndelimiter: \",\"\ntags: [static]\n",
        ),
    ]);
    let out = fx.parse("seeds/countries.csv", FileKind::SeedCsv).unwrap();
    let seed = &out.resources[0];
    assert_eq!(seed.kind, ResourceKind::Seed);
    assert_eq!(seed.schema.as_deref(), Some("ref_data"));
    assert_eq!(seed.tags, vec!["static"]);
    let details = seed.seed.as_ref().unwrap();
    assert_eq!(details.column_types.get("population").map(String::as_str), Some("BIGINT"));
}

#[test]
fn test_parse_snapshot_variants() {
    let fx = Fixture::new(&[(
        "snapshots/orders.yml",
        r#"
snapshots:
  - name: orders_snapshot
    ref: orders
    unique_key: [id]
    strategy: timestamp
    updated_at: updated_at
  - name: ext_snapshot
    relation: landing.raw_orders
    unique_key: [id]
    strategy: check
    check_cols: [status]
"#,
    )]);
    let out = fx.parse("snapshots/orders.yml", FileKind::SnapshotYaml).unwrap();
    assert_eq!(out.resources.len(), 2);

    let by_ref = &out.resources[0];
    assert_eq!(by_ref.refs, vec!["orders"]);
    assert_eq!(
        by_ref.snapshot.as_ref().unwrap().strategy,
        SnapshotStrategy::Timestamp
    );

    let external = &out.resources[1];
    assert!(external.refs.is_empty());
    assert_eq!(
        external.snapshot.as_ref().unwrap().relation.as_deref(),
        Some("landing.raw_orders")
    );
}

#[test]
fn test_parse_snapshot_missing_target_is_error() {
    let fx = Fixture::new(&[(
        "snapshots/bad.yml",
        "snapshots:\n  - name: bad\n    unique_key: [id]\n    strategy: check\n    check_cols: [x]\n",
    )]);
    let err = fx.parse("snapshots/bad.yml", FileKind::SnapshotYaml).unwrap_err();
    assert!(matches!(err, CoreError::ConfigInvalid { .. }));
}

#[test]
fn test_parse_singular_test_with_warn_severity() {
    let fx = Fixture::new(&[(
        "tests/orders_positive.sql",
        "{{ config(severity='warn') }}\nselect * from {{ ref('orders') }} where amount <= 0",
    )]);
    let out = fx.parse("tests/orders_positive.sql", FileKind::TestSql).unwrap();
    let test = &out.resources[0];
    assert_eq!(test.kind, ResourceKind::Test);
    assert_eq!(test.refs, vec!["orders"]);
    let details = test.test.as_ref().unwrap();
    assert_eq!(details.kind, TestKind::Singular);
    assert_eq!(details.severity, TestSeverity::Warn);
}

#[test]
fn test_macro_attribution_on_models() {
    let mut fx = Fixture::new(&[(
        "models/m.sql",
        "select {{ cents('amount') }} as amount",
    )]);
    fx.registry = MacroRegistry::from_files(&[(
        PathBuf::from("macros/money.sql"),
        "{% macro cents(c) %}({{ c }} / 100.0){% endmacro %}".to_string(),
    )]);
    let out = fx.parse("models/m.sql", FileKind::ModelSql).unwrap();
    assert!(out.resources[0].macros.contains("cents"));
}
