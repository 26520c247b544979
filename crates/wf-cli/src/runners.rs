//! Execution callbacks: compile a resource, then run it on the warehouse.
//!
//! The scheduler invokes [`WrenRunner::run`] once per selected resource.
//! Compilation happens inside the callback, so a compile failure is an
//! `error` outcome that skips dependents rather than aborting the run.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use wf_core::manifest::Manifest;
use wf_core::resource::{
    Materialization, Resource, ResourceKind, SnapshotDetails, SnapshotStrategy,
};
use wf_core::results::{NodeResult, NodeStatus};
use wf_core::sql_utils::{quote_ident, quote_qualified};
use wf_core::testing::{generate_test_sql, TestKind, TestSeverity};
use wf_db::{CsvLoadOptions, Warehouse};
use wf_jinja::{JinjaRenderer, RendererOptions};
use wf_run::NodeRunner;
use wf_sql::{validate_model_sql, SqlDialect};

use crate::loader::{LoadedProject, COMPILED_DIR};

/// Renders and validates resource SQL against the resolved manifest.
pub(crate) struct SqlCompiler {
    vars: HashMap<String, serde_yaml::Value>,
    env: BTreeMap<String, String>,
    macro_prelude: String,
    ref_relations: HashMap<String, String>,
    source_relations: HashMap<String, String>,
    compiled_dir: Option<PathBuf>,
}

impl SqlCompiler {
    /// Build a compiler with relation maps for every referenceable resource.
    pub fn new(loaded: &LoadedProject, write_artifacts: bool) -> Self {
        let mut ref_relations = HashMap::new();
        let mut source_relations = HashMap::new();
        for resource in loaded.manifest.resources.values() {
            let Some(relation) = resource.relation_name() else {
                continue;
            };
            match resource.kind {
                ResourceKind::Model | ResourceKind::Seed | ResourceKind::Snapshot => {
                    ref_relations.insert(resource.name.to_string(), relation);
                }
                ResourceKind::Source => {
                    if let Some(details) = &resource.source {
                        source_relations.insert(
                            format!("{}.{}", details.source_name, resource.name),
                            relation,
                        );
                    }
                }
                _ => {}
            }
        }
        Self {
            vars: loaded.project.config.vars.clone(),
            env: loaded.env.clone(),
            macro_prelude: loaded.macro_prelude.clone(),
            ref_relations,
            source_relations,
            compiled_dir: write_artifacts
                .then(|| loaded.project.target_path().join(COMPILED_DIR)),
        }
    }

    /// Captures are per-renderer state, so concurrent callbacks each build
    /// their own.
    fn renderer(&self) -> JinjaRenderer<'static> {
        JinjaRenderer::new(RendererOptions {
            vars: self.vars.clone(),
            env: self.env.clone(),
            ref_relations: Some(self.ref_relations.clone()),
            source_relations: Some(self.source_relations.clone()),
            macro_prelude: self.macro_prelude.clone(),
        })
    }

    /// Compile a model or singular test to validated SQL.
    pub fn compile_sql(&self, resource: &Resource) -> Result<String, String> {
        let rendered = self
            .renderer()
            .render(&resource.raw_sql)
            .map_err(|e| e.to_string())?;
        validate_model_sql(SqlDialect::DuckDb, &rendered.sql).map_err(|e| e.to_string())?;
        self.write_artifact(resource, &rendered.sql);
        Ok(rendered.sql)
    }

    /// Compile a test resource to the SQL whose rows are violations.
    pub fn compile_test_sql(
        &self,
        resource: &Resource,
        manifest: &Manifest,
    ) -> Result<String, String> {
        let details = resource
            .test
            .as_ref()
            .ok_or_else(|| format!("{} has no test details", resource.unique_id))?;

        if details.kind == TestKind::Singular {
            return self.compile_sql(resource);
        }

        let tested = details
            .tested_node
            .as_ref()
            .ok_or_else(|| "schema test has no tested node".to_string())?;
        let relation = manifest
            .resolve_ref(tested)
            .and_then(|r| r.relation_name())
            .ok_or_else(|| format!("cannot resolve tested node '{}'", tested))?;
        let column = details
            .column
            .as_deref()
            .ok_or_else(|| "schema test has no column".to_string())?;

        let to_relation = match &details.kind {
            TestKind::Relationships { to, .. } => Some(
                manifest
                    .resolve_ref(to)
                    .and_then(|r| r.relation_name())
                    .ok_or_else(|| format!("cannot resolve relationships target '{}'", to))?,
            ),
            _ => None,
        };

        let sql = generate_test_sql(&details.kind, &relation, column, to_relation.as_deref());
        self.write_artifact(resource, &sql);
        Ok(sql)
    }

    fn write_artifact(&self, resource: &Resource, sql: &str) {
        let Some(dir) = &self.compiled_dir else {
            return;
        };
        let path = dir.join(format!("{}.sql", resource.unique_id));
        if let Err(e) = std::fs::create_dir_all(dir).and_then(|_| std::fs::write(&path, sql)) {
            log::warn!("failed to write compiled artifact {}: {}", path.display(), e);
        }
    }
}

/// The execution callback for every executable resource kind.
pub(crate) struct WrenRunner {
    db: Arc<dyn Warehouse>,
    manifest: Arc<Manifest>,
    compiler: SqlCompiler,
    project_root: PathBuf,
}

impl WrenRunner {
    pub fn new(db: Arc<dyn Warehouse>, loaded: &LoadedProject) -> Self {
        Self {
            db,
            manifest: Arc::clone(&loaded.manifest),
            compiler: SqlCompiler::new(loaded, true),
            project_root: loaded.project.root.clone(),
        }
    }

    async fn ensure_schema(&self, resource: &Resource) -> Result<(), String> {
        if let Some(schema) = &resource.schema {
            self.db
                .create_schema_if_not_exists(&quote_ident(schema))
                .await
                .map_err(|e| e.to_string())?;
        }
        Ok(())
    }

    async fn run_model(&self, resource: &Resource) -> (NodeStatus, Option<String>) {
        let sql = match self.compiler.compile_sql(resource) {
            Ok(sql) => sql,
            Err(message) => return (NodeStatus::Error, Some(message)),
        };
        if let Err(message) = self.ensure_schema(resource).await {
            return (NodeStatus::Error, Some(message));
        }
        let Some(relation) = resource.relation_name() else {
            return (
                NodeStatus::Error,
                Some("model has no target relation".to_string()),
            );
        };
        let relation = quote_qualified(&relation);
        let result = match resource.materialization.unwrap_or_default() {
            Materialization::View => self.db.create_view_as(&relation, &sql, true).await,
            Materialization::Table => self.db.create_table_as(&relation, &sql, true).await,
        };
        match result {
            Ok(()) => (NodeStatus::Success, None),
            Err(e) => (NodeStatus::Error, Some(e.to_string())),
        }
    }

    async fn run_test(&self, resource: &Resource) -> (NodeStatus, Option<String>) {
        let severity = resource
            .test
            .as_ref()
            .map(|t| t.severity)
            .unwrap_or_default();
        let sql = match self.compiler.compile_test_sql(resource, &self.manifest) {
            Ok(sql) => sql,
            Err(message) => return (NodeStatus::Error, Some(message)),
        };
        match self.db.query_count(&sql).await {
            Ok(0) => (NodeStatus::Pass, None),
            Ok(n) => {
                let message = format!("got {} result{}", n, if n == 1 { "" } else { "s" });
                match severity {
                    TestSeverity::Error => (NodeStatus::Fail, Some(message)),
                    TestSeverity::Warn => (NodeStatus::Warn, Some(message)),
                }
            }
            Err(e) => (NodeStatus::Error, Some(e.to_string())),
        }
    }

    async fn run_seed(&self, resource: &Resource) -> (NodeStatus, Option<String>) {
        let details = resource.seed.clone().unwrap_or_default();
        if let Err(message) = self.ensure_schema(resource).await {
            return (NodeStatus::Error, Some(message));
        }
        let Some(relation) = resource.relation_name() else {
            return (
                NodeStatus::Error,
                Some("seed has no target relation".to_string()),
            );
        };
        let csv_path = self.project_root.join(&resource.path);
        let Some(csv_path) = csv_path.to_str() else {
            return (
                NodeStatus::Error,
                Some(format!("non-utf8 seed path: {}", csv_path.display())),
            );
        };
        let options = CsvLoadOptions {
            delimiter: details.delimiter,
            column_types: details.column_types,
        };
        match self
            .db
            .load_csv(&quote_qualified(&relation), csv_path, &options)
            .await
        {
            Ok(()) => (NodeStatus::Success, None),
            Err(e) => (NodeStatus::Error, Some(e.to_string())),
        }
    }

    async fn run_snapshot(&self, resource: &Resource) -> (NodeStatus, Option<String>) {
        let Some(details) = resource.snapshot.clone() else {
            return (
                NodeStatus::Error,
                Some("snapshot has no details".to_string()),
            );
        };
        let base = match self.snapshot_base_relation(resource, &details) {
            Ok(base) => base,
            Err(message) => return (NodeStatus::Error, Some(message)),
        };
        if let Err(message) = self.ensure_schema(resource).await {
            return (NodeStatus::Error, Some(message));
        }
        let Some(target_raw) = resource.relation_name() else {
            return (
                NodeStatus::Error,
                Some("snapshot has no target relation".to_string()),
            );
        };

        match self.apply_snapshot(&target_raw, &base, &details).await {
            Ok(()) => (NodeStatus::Success, None),
            Err(e) => (NodeStatus::Error, Some(e)),
        }
    }

    fn snapshot_base_relation(
        &self,
        resource: &Resource,
        details: &SnapshotDetails,
    ) -> Result<String, String> {
        if let Some(dep) = resource.depends_on.first() {
            return self
                .manifest
                .get(dep)
                .and_then(|r| r.relation_name())
                .map(|r| quote_qualified(&r))
                .ok_or_else(|| format!("cannot resolve snapshot base '{}'", dep));
        }
        details
            .relation
            .as_deref()
            .map(quote_qualified)
            .ok_or_else(|| "snapshot has neither a dependency nor a relation".to_string())
    }

    /// SCD Type 2 upsert: close changed rows, then insert current versions.
    async fn apply_snapshot(
        &self,
        target_raw: &str,
        base: &str,
        details: &SnapshotDetails,
    ) -> Result<(), String> {
        let exists = self
            .db
            .relation_exists(target_raw)
            .await
            .map_err(|e| e.to_string())?;
        let target = quote_qualified(target_raw);

        let valid_from = match (&details.strategy, &details.updated_at) {
            (SnapshotStrategy::Timestamp, Some(col)) => quote_ident(col),
            _ => "CURRENT_TIMESTAMP".to_string(),
        };

        if !exists {
            let sql = format!(
                "CREATE TABLE {target} AS \
                 SELECT *, {valid_from} AS wren_valid_from, \
                 CAST(NULL AS TIMESTAMP) AS wren_valid_to FROM {base}"
            );
            return self.db.execute(&sql).await.map(|_| ()).map_err(|e| e.to_string());
        }

        let key_match = details
            .unique_key
            .iter()
            .map(|k| format!("t.{k} = b.{k}", k = quote_ident(k)))
            .collect::<Vec<_>>()
            .join(" AND ");

        let changed = match details.strategy {
            SnapshotStrategy::Timestamp => {
                let col = quote_ident(details.updated_at.as_deref().unwrap_or("updated_at"));
                format!("b.{col} > t.wren_valid_from")
            }
            SnapshotStrategy::Check => details
                .check_cols
                .iter()
                .map(|c| format!("b.{c} IS DISTINCT FROM t.{c}", c = quote_ident(c)))
                .collect::<Vec<_>>()
                .join(" OR "),
        };

        // Close superseded versions.
        let close_sql = format!(
            "UPDATE {target} AS t SET wren_valid_to = CURRENT_TIMESTAMP \
             WHERE t.wren_valid_to IS NULL \
             AND EXISTS (SELECT 1 FROM {base} b WHERE {key_match} AND ({changed}))"
        );
        self.db.execute(&close_sql).await.map_err(|e| e.to_string())?;

        // Insert rows with no open version (new keys and just-closed ones).
        let insert_sql = format!(
            "INSERT INTO {target} \
             SELECT b.*, {valid_from_b} AS wren_valid_from, \
             CAST(NULL AS TIMESTAMP) AS wren_valid_to \
             FROM {base} b \
             WHERE NOT EXISTS (SELECT 1 FROM {target} t \
             WHERE {key_match} AND t.wren_valid_to IS NULL)",
            valid_from_b = match (&details.strategy, &details.updated_at) {
                (SnapshotStrategy::Timestamp, Some(col)) => format!("b.{}", quote_ident(col)),
                _ => "CURRENT_TIMESTAMP".to_string(),
            },
        );
        self.db.execute(&insert_sql).await.map_err(|e| e.to_string())?;
        Ok(())
    }
}

#[async_trait]
impl NodeRunner for WrenRunner {
    async fn run(&self, resource: &Resource) -> NodeResult {
        let started = Instant::now();
        let (status, message) = match resource.kind {
            ResourceKind::Model => self.run_model(resource).await,
            ResourceKind::Test => self.run_test(resource).await,
            ResourceKind::Seed => self.run_seed(resource).await,
            ResourceKind::Snapshot => self.run_snapshot(resource).await,
            // Declaration-only kinds are filtered out by the scheduler.
            ResourceKind::Source | ResourceKind::Exposure => (NodeStatus::Success, None),
        };
        NodeResult::new(
            resource.unique_id.clone(),
            status,
            message,
            started.elapsed().as_secs_f64(),
        )
    }
}

#[cfg(test)]
#[path = "runners_test.rs"]
mod tests;
