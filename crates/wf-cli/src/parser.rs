//! Turning source files into resources.
//!
//! One file parses to zero or more resources: a model SQL file yields one
//! model, a properties YAML yields the tests/sources/exposures it
//! declares, a seed CSV (with its optional sibling YAML) yields one seed,
//! and a snapshot YAML yields its snapshots.
//!
//! SQL render failures (including undefined env vars) keep the resource in
//! the manifest as a disabled-for-execution stub carrying the error, so
//! the scheduler can pre-mark it and skip its dependents while unrelated
//! resources proceed. YAML-level failures are hard errors: there is no
//! stable resource identity to attach a stub to.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use wf_core::error::{CoreError, CoreResult};
use wf_core::project::{FileKind, Project, SourceFileInfo};
use wf_core::resource::{
    Materialization, Resource, ResourceKind, SeedDetails, SnapshotDetails, SnapshotStrategy,
    SourceDetails, TestDetails,
};
use wf_core::testing::{parse_test_definition, TestDefinition, TestKind, TestSeverity};
use wf_core::unique_id::{ResourceName, UniqueId};
use wf_jinja::{JinjaError, JinjaRenderer, MacroRegistry, Rendered};

/// Parser context shared across all files of one load.
pub(crate) struct FileParser<'a, 'env> {
    pub project: &'a Project,
    pub renderer: &'a JinjaRenderer<'env>,
    pub registry: &'a MacroRegistry,
    pub env: &'a BTreeMap<String, String>,
}

/// What parsing one file produced.
#[derive(Debug, Default)]
pub(crate) struct ParsedFile {
    /// Resources declared in the file (stubs included)
    pub resources: Vec<Resource>,

    /// Env var name -> value observed while parsing this file
    pub observed_env: BTreeMap<String, String>,

    /// Whether any resource in the file failed to render
    pub failed: bool,
}

impl<'a, 'env> FileParser<'a, 'env> {
    fn project_name(&self) -> &str {
        &self.project.config.name
    }

    /// Parse one discovered file into resources.
    pub fn parse_file(&self, file: &SourceFileInfo) -> CoreResult<ParsedFile> {
        match file.kind {
            FileKind::ModelSql => self.parse_model(file),
            FileKind::PropertiesYaml => self.parse_properties(file),
            FileKind::SeedCsv => self.parse_seed(file),
            // Seed YAML is folded into its sibling CSV by the loader.
            FileKind::SeedYaml => Ok(ParsedFile::default()),
            FileKind::SnapshotYaml => self.parse_snapshots(file),
            FileKind::TestSql => self.parse_singular_test(file),
            // Macro files define no resources; the registry handles them.
            FileKind::MacroSql => Ok(ParsedFile::default()),
        }
    }

    fn parse_model(&self, file: &SourceFileInfo) -> CoreResult<ParsedFile> {
        let name = file_stem(&file.path)?;
        let raw = self.project.read_file(&file.path)?;
        let unique_id = UniqueId::from_parts(ResourceKind::Model, self.project_name(), &name);
        let mut resource = Resource::new(
            unique_id,
            ResourceName::new(&name),
            ResourceKind::Model,
            file.path.clone(),
            raw.clone(),
        );
        resource.macros = self.registry.macros_used(&raw);

        let mut out = ParsedFile::default();
        match self.renderer.render(&raw) {
            Ok(rendered) => {
                self.record_env(&rendered, &mut out);
                resource.refs = dedup_names(&rendered.refs);
                resource.sources = dedup_pairs(&rendered.sources);
                resource.env_vars = rendered.env_vars.clone();
                apply_model_config(&mut resource, &rendered);
                resource.schema = resource
                    .schema
                    .take()
                    .or_else(|| self.project.config.schema.clone());
            }
            Err(err) => {
                out.failed = true;
                resource.parse_error = Some(self.render_error(&resource.unique_id, err));
            }
        }

        out.resources.push(resource);
        Ok(out)
    }

    fn parse_properties(&self, file: &SourceFileInfo) -> CoreResult<ParsedFile> {
        let raw = self.project.read_file(&file.path)?;
        let mut out = ParsedFile::default();

        // Properties files may use env_var()/var(); render before the YAML
        // parse. A missing env var here is a hard error: the file's
        // resource identities are unknowable without its contents.
        let rendered = self.renderer.render(&raw).map_err(|err| match err {
            JinjaError::UndefinedEnvVar { name } => CoreError::UndefinedEnvVar {
                resource: file.path.display().to_string(),
                var: name,
            },
            other => CoreError::ResourceParseError {
                resource: file.path.display().to_string(),
                message: other.to_string(),
            },
        })?;
        self.record_env(&rendered, &mut out);

        let props: PropertiesFile = serde_yaml::from_str(&rendered.sql)?;

        for model in &props.models {
            for column in &model.columns {
                for def in &column.tests {
                    let Some((kind, severity)) = parse_test_definition(def) else {
                        return Err(CoreError::ResourceParseError {
                            resource: file.path.display().to_string(),
                            message: format!(
                                "unknown test on {}.{}",
                                model.name, column.name
                            ),
                        });
                    };
                    out.resources.push(self.schema_test(
                        file,
                        &model.name,
                        &column.name,
                        kind,
                        severity,
                        &rendered,
                    ));
                }
            }
        }

        for source in &props.sources {
            for table in &source.tables {
                let name = format!("{}.{}", source.name, table.name);
                let unique_id =
                    UniqueId::from_parts(ResourceKind::Source, self.project_name(), &name);
                let mut resource = Resource::new(
                    unique_id,
                    ResourceName::new(&table.name),
                    ResourceKind::Source,
                    file.path.clone(),
                    String::new(),
                );
                resource.checksum = file.checksum.clone();
                resource.env_vars = rendered.env_vars.clone();
                resource.source = Some(SourceDetails {
                    source_name: source.name.clone(),
                    schema: source.schema.clone(),
                    identifier: table.identifier.clone(),
                });
                out.resources.push(resource);
            }
        }

        for exposure in &props.exposures {
            let unique_id =
                UniqueId::from_parts(ResourceKind::Exposure, self.project_name(), &exposure.name);
            let mut resource = Resource::new(
                unique_id,
                ResourceName::new(&exposure.name),
                ResourceKind::Exposure,
                file.path.clone(),
                String::new(),
            );
            resource.checksum = file.checksum.clone();
            resource.env_vars = rendered.env_vars.clone();
            resource.refs = dedup_names(&exposure.depends_on);
            out.resources.push(resource);
        }

        Ok(out)
    }

    fn schema_test(
        &self,
        file: &SourceFileInfo,
        model: &str,
        column: &str,
        kind: TestKind,
        severity: TestSeverity,
        rendered: &Rendered,
    ) -> Resource {
        let name = format!("{}_{}_{}", kind.label(), model, column);
        let unique_id = UniqueId::from_parts(ResourceKind::Test, self.project_name(), &name);
        let mut resource = Resource::new(
            unique_id,
            ResourceName::new(&name),
            ResourceKind::Test,
            file.path.clone(),
            String::new(),
        );
        resource.checksum = file.checksum.clone();
        resource.env_vars = rendered.env_vars.clone();

        let mut refs = vec![model.to_string()];
        if let TestKind::Relationships { to, .. } = &kind {
            refs.push(to.clone());
        }
        resource.refs = dedup_names(&refs);
        resource.test = Some(TestDetails {
            kind,
            severity,
            tested_node: Some(ResourceName::new(model)),
            column: Some(column.to_string()),
        });
        resource
    }

    fn parse_seed(&self, file: &SourceFileInfo) -> CoreResult<ParsedFile> {
        let name = file_stem(&file.path)?;
        let unique_id = UniqueId::from_parts(ResourceKind::Seed, self.project_name(), &name);
        let mut resource = Resource::new(
            unique_id,
            ResourceName::new(&name),
            ResourceKind::Seed,
            file.path.clone(),
            String::new(),
        );
        // The loader folds the sibling YAML into this checksum, so a config
        // change re-parses the seed just like a data change.
        resource.checksum = file.checksum.clone();

        let config_path = file.path.with_extension("yml");
        let mut details = SeedDetails::default();
        if self.project.root.join(&config_path).exists() {
            let raw = self.project.read_file(&config_path)?;
            let props: SeedPropertiesFile = serde_yaml::from_str(&raw)?;
            resource.enabled = props.enabled;
            resource.tags = props.tags;
            details.schema = props.schema.or_else(|| self.project.config.schema.clone());
            details.column_types = props.column_types;
            details.delimiter = props.delimiter;
        } else {
            details.schema = self.project.config.schema.clone();
        }
        resource.schema = details.schema.clone();
        resource.seed = Some(details);

        Ok(ParsedFile {
            resources: vec![resource],
            ..Default::default()
        })
    }

    fn parse_snapshots(&self, file: &SourceFileInfo) -> CoreResult<ParsedFile> {
        let raw = self.project.read_file(&file.path)?;
        let props: SnapshotFile = serde_yaml::from_str(&raw)?;
        let mut out = ParsedFile::default();

        for snap in &props.snapshots {
            snap.validate(&file.path)?;
            let unique_id =
                UniqueId::from_parts(ResourceKind::Snapshot, self.project_name(), &snap.name);
            let mut resource = Resource::new(
                unique_id,
                ResourceName::new(&snap.name),
                ResourceKind::Snapshot,
                file.path.clone(),
                String::new(),
            );
            resource.checksum = file.checksum.clone();
            resource.tags = snap.tags.clone();
            resource.enabled = snap.enabled;
            if let Some(ref_name) = &snap.r#ref {
                resource.refs = vec![ResourceName::new(ref_name)];
            }
            if let Some((source_name, table)) = &snap.source {
                resource.sources = vec![(source_name.clone(), table.clone())];
            }
            resource.schema = snap.schema.clone().or_else(|| self.project.config.schema.clone());
            resource.snapshot = Some(SnapshotDetails {
                unique_key: snap.unique_key.clone(),
                strategy: snap.strategy,
                updated_at: snap.updated_at.clone(),
                check_cols: snap.check_cols.clone(),
                schema: resource.schema.clone(),
                relation: snap.relation.clone(),
            });
            out.resources.push(resource);
        }

        Ok(out)
    }

    fn parse_singular_test(&self, file: &SourceFileInfo) -> CoreResult<ParsedFile> {
        let name = file_stem(&file.path)?;
        let raw = self.project.read_file(&file.path)?;
        let unique_id = UniqueId::from_parts(ResourceKind::Test, self.project_name(), &name);
        let mut resource = Resource::new(
            unique_id,
            ResourceName::new(&name),
            ResourceKind::Test,
            file.path.clone(),
            raw.clone(),
        );
        resource.macros = self.registry.macros_used(&raw);

        let mut out = ParsedFile::default();
        let mut severity = TestSeverity::Error;
        match self.renderer.render(&raw) {
            Ok(rendered) => {
                self.record_env(&rendered, &mut out);
                resource.refs = dedup_names(&rendered.refs);
                resource.sources = dedup_pairs(&rendered.sources);
                resource.env_vars = rendered.env_vars.clone();
                if let Some(value) = rendered.config.get("severity").and_then(|v| v.as_str()) {
                    if value.eq_ignore_ascii_case("warn") {
                        severity = TestSeverity::Warn;
                    }
                }
                if let Some(tags) = rendered.config.get("tags") {
                    resource.tags = capture_tags(tags);
                }
            }
            Err(err) => {
                out.failed = true;
                resource.parse_error = Some(self.render_error(&resource.unique_id, err));
            }
        }
        resource.test = Some(TestDetails {
            kind: TestKind::Singular,
            severity,
            tested_node: None,
            column: None,
        });

        out.resources.push(resource);
        Ok(out)
    }

    fn record_env(&self, rendered: &Rendered, out: &mut ParsedFile) {
        for var in &rendered.env_vars {
            if let Some(value) = self.env.get(var) {
                out.observed_env.insert(var.clone(), value.clone());
            }
        }
    }

    fn render_error(&self, unique_id: &UniqueId, err: JinjaError) -> String {
        match err {
            JinjaError::UndefinedEnvVar { name } => CoreError::UndefinedEnvVar {
                resource: unique_id.to_string(),
                var: name,
            }
            .to_string(),
            other => other.to_string(),
        }
    }
}

/// Apply config() captures to a freshly parsed model.
fn apply_model_config(resource: &mut Resource, rendered: &Rendered) {
    let materialized = rendered
        .config
        .get("materialized")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    resource.materialization = Some(match materialized.as_deref() {
        Some("table") => Materialization::Table,
        _ => Materialization::View,
    });
    resource.schema = rendered
        .config
        .get("schema")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    if let Some(enabled) = rendered.config.get("enabled").and_then(|v| {
        if v.is_true() {
            Some(true)
        } else if *v == minijinja::Value::from(false) {
            Some(false)
        } else {
            None
        }
    }) {
        resource.enabled = enabled;
    }
    if let Some(tags) = rendered.config.get("tags") {
        resource.tags = capture_tags(tags);
    }
}

fn capture_tags(value: &minijinja::Value) -> Vec<String> {
    if let Some(s) = value.as_str() {
        return vec![s.to_string()];
    }
    value
        .try_iter()
        .map(|iter| {
            iter.filter_map(|item| item.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

fn file_stem(path: &Path) -> CoreResult<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string())
        .ok_or_else(|| CoreError::EmptyName {
            context: format!("file name in {}", path.display()),
        })
}

fn dedup_names(names: &[String]) -> Vec<ResourceName> {
    let mut seen = std::collections::BTreeSet::new();
    names
        .iter()
        .filter(|n| seen.insert(n.as_str()))
        .map(|n| ResourceName::new(n.clone()))
        .collect()
}

fn dedup_pairs(pairs: &[(String, String)]) -> Vec<(String, String)> {
    let mut seen = std::collections::BTreeSet::new();
    pairs
        .iter()
        .filter(|p| seen.insert((*p).clone()))
        .cloned()
        .collect()
}

// ── Properties file shapes ──────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PropertiesFile {
    #[serde(default)]
    #[allow(dead_code)]
    version: Option<u32>,

    #[serde(default)]
    models: Vec<ModelProperties>,

    #[serde(default)]
    sources: Vec<SourceProperties>,

    #[serde(default)]
    exposures: Vec<ExposureProperties>,
}

#[derive(Debug, Deserialize)]
struct ModelProperties {
    name: String,

    #[serde(default)]
    #[allow(dead_code)]
    description: Option<String>,

    #[serde(default)]
    columns: Vec<ColumnProperties>,
}

#[derive(Debug, Deserialize)]
struct ColumnProperties {
    name: String,

    #[serde(default)]
    #[allow(dead_code)]
    description: Option<String>,

    #[serde(default)]
    tests: Vec<TestDefinition>,
}

#[derive(Debug, Deserialize)]
struct SourceProperties {
    name: String,
    schema: String,

    #[serde(default)]
    tables: Vec<SourceTableProperties>,
}

#[derive(Debug, Deserialize)]
struct SourceTableProperties {
    name: String,

    #[serde(default)]
    identifier: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExposureProperties {
    name: String,

    #[serde(default)]
    #[allow(dead_code)]
    owner: Option<String>,

    #[serde(default)]
    #[allow(dead_code)]
    url: Option<String>,

    #[serde(default)]
    depends_on: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SeedPropertiesFile {
    #[serde(default)]
    #[allow(dead_code)]
    description: Option<String>,

    #[serde(default)]
    schema: Option<String>,

    #[serde(default)]
    column_types: BTreeMap<String, String>,

    #[serde(default = "default_delimiter")]
    delimiter: char,

    #[serde(default = "default_true")]
    enabled: bool,

    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SnapshotFile {
    snapshots: Vec<SnapshotProperties>,
}

#[derive(Debug, Deserialize)]
struct SnapshotProperties {
    name: String,

    /// Model or seed to snapshot
    #[serde(default)]
    r#ref: Option<String>,

    /// Declared source table to snapshot, as [source_name, table]
    #[serde(default)]
    source: Option<(String, String)>,

    /// External relation to snapshot
    #[serde(default)]
    relation: Option<String>,

    unique_key: Vec<String>,

    #[serde(default)]
    strategy: SnapshotStrategy,

    #[serde(default)]
    updated_at: Option<String>,

    #[serde(default)]
    check_cols: Vec<String>,

    #[serde(default)]
    schema: Option<String>,

    #[serde(default)]
    tags: Vec<String>,

    #[serde(default = "default_true")]
    enabled: bool,
}

impl SnapshotProperties {
    fn validate(&self, path: &PathBuf) -> CoreResult<()> {
        if self.unique_key.is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: format!(
                    "snapshot '{}' in {} must declare at least one unique_key column",
                    self.name,
                    path.display()
                ),
            });
        }
        let targets =
            [self.r#ref.is_some(), self.source.is_some(), self.relation.is_some()];
        if targets.iter().filter(|t| **t).count() != 1 {
            return Err(CoreError::ConfigInvalid {
                message: format!(
                    "snapshot '{}' in {} must declare exactly one of ref, source, or relation",
                    self.name,
                    path.display()
                ),
            });
        }
        match self.strategy {
            SnapshotStrategy::Timestamp if self.updated_at.is_none() => {
                Err(CoreError::ConfigInvalid {
                    message: format!(
                        "snapshot '{}' with timestamp strategy requires updated_at",
                        self.name
                    ),
                })
            }
            SnapshotStrategy::Check if self.check_cols.is_empty() => {
                Err(CoreError::ConfigInvalid {
                    message: format!(
                        "snapshot '{}' with check strategy requires check_cols",
                        self.name
                    ),
                })
            }
            _ => Ok(()),
        }
    }
}

fn default_delimiter() -> char {
    ','
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
#[path = "parser_test.rs"]
mod tests;
