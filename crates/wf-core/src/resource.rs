//! Parsed resource definitions.
//!
//! A [`Resource`] is one unit of work in the project: a model, test, seed,
//! snapshot, source, or exposure. Resources are produced by the parse phase
//! (or carried over from the previous manifest by the change detector) and
//! collected into a [`Manifest`](crate::manifest::Manifest).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::testing::{TestKind, TestSeverity};
use crate::unique_id::{ResourceName, UniqueId};

/// Canonical resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// SQL transformation model
    Model,
    /// Schema or singular data test
    Test,
    /// CSV seed data
    Seed,
    /// SCD Type 2 snapshot
    Snapshot,
    /// External data source definition
    Source,
    /// Downstream exposure (dashboard, report)
    Exposure,
}

impl ResourceKind {
    /// Parse the lowercase kind segment of a unique id.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "model" => Some(ResourceKind::Model),
            "test" => Some(ResourceKind::Test),
            "seed" => Some(ResourceKind::Seed),
            "snapshot" => Some(ResourceKind::Snapshot),
            "source" => Some(ResourceKind::Source),
            "exposure" => Some(ResourceKind::Exposure),
            _ => None,
        }
    }

    /// Whether resources of this kind execute SQL against the warehouse.
    ///
    /// Sources and exposures are declaration-only: they participate in the
    /// graph but are never scheduled.
    pub fn is_executable(&self) -> bool {
        !matches!(self, ResourceKind::Source | ResourceKind::Exposure)
    }

    /// Human-readable label for error messages and display.
    pub fn label(&self) -> &'static str {
        match self {
            ResourceKind::Model => "model",
            ResourceKind::Test => "test",
            ResourceKind::Seed => "seed",
            ResourceKind::Snapshot => "snapshot",
            ResourceKind::Source => "source",
            ResourceKind::Exposure => "exposure",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// How a model is materialized in the warehouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Materialization {
    /// CREATE OR REPLACE VIEW (default)
    #[default]
    View,
    /// CREATE OR REPLACE TABLE
    Table,
}

impl std::fmt::Display for Materialization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Materialization::View => write!(f, "view"),
            Materialization::Table => write!(f, "table"),
        }
    }
}

/// Test-specific resource details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestDetails {
    /// What the test asserts
    pub kind: TestKind,

    /// Failure severity: `error` blocks dependents, `warn` does not
    #[serde(default)]
    pub severity: TestSeverity,

    /// Name of the model (or seed/snapshot) under test, when schema-generated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tested_node: Option<ResourceName>,

    /// Column under test, when schema-generated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
}

/// Seed-specific resource details.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SeedDetails {
    /// Target schema override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Override inferred types for specific columns
    #[serde(default, skip_serializing_if = "std::collections::BTreeMap::is_empty")]
    pub column_types: std::collections::BTreeMap<String, String>,

    /// CSV delimiter
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

fn default_delimiter() -> char {
    ','
}

/// Strategy for detecting changed rows in snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotStrategy {
    /// Detect changes using an update timestamp column
    #[default]
    Timestamp,
    /// Detect changes by comparing specific columns
    Check,
}

impl std::fmt::Display for SnapshotStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotStrategy::Timestamp => write!(f, "timestamp"),
            SnapshotStrategy::Check => write!(f, "check"),
        }
    }
}

/// Snapshot-specific resource details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotDetails {
    /// Column(s) that uniquely identify a record
    pub unique_key: Vec<String>,

    /// Change detection strategy
    #[serde(default)]
    pub strategy: SnapshotStrategy,

    /// Update timestamp column (timestamp strategy)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,

    /// Columns compared for changes (check strategy)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub check_cols: Vec<String>,

    /// Target schema override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// External relation to snapshot, for tables not managed by the
    /// project. Unset when the snapshot refs a model or source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
}

/// Source-specific resource details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDetails {
    /// Source group name (the first argument to `source()`)
    pub source_name: String,

    /// Warehouse schema the source table lives in
    pub schema: String,

    /// Physical table name, when different from the declared name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
}

impl SourceDetails {
    /// Fully-qualified relation name for this source table.
    pub fn relation(&self, declared_name: &str) -> String {
        let table = self.identifier.as_deref().unwrap_or(declared_name);
        format!("{}.{}", self.schema, table)
    }
}

/// A parsed unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    /// Stable namespace-qualified id
    pub unique_id: UniqueId,

    /// Bare declared name
    pub name: ResourceName,

    /// Resource kind
    pub kind: ResourceKind,

    /// Source file path, relative to the project root
    pub path: PathBuf,

    /// SHA-256 of the raw source text
    pub checksum: String,

    /// Raw (unrendered) source text; empty for declaration-only kinds
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub raw_sql: String,

    /// Symbolic `ref()` targets captured at parse time, by name
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub refs: Vec<ResourceName>,

    /// Symbolic `source()` targets captured at parse time
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<(String, String)>,

    /// Resolved dependency ids, filled by the graph builder
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<UniqueId>,

    /// Environment variable names consumed while parsing this resource
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub env_vars: BTreeSet<String>,

    /// Macros this resource's source text uses (transitively)
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub macros: BTreeSet<String>,

    /// Compiled SQL, None until the compile step has run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compiled_sql: Option<String>,

    /// Refreshed only when the resource is actually re-parsed
    pub created_at: DateTime<Utc>,

    /// Disabled resources stay in the manifest but are never scheduled
    #[serde(default = "crate::serde_helpers::default_true")]
    pub enabled: bool,

    /// Tags for selection
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Model materialization (models only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub materialization: Option<Materialization>,

    /// Target schema (models only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Test details (tests only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<TestDetails>,

    /// Seed details (seeds only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<SeedDetails>,

    /// Snapshot details (snapshots only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<SnapshotDetails>,

    /// Source details (sources only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceDetails>,

    /// Render/parse error recorded for this resource, if any.
    ///
    /// A resource with a parse error stays in the manifest as a stub so the
    /// scheduler can pre-mark it `error` and skip its dependents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
}

impl Resource {
    /// Minimal constructor; kind-specific details are set by the parser.
    pub fn new(
        unique_id: UniqueId,
        name: ResourceName,
        kind: ResourceKind,
        path: PathBuf,
        raw_sql: String,
    ) -> Self {
        let checksum = crate::checksum::compute_checksum(&raw_sql);
        Self {
            unique_id,
            name,
            kind,
            path,
            checksum,
            raw_sql,
            refs: Vec::new(),
            sources: Vec::new(),
            depends_on: Vec::new(),
            env_vars: BTreeSet::new(),
            macros: BTreeSet::new(),
            compiled_sql: None,
            created_at: Utc::now(),
            enabled: true,
            tags: Vec::new(),
            materialization: None,
            schema: None,
            test: None,
            seed: None,
            snapshot: None,
            source: None,
            parse_error: None,
        }
    }

    /// The relation this resource materializes as, when it has one.
    ///
    /// Models, seeds, and snapshots produce relations named after the
    /// resource; sources map to their declared schema/identifier; tests and
    /// exposures produce nothing.
    pub fn relation_name(&self) -> Option<String> {
        match self.kind {
            ResourceKind::Model | ResourceKind::Seed | ResourceKind::Snapshot => {
                Some(match &self.schema {
                    Some(s) => format!("{}.{}", s, self.name),
                    None => self.name.to_string(),
                })
            }
            ResourceKind::Source => self.source.as_ref().map(|s| s.relation(&self.name)),
            ResourceKind::Test | ResourceKind::Exposure => None,
        }
    }

    /// Whether the test on this resource blocks dependents on failure.
    pub fn is_blocking_test(&self) -> bool {
        matches!(
            self.test,
            Some(TestDetails {
                severity: TestSeverity::Error,
                ..
            })
        )
    }
}

#[cfg(test)]
#[path = "resource_test.rs"]
mod tests;
