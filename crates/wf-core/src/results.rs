//! Per-resource outcomes and run-level aggregation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{CoreError, CoreResult};
use crate::manifest::Manifest;
use crate::resource::ResourceKind;
use crate::unique_id::UniqueId;

/// Terminal outcome of one resource.
///
/// Assigned exactly once per resource per run; a resource never
/// transitions after reaching one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// Model/seed/snapshot built successfully
    Success,
    /// Execution or compilation raised an error
    Error,
    /// Blocking test found violating rows
    Fail,
    /// Test found no violating rows
    Pass,
    /// Warn-severity test found violating rows; never blocks
    Warn,
    /// Not executed because an upstream resource errored or failed
    Skipped,
}

impl NodeStatus {
    /// Whether this outcome fails the run and blocks dependents.
    pub fn is_failure(&self) -> bool {
        matches!(self, NodeStatus::Error | NodeStatus::Fail)
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeStatus::Success => write!(f, "success"),
            NodeStatus::Error => write!(f, "error"),
            NodeStatus::Fail => write!(f, "fail"),
            NodeStatus::Pass => write!(f, "pass"),
            NodeStatus::Warn => write!(f, "warn"),
            NodeStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Outcome of a single resource, produced exactly once by the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeResult {
    /// Resource id
    pub unique_id: UniqueId,

    /// Terminal status
    pub status: NodeStatus,

    /// Error/failure detail, when there is one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Wall-clock execution time in seconds (0 for skipped resources)
    pub execution_time: f64,

    /// When the result was recorded
    pub completed_at: DateTime<Utc>,
}

impl NodeResult {
    /// Build a result with the current timestamp.
    pub fn new(
        unique_id: UniqueId,
        status: NodeStatus,
        message: Option<String>,
        execution_time: f64,
    ) -> Self {
        Self {
            unique_id,
            status,
            message,
            execution_time,
            completed_at: Utc::now(),
        }
    }

    /// A skip recorded without ever invoking the resource's callback.
    pub fn skipped(unique_id: UniqueId, reason: impl Into<String>) -> Self {
        Self::new(unique_id, NodeStatus::Skipped, Some(reason.into()), 0.0)
    }
}

/// Aggregated outcome of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// Unique id for this invocation
    pub invocation_id: String,

    /// When the run finished
    pub generated_at: DateTime<Utc>,

    /// Total wall-clock time in seconds
    pub elapsed: f64,

    /// One result per resource, sorted by unique id for deterministic
    /// reporting regardless of completion order
    pub results: Vec<NodeResult>,
}

impl RunResult {
    /// Assemble a run result, sorting per-resource results by id.
    pub fn new(mut results: Vec<NodeResult>, elapsed: f64) -> Self {
        results.sort_by(|a, b| a.unique_id.cmp(&b.unique_id));
        Self {
            invocation_id: uuid::Uuid::new_v4().to_string(),
            generated_at: Utc::now(),
            elapsed,
            results,
        }
    }

    /// Count of results per status.
    pub fn status_counts(&self) -> BTreeMap<NodeStatus, usize> {
        let mut counts = BTreeMap::new();
        for r in &self.results {
            *counts.entry(r.status).or_insert(0) += 1;
        }
        counts
    }

    /// Count of results per resource kind, resolved against the manifest.
    pub fn kind_counts(&self, manifest: &Manifest) -> BTreeMap<ResourceKind, usize> {
        let mut counts = BTreeMap::new();
        for r in &self.results {
            if let Some(resource) = manifest.get(&r.unique_id) {
                *counts.entry(resource.kind).or_insert(0) += 1;
            }
        }
        counts
    }

    /// The run succeeds iff no result is an error or a fail.
    pub fn success(&self) -> bool {
        self.results.iter().all(|r| !r.status.is_failure())
    }

    /// Process exit status: 0 for success, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.success() {
            0
        } else {
            1
        }
    }

    /// Save the run-results artifact atomically.
    pub fn save(&self, path: &Path) -> CoreResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::IoWithPath {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        let temp_path = path.with_extension(format!("json.{}.tmp", std::process::id()));
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&temp_path, &json).map_err(|e| CoreError::IoWithPath {
            path: temp_path.display().to_string(),
            source: e,
        })?;
        std::fs::rename(&temp_path, path).map_err(|e| {
            let _ = std::fs::remove_file(&temp_path);
            CoreError::IoWithPath {
                path: path.display().to_string(),
                source: e,
            }
        })?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "results_test.rs"]
mod tests;
