//! The resource store: all parsed resources for one run.
//!
//! A manifest is built fresh each invocation by merging carried-over
//! resources (cache hits) with freshly parsed ones. Once the graph builder
//! has run it is treated as immutable and may be shared freely across
//! worker threads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{CoreError, CoreResult};
use crate::resource::{Resource, ResourceKind};
use crate::unique_id::UniqueId;

/// The full set of resources for one run, plus the env-var values observed
/// while parsing them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Project name from wrenflow.yml
    pub project_name: String,

    /// When this manifest was assembled
    pub generated_at: DateTime<Utc>,

    /// All resources, keyed by unique id
    pub resources: BTreeMap<UniqueId, Resource>,

    /// Environment variable name -> value actually observed this run.
    ///
    /// The union of all variables referenced by any resource; used for
    /// cache invalidation and reproducibility reporting.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env_vars: BTreeMap<String, String>,
}

impl Manifest {
    /// Create an empty manifest for a project.
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            generated_at: Utc::now(),
            resources: BTreeMap::new(),
            env_vars: BTreeMap::new(),
        }
    }

    /// Insert a resource, rejecting duplicate ids.
    pub fn insert(&mut self, resource: Resource) -> CoreResult<()> {
        if let Some(existing) = self.resources.get(&resource.unique_id) {
            return Err(CoreError::DuplicateResource {
                unique_id: resource.unique_id.to_string(),
                path1: existing.path.display().to_string(),
                path2: resource.path.display().to_string(),
            });
        }
        self.resources.insert(resource.unique_id.clone(), resource);
        Ok(())
    }

    /// Look up a resource by id.
    pub fn get(&self, id: &UniqueId) -> Option<&Resource> {
        self.resources.get(id)
    }

    /// Resolve a `ref('name')` target against models, seeds, and snapshots.
    ///
    /// Refs are unqualified by kind, so the referenceable namespaces are
    /// searched in a fixed order; duplicate names across those kinds are
    /// rejected at insert time by id, and by the project loader by name.
    pub fn resolve_ref(&self, name: &str) -> Option<&Resource> {
        for kind in [
            ResourceKind::Model,
            ResourceKind::Seed,
            ResourceKind::Snapshot,
        ] {
            let id = UniqueId::from_parts(kind, &self.project_name, name);
            if let Some(r) = self.resources.get(&id) {
                return Some(r);
            }
        }
        None
    }

    /// Resolve a `source('source_name', 'table')` target.
    pub fn resolve_source(&self, source_name: &str, table: &str) -> Option<&Resource> {
        let id = UniqueId::from_parts(
            ResourceKind::Source,
            &self.project_name,
            &format!("{}.{}", source_name, table),
        );
        self.resources.get(&id)
    }

    /// All resources of a given kind, in id order.
    pub fn resources_of_kind(&self, kind: ResourceKind) -> impl Iterator<Item = &Resource> {
        self.resources.values().filter(move |r| r.kind == kind)
    }

    /// Record an observed env-var value.
    pub fn record_env_var(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.env_vars.insert(name.into(), value.into());
    }

    /// Load a manifest artifact from a file path, if present.
    pub fn load(path: &Path) -> CoreResult<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        let manifest: Manifest = serde_json::from_str(&content)?;
        Ok(Some(manifest))
    }

    /// Save the manifest artifact atomically (write temp, then rename).
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
#[path = "manifest_test.rs"]
mod tests;
