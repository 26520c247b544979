//! Change detection and partial-reparse planning.
//!
//! The parse cache records, per resource, the fingerprint of its backing
//! file, the macros it used, the env vars it referenced, and its resolved
//! dependencies at last successful parse. Given the cache, the current
//! on-disk state, and the current environment, [`ReparsePlan::compute`]
//! selects the minimal set of files that must be re-parsed; every other
//! resource is carried over from the previous manifest unchanged.
//!
//! The file is the atomic unit of reparsing: when any resource in a file is
//! invalidated, the whole file is re-parsed. Env-var invalidation remains
//! resource-scoped when deciding, but widens to the file when applied.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::error::{CoreError, CoreResult};
use crate::manifest::Manifest;
use crate::project::SourceFileInfo;
use crate::unique_id::UniqueId;

/// Current cache format version. Bumping it invalidates old caches.
const CACHE_VERSION: u32 = 2;

/// Per-resource cache record, superseded wholesale on reparse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Backing file, relative to the project root
    pub path: PathBuf,

    /// Fingerprint of the backing file at last successful parse
    pub checksum: String,

    /// Macros this resource used, transitively
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub macros: BTreeSet<String>,

    /// Env var names this resource referenced
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub env_vars: BTreeSet<String>,

    /// Resolved dependency ids at last parse
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<UniqueId>,
}

/// Persisted reparse cache (target/partial_parse.json).
///
/// Read once at the start of a run, rewritten once after a successful
/// parse phase. A corrupt or absent cache degrades to "reparse
/// everything" and is never a fatal error.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ParseCache {
    /// Cache format version
    #[serde(default)]
    pub version: u32,

    /// One entry per resource
    #[serde(default)]
    pub entries: BTreeMap<UniqueId, CacheEntry>,

    /// Macro name -> fingerprint of its body at last parse
    #[serde(default)]
    pub macro_fingerprints: BTreeMap<String, String>,

    /// Env var name -> value at last parse (union across resources)
    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,

    /// Files whose parse failed last run; always re-parsed
    #[serde(default)]
    pub failed_files: BTreeSet<PathBuf>,

    /// Files that parsed cleanly but declared no resources (macro files,
    /// documentation-only YAML), with their fingerprints. Tracked so they
    /// are not mistaken for newly added files on the next run.
    #[serde(default)]
    pub resourceless_files: BTreeMap<PathBuf, String>,
}

impl ParseCache {
    /// Load the cache, degrading any problem to an empty cache.
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return Self::default(),
        };
        match serde_json::from_str::<ParseCache>(&content) {
            Ok(cache) if cache.version == CACHE_VERSION => cache,
            Ok(cache) => {
                log::warn!(
                    "discarding parse cache with version {} (current {})",
                    cache.version,
                    CACHE_VERSION
                );
                Self::default()
            }
            Err(e) => {
                log::warn!("discarding unreadable parse cache {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Save the cache atomically (write temp, then rename).
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

    /// Build the cache that supersedes this one, from the freshly merged
    /// manifest and the current macro fingerprints.
    pub fn rebuild(
        manifest: &Manifest,
        file_checksums: &BTreeMap<PathBuf, String>,
        macro_fingerprints: BTreeMap<String, String>,
        failed_files: BTreeSet<PathBuf>,
    ) -> Self {
        let mut entries = BTreeMap::new();
        for (id, resource) in &manifest.resources {
            let Some(checksum) = file_checksums.get(&resource.path) else {
                continue;
            };
            entries.insert(
                id.clone(),
                CacheEntry {
                    path: resource.path.clone(),
                    checksum: checksum.clone(),
                    macros: resource.macros.clone(),
                    env_vars: resource.env_vars.clone(),
                    depends_on: resource.depends_on.clone(),
                },
            );
        }
        let entry_paths: BTreeSet<&PathBuf> = entries.values().map(|e| &e.path).collect();
        let resourceless_files = file_checksums
            .iter()
            .filter(|(path, _)| !entry_paths.contains(path) && !failed_files.contains(*path))
            .map(|(path, checksum)| (path.clone(), checksum.clone()))
            .collect();
        Self {
            version: CACHE_VERSION,
            entries,
            macro_fingerprints,
            env_vars: manifest.env_vars.clone(),
            failed_files,
            resourceless_files,
        }
    }
}

/// Why a file was selected for reparse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReparseReason {
    /// No usable cache: parse everything
    FullReparse,
    /// File is new since the cached run
    Added,
    /// File content fingerprint drifted
    ContentChanged,
    /// A macro the file's resources used changed
    MacroChanged(String),
    /// A referenced env var changed value or became undefined
    EnvVarChanged(String),
    /// The file failed to parse last run
    PreviousFailure,
    /// A resource this file depends on was added or removed
    ResolutionChanged(String),
}

impl std::fmt::Display for ReparseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReparseReason::FullReparse => write!(f, "no usable cache"),
            ReparseReason::Added => write!(f, "file added"),
            ReparseReason::ContentChanged => write!(f, "content changed"),
            ReparseReason::MacroChanged(name) => write!(f, "macro '{}' changed", name),
            ReparseReason::EnvVarChanged(name) => write!(f, "env var '{}' changed", name),
            ReparseReason::PreviousFailure => write!(f, "previous parse failure"),
            ReparseReason::ResolutionChanged(name) => {
                write!(f, "resolution of '{}' changed", name)
            }
        }
    }
}

/// Output of change detection: which files to re-parse, which resources to
/// carry forward from the previous manifest.
#[derive(Debug, Default)]
pub struct ReparsePlan {
    /// Every file was selected (no usable cache)
    pub full: bool,

    /// Files requiring a fresh parse
    pub reparse_files: BTreeSet<PathBuf>,

    /// Resource ids safe to copy forward unchanged
    pub carry_over: Vec<UniqueId>,

    /// First invalidation reason observed per file
    pub reasons: BTreeMap<PathBuf, ReparseReason>,
}

impl ReparsePlan {
    /// Plan which files need re-parsing.
    ///
    /// `files` is the current on-disk project state, `macro_fingerprints`
    /// the current macro bodies' fingerprints, `env` the current
    /// environment snapshot.
    pub fn compute(
        cache: &ParseCache,
        files: &[SourceFileInfo],
        macro_fingerprints: &BTreeMap<String, String>,
        env: &BTreeMap<String, String>,
    ) -> Self {
        if cache.entries.is_empty() {
            let mut plan = ReparsePlan {
                full: true,
                ..Default::default()
            };
            for f in files {
                plan.reparse_files.insert(f.path.clone());
                plan.reasons
                    .insert(f.path.clone(), ReparseReason::FullReparse);
            }
            return plan;
        }

        let current: BTreeMap<&Path, &SourceFileInfo> =
            files.iter().map(|f| (f.path.as_path(), f)).collect();
        let mut known_paths: BTreeSet<&Path> =
            cache.entries.values().map(|e| e.path.as_path()).collect();
        known_paths.extend(cache.resourceless_files.keys().map(|p| p.as_path()));
        known_paths.extend(cache.failed_files.iter().map(|p| p.as_path()));

        let changed_macros = changed_macro_set(&cache.macro_fingerprints, macro_fingerprints);

        // Names whose resolution may have shifted: resources on added
        // files (possible collisions) and resources on removed files.
        let mut shifted_names: BTreeSet<String> = BTreeSet::new();
        for f in files {
            if !known_paths.contains(f.path.as_path()) {
                if let Some(stem) = f.path.file_stem().and_then(|s| s.to_str()) {
                    shifted_names.insert(stem.to_string());
                }
            }
        }
        let mut removed_ids: BTreeSet<&UniqueId> = BTreeSet::new();
        for (id, entry) in &cache.entries {
            if !current.contains_key(entry.path.as_path()) {
                removed_ids.insert(id);
                shifted_names.insert(id.name().to_string());
            }
        }

        let mut plan = ReparsePlan::default();
        let mut invalidate = |path: &Path, reason: ReparseReason, plan: &mut ReparsePlan| {
            if plan.reparse_files.insert(path.to_path_buf()) {
                plan.reasons.insert(path.to_path_buf(), reason);
            }
        };

        // Files that failed last run always re-parse.
        for path in &cache.failed_files {
            if current.contains_key(path.as_path()) {
                invalidate(path, ReparseReason::PreviousFailure, &mut plan);
            }
        }

        // New files always parse.
        for f in files {
            if !known_paths.contains(f.path.as_path()) {
                invalidate(&f.path, ReparseReason::Added, &mut plan);
            }
        }

        // Resourceless files re-parse on content change: they may have
        // gained their first resource.
        for (path, checksum) in &cache.resourceless_files {
            if let Some(file) = current.get(path.as_path()) {
                if file.checksum != *checksum {
                    invalidate(path, ReparseReason::ContentChanged, &mut plan);
                }
            }
        }

        for (id, entry) in &cache.entries {
            if removed_ids.contains(id) {
                continue;
            }
            let Some(file) = current.get(entry.path.as_path()) else {
                continue;
            };

            // (a) content fingerprint drift
            if file.checksum != entry.checksum {
                invalidate(&entry.path, ReparseReason::ContentChanged, &mut plan);
                continue;
            }

            // (b) any macro the resource transitively used changed
            if let Some(m) = entry.macros.intersection(&changed_macros).next() {
                invalidate(
                    &entry.path,
                    ReparseReason::MacroChanged(m.clone()),
                    &mut plan,
                );
                continue;
            }

            // (c) referenced env vars: changed value or now undefined.
            // Scoped to this resource, not to the whole file's env usage.
            if let Some(var) = entry
                .env_vars
                .iter()
                .find(|var| env.get(*var) != cache.env_vars.get(*var) || !env.contains_key(*var))
            {
                invalidate(
                    &entry.path,
                    ReparseReason::EnvVarChanged(var.clone()),
                    &mut plan,
                );
                continue;
            }

            // (e) namespace resolution shifts: a dependency was removed, or
            // an added file's name collides with one of this resource's deps
            if let Some(dep) = entry
                .depends_on
                .iter()
                .find(|dep| shifted_names.contains(dep.name()))
            {
                invalidate(
                    &entry.path,
                    ReparseReason::ResolutionChanged(dep.name().to_string()),
                    &mut plan,
                );
            }
        }

        // Carry over every resource whose file survived unscathed.
        for (id, entry) in &cache.entries {
            if removed_ids.contains(id) {
                continue;
            }
            if !plan.reparse_files.contains(&entry.path) {
                plan.carry_over.push(id.clone());
            }
        }

        plan
    }
}

/// Macros whose fingerprint changed, plus added and removed macros.
fn changed_macro_set(
    cached: &BTreeMap<String, String>,
    current: &BTreeMap<String, String>,
) -> BTreeSet<String> {
    let mut changed = BTreeSet::new();
    for (name, fp) in current {
        if cached.get(name) != Some(fp) {
            changed.insert(name.clone());
        }
    }
    for name in cached.keys() {
        if !current.contains_key(name) {
            changed.insert(name.clone());
        }
    }
    changed
}

#[cfg(test)]
#[path = "partial_test.rs"]
mod tests;
