//! Project loading: change detection, parsing, and graph assembly.
//!
//! One call to [`load_project`] performs a full parse cycle: discover
//! files, consult the reparse cache, freshly parse only the invalidated
//! files, carry everything else over from the previous manifest, resolve
//! the graph, and persist the superseding cache and manifest artifacts.
//!
//! All inputs are explicit - including the environment snapshot - so
//! multiple loads can coexist in one process and tests can drive the
//! cache without touching process state.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use wf_core::checksum::compute_checksum;
use wf_core::error::CoreResult;
use wf_core::graph::Graph;
use wf_core::manifest::Manifest;
use wf_core::partial::{ParseCache, ReparsePlan};
use wf_core::project::{FileKind, Project, SourceFileInfo};
use wf_jinja::{JinjaRenderer, MacroRegistry, RendererOptions};

use crate::cli::GlobalArgs;
use crate::parser::FileParser;

/// Names of the persisted artifacts under the target directory.
pub(crate) const MANIFEST_FILE: &str = "manifest.json";
pub(crate) const PARTIAL_PARSE_FILE: &str = "partial_parse.json";
pub(crate) const RUN_RESULTS_FILE: &str = "run_results.json";
pub(crate) const COMPILED_DIR: &str = "compiled";

/// Inputs controlling one load.
#[derive(Debug, Clone, Default)]
pub(crate) struct LoaderOptions {
    /// Skip the cache entirely and parse every file
    pub no_partial_parse: bool,

    /// Named target override
    pub target: Option<String>,

    /// JSON vars override merged over wrenflow.yml vars
    pub vars: Option<String>,

    /// Environment snapshot for env_var() and cache invalidation
    pub env: BTreeMap<String, String>,
}

impl LoaderOptions {
    /// Build options from CLI args, snapshotting the process environment.
    pub fn from_cli(global: &GlobalArgs, vars: Option<&String>) -> Self {
        Self {
            no_partial_parse: global.no_partial_parse,
            target: global.target.clone(),
            vars: vars.cloned(),
            env: std::env::vars().collect(),
        }
    }
}

/// A fully loaded project: immutable manifest, resolved graph, and the
/// context later phases need.
#[derive(Debug)]
pub(crate) struct LoadedProject {
    pub project: Project,
    pub manifest: Arc<Manifest>,
    pub graph: Graph,
    pub macro_prelude: String,
    pub env: BTreeMap<String, String>,

    /// Files freshly parsed this load
    pub reparsed: usize,

    /// Resources carried over from the previous manifest
    pub reused: usize,
}

impl LoadedProject {
    /// Absolute path of an artifact under the target directory.
    pub fn artifact_path(&self, name: &str) -> PathBuf {
        self.project.target_path().join(name)
    }
}

/// Run a full parse cycle for the project at `root`.
pub(crate) fn load_project(root: &Path, opts: &LoaderOptions) -> CoreResult<LoadedProject> {
    let mut project = Project::load(root)?;
    if let Some(target) = &opts.target {
        project.config = project.config.with_target(target)?;
    }
    if let Some(vars_json) = &opts.vars {
        merge_vars(&mut project.config.vars, vars_json)?;
    }

    let mut files = project.discover()?;
    fold_seed_configs(&mut files);

    let macro_files: Vec<(PathBuf, String)> = files
        .iter()
        .filter(|f| f.kind == FileKind::MacroSql)
        .map(|f| Ok((f.path.clone(), project.read_file(&f.path)?)))
        .collect::<CoreResult<_>>()?;
    let registry = MacroRegistry::from_files(&macro_files);

    let target_dir = project.target_path();
    let prior_manifest = Manifest::load(&target_dir.join(MANIFEST_FILE))?;
    let cache = if opts.no_partial_parse || prior_manifest.is_none() {
        ParseCache::default()
    } else {
        ParseCache::load(&target_dir.join(PARTIAL_PARSE_FILE))
    };

    let plan = ReparsePlan::compute(&cache, &files, registry.fingerprints(), &opts.env);
    log::debug!(
        "reparse plan: {} files to parse, {} resources carried over",
        plan.reparse_files.len(),
        plan.carry_over.len()
    );
    for (path, reason) in &plan.reasons {
        log::debug!("reparsing {}: {}", path.display(), reason);
    }

    let renderer = JinjaRenderer::new(RendererOptions {
        vars: project.config.vars.clone(),
        env: opts.env.clone(),
        ref_relations: None,
        source_relations: None,
        macro_prelude: registry.prelude().to_string(),
    });
    let file_parser = FileParser {
        project: &project,
        renderer: &renderer,
        registry: &registry,
        env: &opts.env,
    };

    let mut manifest = Manifest::new(&project.config.name);
    let mut failed_files: BTreeSet<PathBuf> = BTreeSet::new();

    for file in &files {
        if !plan.reparse_files.contains(&file.path) {
            continue;
        }
        let parsed = file_parser.parse_file(file)?;
        if parsed.failed {
            failed_files.insert(file.path.clone());
        }
        for (var, value) in parsed.observed_env {
            manifest.record_env_var(var, value);
        }
        for resource in parsed.resources {
            manifest.insert(resource)?;
        }
    }

    let mut reused = 0usize;
    if let Some(prior) = &prior_manifest {
        for id in &plan.carry_over {
            let Some(resource) = prior.resources.get(id) else {
                // Cache and prior manifest disagree; safest is a fresh
                // parse next run via the failed-files channel.
                log::warn!("cache entry {} missing from prior manifest", id);
                continue;
            };
            let mut resource = resource.clone();
            resource.compiled_sql = None;
            for var in &resource.env_vars {
                if let Some(value) = opts.env.get(var) {
                    manifest.record_env_var(var.clone(), value.clone());
                }
            }
            manifest.insert(resource)?;
            reused += 1;
        }
    }

    let graph = Graph::build(&mut manifest)?;

    let reparsed = plan.reparse_files.len();
    let next_cache = ParseCache::rebuild(
        &manifest,
        &Project::file_checksums(&files),
        registry.fingerprints().clone(),
        failed_files,
    );
    next_cache.save(&target_dir.join(PARTIAL_PARSE_FILE))?;
    manifest.save(&target_dir.join(MANIFEST_FILE))?;

    Ok(LoadedProject {
        project,
        manifest: Arc::new(manifest),
        graph,
        macro_prelude: registry.prelude().to_string(),
        env: opts.env.clone(),
        reparsed,
        reused,
    })
}

/// Fold each seed's 1:1 config YAML into the CSV's fingerprint so the
/// change detector treats the pair as one logical file, then drop the
/// YAML from the plan input.
fn fold_seed_configs(files: &mut Vec<SourceFileInfo>) {
    let yml_checksums: BTreeMap<PathBuf, String> = files
        .iter()
        .filter(|f| f.kind == FileKind::SeedYaml)
        .map(|f| (f.path.clone(), f.checksum.clone()))
        .collect();

    for file in files.iter_mut() {
        if file.kind != FileKind::SeedCsv {
            continue;
        }
        let sibling = file.path.with_extension("yml");
        if let Some(yml_checksum) = yml_checksums.get(&sibling) {
            file.checksum = compute_checksum(&format!("{}{}", file.checksum, yml_checksum));
        }
    }

    files.retain(|f| f.kind != FileKind::SeedYaml);
}

/// Merge a JSON vars override into the project vars.
fn merge_vars(
    vars: &mut std::collections::HashMap<String, serde_yaml::Value>,
    vars_json: &str,
) -> CoreResult<()> {
    let parsed: serde_json::Map<String, serde_json::Value> = serde_json::from_str(vars_json)?;
    for (key, value) in parsed {
        let yaml = serde_yaml::to_value(&value)?;
        vars.insert(key, yaml);
    }
    Ok(())
}

#[cfg(test)]
#[path = "loader_test.rs"]
mod tests;
