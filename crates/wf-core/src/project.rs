//! Project discovery: locating and fingerprinting source files.
//!
//! Discovery only reads directory structure and file bytes; turning files
//! into resources is the parser's job (wf-cli), and deciding which files
//! need parsing at all is the change detector's ([`crate::partial`]).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::checksum::compute_checksum;
use crate::config::Config;
use crate::error::{CoreError, CoreResult};

/// Role a discovered file plays in the project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    /// Model SQL under a model path
    ModelSql,
    /// schema.yml-style properties file under a model path (tests, sources, exposures)
    PropertiesYaml,
    /// Seed CSV under a seed path
    SeedCsv,
    /// 1:1 seed config YAML
    SeedYaml,
    /// Snapshot definition YAML under a snapshot path
    SnapshotYaml,
    /// Singular test SQL under a test path
    TestSql,
    /// Macro SQL under a macro path
    MacroSql,
}

/// A discovered source file with its content fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFileInfo {
    /// Path relative to the project root
    pub path: PathBuf,

    /// What the file is
    pub kind: FileKind,

    /// SHA-256 of the file contents
    pub checksum: String,
}

/// A project rooted at a directory containing wrenflow.yml.
#[derive(Debug)]
pub struct Project {
    /// Absolute project root
    pub root: PathBuf,

    /// Parsed configuration
    pub config: Config,
}

impl Project {
    /// Load the project at `root`, reading wrenflow.yml.
    pub fn load(root: &Path) -> CoreResult<Self> {
        if !root.is_dir() {
            return Err(CoreError::ProjectNotFound {
                path: root.display().to_string(),
            });
        }
        let config = Config::load(&root.join("wrenflow.yml"))?;
        Ok(Self {
            root: root.to_path_buf(),
            config,
        })
    }

    /// Discover every source file the project declares, with fingerprints.
    ///
    /// Returned paths are relative to the project root and sorted, so the
    /// same tree always yields the same listing.
    pub fn discover(&self) -> CoreResult<Vec<SourceFileInfo>> {
        let mut files = Vec::new();

        for dir in &self.config.model_paths {
            self.walk(dir, &mut |_, ext| match ext {
                "sql" => Some(FileKind::ModelSql),
                "yml" | "yaml" => Some(FileKind::PropertiesYaml),
                _ => None,
            }, &mut files)?;
        }
        for dir in &self.config.seed_paths {
            self.walk(dir, &mut |_, ext| match ext {
                "csv" => Some(FileKind::SeedCsv),
                "yml" | "yaml" => Some(FileKind::SeedYaml),
                _ => None,
            }, &mut files)?;
        }
        for dir in &self.config.snapshot_paths {
            self.walk(dir, &mut |_, ext| match ext {
                "yml" | "yaml" => Some(FileKind::SnapshotYaml),
                _ => None,
            }, &mut files)?;
        }
        for dir in &self.config.test_paths {
            self.walk(dir, &mut |_, ext| match ext {
                "sql" => Some(FileKind::TestSql),
                _ => None,
            }, &mut files)?;
        }
        for dir in &self.config.macro_paths {
            self.walk(dir, &mut |_, ext| match ext {
                "sql" => Some(FileKind::MacroSql),
                _ => None,
            }, &mut files)?;
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    /// Read a project-relative file to a string.
    pub fn read_file(&self, rel: &Path) -> CoreResult<String> {
        std::fs::read_to_string(self.root.join(rel)).map_err(|e| CoreError::IoWithPath {
            path: rel.display().to_string(),
            source: e,
        })
    }

    /// File checksums keyed by project-relative path.
    pub fn file_checksums(files: &[SourceFileInfo]) -> BTreeMap<PathBuf, String> {
        files
            .iter()
            .map(|f| (f.path.clone(), f.checksum.clone()))
            .collect()
    }

    /// Absolute path to the target directory.
    pub fn target_path(&self) -> PathBuf {
        self.root.join(&self.config.target_path)
    }

    fn walk(
        &self,
        dir: &str,
        classify: &mut dyn FnMut(&Path, &str) -> Option<FileKind>,
        out: &mut Vec<SourceFileInfo>,
    ) -> CoreResult<()> {
        let abs = self.root.join(dir);
        if !abs.is_dir() {
            // Configured paths may simply not exist yet (e.g. no seeds/).
            return Ok(());
        }
        self.walk_dir(&abs, classify, out)
    }

    fn walk_dir(
        &self,
        dir: &Path,
        classify: &mut dyn FnMut(&Path, &str) -> Option<FileKind>,
        out: &mut Vec<SourceFileInfo>,
    ) -> CoreResult<()> {
        let entries = std::fs::read_dir(dir).map_err(|e| CoreError::IoWithPath {
            path: dir.display().to_string(),
            source: e,
        })?;
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                self.walk_dir(&path, classify, out)?;
                continue;
            }
            let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            let Some(kind) = classify(&path, ext) else {
                continue;
            };
            let contents =
                std::fs::read_to_string(&path).map_err(|e| CoreError::IoWithPath {
                    path: path.display().to_string(),
                    source: e,
                })?;
            let rel = path
                .strip_prefix(&self.root)
                .unwrap_or(&path)
                .to_path_buf();
            out.push(SourceFileInfo {
                path: rel,
                kind,
                checksum: compute_checksum(&contents),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "project_test.rs"]
mod tests;
