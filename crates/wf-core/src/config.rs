//! Configuration types and parsing for wrenflow.yml

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{CoreError, CoreResult};

/// Main project configuration from wrenflow.yml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Project name; becomes the namespace segment of every unique id
    pub name: String,

    /// Project version
    #[serde(default = "default_version")]
    pub version: String,

    /// Directories containing model SQL and properties YAML files
    #[serde(default = "default_model_paths")]
    pub model_paths: Vec<String>,

    /// Directories containing seed CSV files
    #[serde(default = "default_seed_paths")]
    pub seed_paths: Vec<String>,

    /// Directories containing snapshot definitions
    #[serde(default = "default_snapshot_paths")]
    pub snapshot_paths: Vec<String>,

    /// Directories containing singular test SQL files
    #[serde(default = "default_test_paths")]
    pub test_paths: Vec<String>,

    /// Directories containing macro files
    #[serde(default = "default_macro_paths")]
    pub macro_paths: Vec<String>,

    /// Output directory for compiled SQL and artifacts
    #[serde(default = "default_target_path")]
    pub target_path: String,

    /// Default schema for models
    #[serde(default)]
    pub schema: Option<String>,

    /// Worker pool size; 0 means derive from available parallelism
    #[serde(default)]
    pub threads: usize,

    /// Database connection configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Variables available in templates via var()
    #[serde(default)]
    pub vars: HashMap<String, serde_yaml::Value>,

    /// SQL statements to execute before any resource runs
    #[serde(default)]
    pub on_run_start: Vec<String>,

    /// SQL statements to execute after all resources complete
    #[serde(default)]
    pub on_run_end: Vec<String>,

    /// Named target configurations (e.g. dev, prod)
    #[serde(default)]
    pub targets: HashMap<String, TargetConfig>,
}

/// Target-specific configuration overrides
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TargetConfig {
    /// Database configuration override
    #[serde(default)]
    pub database: Option<DatabaseConfig>,

    /// Schema override
    #[serde(default)]
    pub schema: Option<String>,

    /// Variable overrides (merged with base vars)
    #[serde(default)]
    pub vars: HashMap<String, serde_yaml::Value>,
}

/// Database type selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DbType {
    /// DuckDB (default)
    #[default]
    DuckDb,
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database backend type
    #[serde(default, rename = "type")]
    pub db_type: DbType,

    /// Path to the database file, or ":memory:"
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_type: DbType::default(),
            path: default_db_path(),
        }
    }
}

impl Config {
    /// Load configuration from a wrenflow.yml path.
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Err(CoreError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| CoreError::ConfigParseError {
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply a named target's overrides, consuming self.
    pub fn with_target(mut self, target: &str) -> CoreResult<Self> {
        let Some(overrides) = self.targets.get(target).cloned() else {
            return Err(CoreError::ConfigInvalid {
                message: format!("unknown target '{}'", target),
            });
        };
        if let Some(db) = overrides.database {
            self.database = db;
        }
        if let Some(schema) = overrides.schema {
            self.schema = Some(schema);
        }
        self.vars.extend(overrides.vars);
        Ok(self)
    }

    fn validate(&self) -> CoreResult<()> {
        if self.name.is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "project name must not be empty".to_string(),
            });
        }
        if self.name.contains('.') {
            return Err(CoreError::ConfigInvalid {
                message: format!(
                    "project name '{}' must not contain '.' (it namespaces resource ids)",
                    self.name
                ),
            });
        }
        Ok(())
    }
}

fn default_version() -> String {
    "0.1.0".to_string()
}

fn default_model_paths() -> Vec<String> {
    vec!["models".to_string()]
}

fn default_seed_paths() -> Vec<String> {
    vec!["seeds".to_string()]
}

fn default_snapshot_paths() -> Vec<String> {
    vec!["snapshots".to_string()]
}

fn default_test_paths() -> Vec<String> {
    vec!["tests".to_string()]
}

fn default_macro_paths() -> Vec<String> {
    vec!["macros".to_string()]
}

fn default_target_path() -> String {
    "target".to_string()
}

fn default_db_path() -> String {
    "wrenflow.duckdb".to_string()
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
