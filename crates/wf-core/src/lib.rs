//! wf-core - Core library for Wrenflow
//!
//! This crate provides the resource and manifest types, the change
//! detector that plans partial reparses, the typed dependency graph,
//! selectors, run results, and project configuration shared across all
//! Wrenflow components.

pub mod checksum;
pub mod config;
pub mod error;
pub mod graph;
pub mod manifest;
mod newtype_string;
pub mod partial;
pub mod project;
pub mod resource;
pub mod results;
pub mod selector;
pub(crate) mod serde_helpers;
pub mod sql_utils;
pub mod testing;
pub mod unique_id;

pub use checksum::compute_checksum;
pub use config::{Config, DatabaseConfig, DbType, TargetConfig};
pub use error::{CoreError, CoreResult};
pub use graph::{EdgeKind, Graph};
pub use manifest::Manifest;
pub use partial::{CacheEntry, ParseCache, ReparsePlan, ReparseReason};
pub use project::{FileKind, Project, SourceFileInfo};
pub use resource::{
    Materialization, Resource, ResourceKind, SeedDetails, SnapshotDetails, SnapshotStrategy,
    SourceDetails, TestDetails,
};
pub use results::{NodeResult, NodeStatus, RunResult};
pub use selector::{apply_selectors, Selector};
pub use testing::{parse_test_definition, TestKind, TestSeverity};
pub use unique_id::{MacroName, ResourceName, UniqueId};
