//! Error types for wf-core

use thiserror::Error;

/// Core error type for Wrenflow
#[derive(Error, Debug)]
pub enum CoreError {
    /// E001: Configuration file not found
    #[error("[E001] Config file not found: {path}")]
    ConfigNotFound { path: String },

    /// E002: Failed to parse configuration file
    #[error("[E002] Failed to parse config: {message}")]
    ConfigParseError { message: String },

    /// E003: Invalid configuration value
    #[error("[E003] Invalid config: {message}")]
    ConfigInvalid { message: String },

    /// E004: Project directory not found
    #[error("[E004] Project directory not found: {path}")]
    ProjectNotFound { path: String },

    /// E005: Resource not found by name
    #[error("[E005] {kind} not found: {name}")]
    ResourceNotFound { kind: String, name: String },

    /// E006: Resource failed to parse
    #[error("[E006] Parse error in {resource}: {message}")]
    ResourceParseError { resource: String, message: String },

    /// E007: Circular dependency detected
    #[error("[E007] Circular dependency detected: {cycle}")]
    CircularDependency { cycle: String },

    /// E008: Duplicate resource id
    #[error("[E008] Duplicate resource '{unique_id}' declared in {path1} and {path2}")]
    DuplicateResource {
        unique_id: String,
        path1: String,
        path2: String,
    },

    /// E009: Invalid selector
    #[error("[E009] Invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    /// E010: Reference to a resource that does not exist
    #[error("[E010] Resource '{resource}' references '{reference}', which was not found in the project")]
    UnresolvedRef { resource: String, reference: String },

    /// E011: Reference to an undeclared source table
    #[error("[E011] Resource '{resource}' references source '{source_name}.{table}', which is not declared")]
    UnresolvedSource {
        resource: String,
        source_name: String,
        table: String,
    },

    /// E012: Environment variable referenced during parse but not set
    #[error("[E012] Resource '{resource}' references env var '{var}', which is not set and has no default")]
    UndefinedEnvVar { resource: String, var: String },

    /// E013: Selection matched nothing
    #[error("[E013] Selection '{selector}' matched no resources")]
    EmptySelection { selector: String },

    /// E014: IO error
    #[error("[E014] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// E015: Schema/YAML parse error
    #[error("[E015] Schema parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// E016: IO error with file path context
    #[error("[E016] Failed to read '{path}': {source}")]
    IoWithPath {
        path: String,
        source: std::io::Error,
    },

    /// E017: Empty name where one is required
    #[error("[E017] Empty name: {context}")]
    EmptyName { context: String },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for CoreError
pub type CoreResult<T> = Result<T, CoreError>;
