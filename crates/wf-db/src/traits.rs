//! Warehouse trait definition

use crate::error::DbResult;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Options for loading a CSV seed into a table.
#[derive(Debug, Clone)]
pub struct CsvLoadOptions {
    /// Field delimiter
    pub delimiter: char,

    /// Column name -> SQL type overrides; unlisted columns are inferred
    pub column_types: BTreeMap<String, String>,
}

impl Default for CsvLoadOptions {
    fn default() -> Self {
        Self {
            delimiter: ',',
            column_types: BTreeMap::new(),
        }
    }
}

/// Warehouse abstraction for Wrenflow.
///
/// Implementations must be Send + Sync; calls may block on network I/O for
/// arbitrary duration and the scheduler runs them off the coordinator.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Execute SQL that modifies data, returning affected rows
    async fn execute(&self, sql: &str) -> DbResult<usize>;

    /// Execute query returning its row count (used by tests)
    async fn query_count(&self, sql: &str) -> DbResult<usize>;

    /// Query and return up to `limit` rows as comma-separated strings
    async fn query_sample_rows(&self, sql: &str, limit: usize) -> DbResult<Vec<String>>;

    /// Create table from a SELECT statement
    async fn create_table_as(&self, name: &str, select: &str, replace: bool) -> DbResult<()>;

    /// Create view from a SELECT statement
    async fn create_view_as(&self, name: &str, select: &str, replace: bool) -> DbResult<()>;

    /// Check if a table or view exists
    async fn relation_exists(&self, name: &str) -> DbResult<bool>;

    /// Drop a table or view if it exists
    async fn drop_if_exists(&self, name: &str) -> DbResult<()>;

    /// Create a schema if it does not exist
    async fn create_schema_if_not_exists(&self, schema: &str) -> DbResult<()>;

    /// Load a CSV file into a table, replacing it
    async fn load_csv(&self, table: &str, path: &str, options: &CsvLoadOptions) -> DbResult<()>;

    /// Warehouse type identifier for logging
    fn db_type(&self) -> &'static str;
}
