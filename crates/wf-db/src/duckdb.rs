//! DuckDB warehouse backend implementation

use crate::error::{DbError, DbResult};
use crate::traits::{CsvLoadOptions, Warehouse};
use async_trait::async_trait;
use duckdb::Connection;
use std::path::Path;
use std::sync::Mutex;

/// DuckDB warehouse backend
pub struct DuckDbWarehouse {
    conn: Mutex<Connection>,
}

impl DuckDbWarehouse {
    /// Create a new in-memory DuckDB connection
    pub fn in_memory() -> DbResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create a new DuckDB connection from a file path
    pub fn from_path(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path).map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create from a path string (handles :memory: special case)
    pub fn new(path: &str) -> DbResult<Self> {
        if path == ":memory:" {
            Self::in_memory()
        } else {
            Self::from_path(Path::new(path))
        }
    }

    fn lock(&self) -> DbResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| DbError::MutexPoisoned(e.to_string()))
    }

    fn execute_sync(&self, sql: &str) -> DbResult<usize> {
        let conn = self.lock()?;
        conn.execute(sql, [])
            .map_err(|e| DbError::ExecutionError(format!("{}: {}", e, sql)))
    }

    fn query_count_sync(&self, sql: &str) -> DbResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM ({})", sql), [], |row| {
                row.get(0)
            })
            .map_err(DbError::from)?;
        Ok(count as usize)
    }

    fn query_sample_rows_sync(&self, sql: &str, limit: usize) -> DbResult<Vec<String>> {
        let conn = self.lock()?;
        let sample_sql = format!("SELECT * FROM ({}) LIMIT {}", sql, limit);
        let mut stmt = conn.prepare(&sample_sql).map_err(DbError::from)?;
        let column_count = stmt.column_count();
        let rows = stmt
            .query_map([], |row| {
                let mut fields = Vec::with_capacity(column_count);
                for i in 0..column_count {
                    let value: duckdb::types::Value = row.get(i)?;
                    fields.push(format!("{:?}", value));
                }
                Ok(fields.join(", "))
            })
            .map_err(DbError::from)?;
        rows.collect::<Result<Vec<String>, _>>()
            .map_err(DbError::from)
    }

    fn relation_exists_sync(&self, name: &str) -> DbResult<bool> {
        let conn = self.lock()?;

        let (schema, table) = if let Some(pos) = name.rfind('.') {
            (&name[..pos], &name[pos + 1..])
        } else {
            ("main", name)
        };

        let sql = "SELECT COUNT(*) FROM information_schema.tables \
                   WHERE table_schema = ? AND table_name = ?";
        let count: i64 = conn
            .query_row(sql, [schema, table], |row| row.get(0))
            .map_err(DbError::from)?;
        Ok(count > 0)
    }
}

#[async_trait]
impl Warehouse for DuckDbWarehouse {
    async fn execute(&self, sql: &str) -> DbResult<usize> {
        self.execute_sync(sql)
    }

    async fn query_count(&self, sql: &str) -> DbResult<usize> {
        self.query_count_sync(sql)
    }

    async fn query_sample_rows(&self, sql: &str, limit: usize) -> DbResult<Vec<String>> {
        self.query_sample_rows_sync(sql, limit)
    }

    async fn create_table_as(&self, name: &str, select: &str, replace: bool) -> DbResult<()> {
        let sql = if replace {
            format!("CREATE OR REPLACE TABLE {} AS {}", name, select)
        } else {
            format!("CREATE TABLE {} AS {}", name, select)
        };
        self.execute_sync(&sql)?;
        Ok(())
    }

    async fn create_view_as(&self, name: &str, select: &str, replace: bool) -> DbResult<()> {
        let sql = if replace {
            format!("CREATE OR REPLACE VIEW {} AS {}", name, select)
        } else {
            format!("CREATE VIEW {} AS {}", name, select)
        };
        self.execute_sync(&sql)?;
        Ok(())
    }

    async fn relation_exists(&self, name: &str) -> DbResult<bool> {
        self.relation_exists_sync(name)
    }

    async fn drop_if_exists(&self, name: &str) -> DbResult<()> {
        // A name can be either a table or a view; try both.
        self.execute_sync(&format!("DROP TABLE IF EXISTS {}", name))?;
        self.execute_sync(&format!("DROP VIEW IF EXISTS {}", name))?;
        Ok(())
    }

    async fn create_schema_if_not_exists(&self, schema: &str) -> DbResult<()> {
        self.execute_sync(&format!("CREATE SCHEMA IF NOT EXISTS {}", schema))?;
        Ok(())
    }

    async fn load_csv(&self, table: &str, path: &str, options: &CsvLoadOptions) -> DbResult<()> {
        let escaped_path = path.replace('\'', "''");
        let mut args = vec![
            format!("'{}'", escaped_path),
            "header = true".to_string(),
            format!("delim = '{}'", options.delimiter),
        ];
        if !options.column_types.is_empty() {
            let overrides = options
                .column_types
                .iter()
                .map(|(col, ty)| format!("'{}': '{}'", col.replace('\'', "''"), ty))
                .collect::<Vec<_>>()
                .join(", ");
            args.push(format!("types = {{{}}}", overrides));
        }
        let sql = format!(
            "CREATE OR REPLACE TABLE {} AS SELECT * FROM read_csv({})",
            table,
            args.join(", ")
        );
        self.execute_sync(&sql)
            .map_err(|e| DbError::CsvError(e.to_string()))?;
        Ok(())
    }

    fn db_type(&self) -> &'static str {
        "duckdb"
    }
}

#[cfg(test)]
#[path = "duckdb_test.rs"]
mod tests;
