//! Error types for wf-sql

use thiserror::Error;

/// SQL parsing and validation errors
#[derive(Error, Debug)]
pub enum SqlError {
    /// SQL parse error (Q001)
    #[error("[Q001] SQL parse error at line {line}, column {column}: {message}")]
    ParseError {
        message: String,
        line: usize,
        column: usize,
    },

    /// Empty SQL (Q002)
    #[error("[Q002] SQL is empty")]
    EmptySql,

    /// Unsupported SQL statement (Q003)
    #[error("[Q003] Unsupported SQL statement type: {0}")]
    UnsupportedStatement(String),
}

/// Result type alias for SqlError
pub type SqlResult<T> = Result<T, SqlError>;
