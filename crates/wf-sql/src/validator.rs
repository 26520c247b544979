//! Compiled-SQL validation.
//!
//! Models compile to a SELECT the materialization wraps in CREATE TABLE/VIEW
//! AS. Data-modifying statements inside a model would bypass the
//! materialization contract, so they are rejected here.

use sqlparser::ast::Statement;

use crate::dialect::{parse_sql, SqlDialect};
use crate::error::{SqlError, SqlResult};

/// Validate compiled model SQL: it must parse and contain only queries.
pub fn validate_model_sql(dialect: SqlDialect, sql: &str) -> SqlResult<()> {
    if sql.trim().is_empty() {
        return Err(SqlError::EmptySql);
    }
    let statements = parse_sql(dialect, sql)?;
    for stmt in &statements {
        validate_statement(stmt)?;
    }
    Ok(())
}

fn validate_statement(statement: &Statement) -> SqlResult<()> {
    match statement {
        Statement::Query(_) => Ok(()),
        Statement::Insert(_) => Err(SqlError::UnsupportedStatement(
            "INSERT statements are not allowed in models".to_string(),
        )),
        Statement::Update { .. } => Err(SqlError::UnsupportedStatement(
            "UPDATE statements are not allowed in models".to_string(),
        )),
        Statement::Delete(_) => Err(SqlError::UnsupportedStatement(
            "DELETE statements are not allowed in models".to_string(),
        )),
        Statement::Drop { .. } => Err(SqlError::UnsupportedStatement(
            "DROP statements are not allowed in models".to_string(),
        )),
        Statement::Truncate { .. } => Err(SqlError::UnsupportedStatement(
            "TRUNCATE statements are not allowed in models".to_string(),
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_is_valid() {
        validate_model_sql(SqlDialect::DuckDb, "SELECT id FROM orders").unwrap();
    }

    #[test]
    fn test_cte_select_is_valid() {
        validate_model_sql(
            SqlDialect::DuckDb,
            "WITH base AS (SELECT 1 AS id) SELECT * FROM base",
        )
        .unwrap();
    }

    #[test]
    fn test_empty_sql_rejected() {
        assert!(matches!(
            validate_model_sql(SqlDialect::DuckDb, "  \n"),
            Err(SqlError::EmptySql)
        ));
    }

    #[test]
    fn test_malformed_sql_rejected() {
        assert!(matches!(
            validate_model_sql(SqlDialect::DuckDb, "SELEC id FROM t"),
            Err(SqlError::ParseError { .. })
        ));
    }

    #[test]
    fn test_dml_rejected() {
        for sql in [
            "INSERT INTO t VALUES (1)",
            "UPDATE t SET x = 1",
            "DELETE FROM t",
            "DROP TABLE t",
        ] {
            assert!(
                matches!(
                    validate_model_sql(SqlDialect::DuckDb, sql),
                    Err(SqlError::UnsupportedStatement(_))
                ),
                "expected rejection for {}",
                sql
            );
        }
    }
}
