//! SQL dialect abstraction

use sqlparser::ast::Statement;
use sqlparser::dialect::{Dialect, DuckDbDialect};
use sqlparser::parser::Parser;

use crate::error::{SqlError, SqlResult};

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SqlDialect {
    /// DuckDB (default)
    #[default]
    DuckDb,
}

impl SqlDialect {
    fn parser_dialect(&self) -> &'static dyn Dialect {
        match self {
            SqlDialect::DuckDb => &DuckDbDialect {},
        }
    }

    /// Dialect name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            SqlDialect::DuckDb => "duckdb",
        }
    }
}

/// Parse SQL into AST statements under the given dialect.
pub fn parse_sql(dialect: SqlDialect, sql: &str) -> SqlResult<Vec<Statement>> {
    Parser::parse_sql(dialect.parser_dialect(), sql).map_err(|e| {
        let msg = e.to_string();
        let (line, column) = parse_location_from_error(&msg);
        SqlError::ParseError {
            message: msg,
            line,
            column,
        }
    })
}

/// Parse line and column from a sqlparser error message.
///
/// `ParserError` is a simple string wrapper with no structured location
/// data, so we extract "Line: N, Column: M" from the message text.
fn parse_location_from_error(msg: &str) -> (usize, usize) {
    let Some(line_idx) = msg.find("Line: ") else {
        return (0, 0);
    };
    let line_start = line_idx + 6;
    let Some(comma_idx) = msg[line_start..].find(',') else {
        return (0, 0);
    };
    let Ok(line) = msg[line_start..line_start + comma_idx].trim().parse() else {
        return (0, 0);
    };
    let Some(col_idx) = msg.find("Column: ") else {
        return (line, 0);
    };
    let column = msg[col_idx + 8..]
        .trim()
        .trim_end_matches(|c: char| !c.is_ascii_digit())
        .parse()
        .unwrap_or(0);
    (line, column)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_select() {
        let stmts = parse_sql(SqlDialect::DuckDb, "SELECT 1 AS one").unwrap();
        assert_eq!(stmts.len(), 1);
    }

    #[test]
    fn test_parse_error_carries_location() {
        let err = parse_sql(SqlDialect::DuckDb, "SELECT FROM FROM").unwrap_err();
        match err {
            SqlError::ParseError { line, .. } => assert!(line >= 1),
            other => panic!("unexpected error: {}", other),
        }
    }
}
