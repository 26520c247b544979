//! Schema test definitions and SQL generation.
//!
//! Schema tests are declared per-column in a model's `schema.yml` and
//! compiled to a SELECT that returns the violating rows; zero rows means
//! the test passes. Singular tests are standalone SQL files under the
//! project's test paths with the same zero-rows contract.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::sql_utils::{escape_sql_string, quote_ident, quote_qualified};

/// What a schema test asserts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum TestKind {
    /// Column must not contain NULLs
    NotNull,
    /// Column values must be unique
    Unique,
    /// Column values must come from a fixed list
    AcceptedValues {
        values: Vec<String>,
        #[serde(default = "crate::serde_helpers::default_true")]
        quote: bool,
    },
    /// Column values must exist in another resource's column
    Relationships { to: String, field: String },
    /// Standalone SQL file returning violating rows
    Singular,
}

impl TestKind {
    /// Short label used when deriving test resource names.
    pub fn label(&self) -> &'static str {
        match self {
            TestKind::NotNull => "not_null",
            TestKind::Unique => "unique",
            TestKind::AcceptedValues { .. } => "accepted_values",
            TestKind::Relationships { .. } => "relationships",
            TestKind::Singular => "singular",
        }
    }
}

/// Failure severity for a test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TestSeverity {
    /// Failure blocks downstream resources
    #[default]
    Error,
    /// Failure is reported but never blocks
    Warn,
}

impl std::fmt::Display for TestSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestSeverity::Error => write!(f, "error"),
            TestSeverity::Warn => write!(f, "warn"),
        }
    }
}

/// One test entry under a column in schema.yml.
///
/// Accepts either a bare name (`- not_null`) or a parameterized map
/// (`- accepted_values: { values: [...] }`).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TestDefinition {
    /// `- not_null`
    Simple(String),
    /// `- accepted_values: {...}`
    Parameterized(HashMap<String, TestParams>),
}

/// Parameters for parameterized schema tests.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TestParams {
    /// Allowed values for accepted_values
    #[serde(default)]
    pub values: Vec<serde_yaml::Value>,

    /// Whether to quote values as string literals
    #[serde(default = "crate::serde_helpers::default_true")]
    pub quote: bool,

    /// Referenced resource for relationships, as a `ref('name')` target name
    #[serde(default)]
    pub to: Option<String>,

    /// Referenced column for relationships
    #[serde(default)]
    pub field: Option<String>,

    /// Severity override
    #[serde(default)]
    pub severity: Option<TestSeverity>,
}

/// Parse a schema.yml test entry into a [`TestKind`], or None if unknown.
pub fn parse_test_definition(def: &TestDefinition) -> Option<(TestKind, TestSeverity)> {
    match def {
        TestDefinition::Simple(name) => match name.as_str() {
            "not_null" => Some((TestKind::NotNull, TestSeverity::default())),
            "unique" => Some((TestKind::Unique, TestSeverity::default())),
            _ => None,
        },
        TestDefinition::Parameterized(map) => {
            let (name, params) = map.iter().next()?;
            let severity = params.severity.unwrap_or_default();
            let kind = match name.as_str() {
                "not_null" => TestKind::NotNull,
                "unique" => TestKind::Unique,
                "accepted_values" => {
                    let values: Vec<String> = params
                        .values
                        .iter()
                        .filter_map(|v| match v {
                            serde_yaml::Value::String(s) => Some(s.clone()),
                            serde_yaml::Value::Number(n) => Some(n.to_string()),
                            serde_yaml::Value::Bool(b) => Some(b.to_string()),
                            _ => None,
                        })
                        .collect();
                    if values.is_empty() {
                        return None;
                    }
                    TestKind::AcceptedValues {
                        values,
                        quote: params.quote,
                    }
                }
                "relationships" | "relationship" => TestKind::Relationships {
                    to: params.to.clone()?,
                    field: params.field.clone().unwrap_or_else(|| "id".to_string()),
                },
                _ => return None,
            };
            Some((kind, severity))
        }
    }
}

/// Generate the violating-rows SQL for a schema test.
///
/// `relation` is the fully-qualified relation of the tested node;
/// `to_relation` is the resolved relation for relationships tests.
pub fn generate_test_sql(
    kind: &TestKind,
    relation: &str,
    column: &str,
    to_relation: Option<&str>,
) -> String {
    let qt = quote_qualified(relation);
    let qc = quote_ident(column);
    match kind {
        TestKind::NotNull => format!("SELECT * FROM {qt} WHERE {qc} IS NULL"),
        TestKind::Unique => format!(
            "SELECT {qc}, COUNT(*) AS cnt\nFROM {qt}\nWHERE {qc} IS NOT NULL\nGROUP BY {qc}\nHAVING COUNT(*) > 1"
        ),
        TestKind::AcceptedValues { values, quote } => {
            let formatted: Vec<String> = values
                .iter()
                .map(|v| {
                    if !quote && (v.parse::<f64>().is_ok() || v.parse::<i64>().is_ok()) {
                        v.clone()
                    } else {
                        format!("'{}'", escape_sql_string(v))
                    }
                })
                .collect();
            format!(
                "SELECT * FROM {qt} WHERE {qc} NOT IN ({}) OR {qc} IS NULL",
                formatted.join(", ")
            )
        }
        TestKind::Relationships { field, .. } => {
            let to_rel = quote_qualified(to_relation.unwrap_or(""));
            let qf = quote_ident(field);
            format!(
                "SELECT child.* FROM {qt} AS child\nLEFT JOIN {to_rel} AS parent ON child.{qc} = parent.{qf}\nWHERE child.{qc} IS NOT NULL AND parent.{qf} IS NULL"
            )
        }
        // Singular tests carry their own SQL; nothing to generate.
        TestKind::Singular => String::new(),
    }
}

#[cfg(test)]
#[path = "testing_test.rs"]
mod tests;
