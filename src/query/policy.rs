//! Statement admission policy for model-generated SQL.
//!
//! Model output is executed verbatim under [`StatementPolicy::Unrestricted`],
//! which is the default. [`StatementPolicy::ReadOnly`] parses the query first
//! and admits a single query statement only, so `DROP` / `DELETE` / `UPDATE`
//! produced by the model are refused before they reach SQLite.

use crate::types::{InsightError, Result};
use serde::{Deserialize, Serialize};
use sqlparser::ast::Statement;
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;
use std::str::FromStr;

/// Which statements the executor will run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementPolicy {
    /// Execute whatever the model produced
    #[default]
    Unrestricted,
    /// Execute a single SELECT-style query only
    ReadOnly,
}

impl StatementPolicy {
    /// Check a query against the policy.
    ///
    /// # Errors
    ///
    /// Returns `InsightError::ExecutionError` if the query is refused or (under
    /// `ReadOnly`) cannot be parsed
    pub fn check(&self, sql: &str) -> Result<()> {
        match self {
            Self::Unrestricted => Ok(()),
            Self::ReadOnly => {
                let statements = Parser::parse_sql(&SQLiteDialect {}, sql)
                    .map_err(|e| InsightError::execution(format!("cannot parse query: {}", e)))?;

                match statements.as_slice() {
                    [Statement::Query(_)] => Ok(()),
                    [] => Err(InsightError::execution("no statement to execute")),
                    [_] => Err(InsightError::execution(
                        "only SELECT queries are allowed in read-only mode",
                    )),
                    _ => Err(InsightError::execution(format!(
                        "expected one statement, found {}",
                        statements.len()
                    ))),
                }
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unrestricted => "unrestricted",
            Self::ReadOnly => "read_only",
        }
    }
}

impl FromStr for StatementPolicy {
    type Err = InsightError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "unrestricted" => Ok(Self::Unrestricted),
            "read_only" | "readonly" => Ok(Self::ReadOnly),
            other => Err(InsightError::ConfigError(format!(
                "unknown statement policy '{}' (expected unrestricted or read_only)",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unrestricted_allows_anything() {
        assert!(StatementPolicy::Unrestricted.check("DROP TABLE sales").is_ok());
        assert!(StatementPolicy::Unrestricted.check("not even sql").is_ok());
    }

    #[test]
    fn test_read_only_allows_select() {
        let policy = StatementPolicy::ReadOnly;
        assert!(policy.check("SELECT region, SUM(revenue) FROM sales GROUP BY region").is_ok());
        assert!(policy
            .check("WITH t AS (SELECT 1 AS x) SELECT x FROM t")
            .is_ok());
    }

    #[test]
    fn test_read_only_refuses_writes() {
        let policy = StatementPolicy::ReadOnly;
        for sql in [
            "DROP TABLE sales",
            "DELETE FROM sales",
            "UPDATE sales SET revenue = 0",
            "SELECT 1; DROP TABLE sales",
        ] {
            assert!(
                matches!(policy.check(sql), Err(InsightError::ExecutionError(_))),
                "{} should be refused",
                sql
            );
        }
    }

    #[test]
    fn test_from_str() {
        assert_eq!("read-only".parse::<StatementPolicy>().unwrap(), StatementPolicy::ReadOnly);
        assert_eq!("UNRESTRICTED".parse::<StatementPolicy>().unwrap(), StatementPolicy::Unrestricted);
        assert!("yolo".parse::<StatementPolicy>().is_err());
    }
}
