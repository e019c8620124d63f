//! Query execution against the schema store.

use crate::otel::{db_query_span, record_db_metrics};
use crate::query::policy::StatementPolicy;
use crate::storage::SchemaStore;
use crate::types::{InsightError, NormalizedQuery, QueryResult, Result};
use rusqlite::types::ValueRef;
use serde_json::{Number, Value};

/// Runs normalized queries and collects their results.
///
/// Failures are reported as `InsightError::ExecutionError` and never retried:
/// malformed model-generated SQL is expected.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryExecutor {
    policy: StatementPolicy,
}

impl QueryExecutor {
    /// Executor with the given statement policy.
    pub fn new(policy: StatementPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> StatementPolicy {
        self.policy
    }

    /// Execute a query and fetch every row.
    ///
    /// Opens a connection for this call only; it is released on every return path.
    ///
    /// # Arguments
    ///
    /// * `query` - Normalized query, executed verbatim
    /// * `store` - Store whose database the query runs against
    ///
    /// # Returns
    ///
    /// Column labels and rows, positionally aligned
    ///
    /// # Errors
    ///
    /// Returns `InsightError::ExecutionError` if the policy refuses the query,
    /// SQLite rejects it (syntax, missing relation, type mismatch) or it produces
    /// no result columns
    pub fn execute(&self, query: &NormalizedQuery, store: &SchemaStore) -> Result<QueryResult> {
        let span = db_query_span(query.as_str());
        let _guard = span.enter();

        let result = self.run(query.as_str(), store);
        match &result {
            Ok(r) => {
                record_db_metrics(Some(r.row_count()), None);
                tracing::info!(columns = r.columns().len(), rows = r.row_count(), "query executed");
            }
            Err(e) => tracing::warn!(error = %e, "query failed"),
        }
        result
    }

    fn run(&self, sql: &str, store: &SchemaStore) -> Result<QueryResult> {
        self.policy.check(sql)?;

        let conn = store.connect().map_err(|e| InsightError::execution(e.to_string()))?;
        let mut stmt = conn.prepare(sql).map_err(execution_error)?;

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();

        let mut rows = Vec::new();
        let mut cursor = stmt.query([]).map_err(execution_error)?;
        while let Some(row) = cursor.next().map_err(execution_error)? {
            let mut values = Vec::with_capacity(width);
            for idx in 0..width {
                values.push(to_json(row.get_ref(idx).map_err(execution_error)?));
            }
            rows.push(values);
        }

        if width == 0 {
            return Err(InsightError::execution("statement produced no result columns"));
        }

        QueryResult::new(columns, rows)
    }
}

fn execution_error(e: rusqlite::Error) -> InsightError {
    InsightError::execution(e.to_string())
}

/// Convert a SQLite cell into a JSON value.
///
/// Non-finite reals become `null`; blobs are summarised rather than inlined.
pub fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(format!("<blob {} bytes>", bytes.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn store_with_sales() -> (tempfile::TempDir, SchemaStore) {
        let dir = tempdir().unwrap();
        let csv_path = dir.path().join("sales.csv");
        std::fs::write(&csv_path, "region,revenue\nnorth,100\nsouth,250\neast,75\n").unwrap();
        let store = SchemaStore::open(dir.path().join("dataset.db")).unwrap();
        store.ingest(&csv_path).unwrap();
        (dir, store)
    }

    fn q(sql: &str) -> NormalizedQuery {
        NormalizedQuery::new(sql).unwrap()
    }

    #[test]
    fn test_select_returns_aligned_rows() {
        let (_dir, store) = store_with_sales();
        let result = QueryExecutor::default()
            .execute(&q("SELECT region, revenue FROM sales ORDER BY revenue DESC"), &store)
            .unwrap();

        assert_eq!(result.columns(), ["region", "revenue"]);
        assert_eq!(result.rows()[0], vec![json!("south"), json!(250)]);
        assert!(result.rows().iter().all(|r| r.len() == result.columns().len()));
    }

    #[test]
    fn test_aggregate_labels() {
        let (_dir, store) = store_with_sales();
        let result = QueryExecutor::default()
            .execute(&q("SELECT SUM(revenue) AS total FROM sales"), &store)
            .unwrap();
        assert_eq!(result.columns(), ["total"]);
        assert_eq!(result.rows(), [vec![json!(425)]]);
    }

    #[test]
    fn test_empty_result_is_success() {
        let (_dir, store) = store_with_sales();
        let result = QueryExecutor::default()
            .execute(&q("SELECT * FROM sales WHERE revenue > 10000"), &store)
            .unwrap();
        assert_eq!(result.columns().len(), 2);
        assert_eq!(result.row_count(), 0);
    }

    #[test]
    fn test_syntax_error_is_execution_error() {
        let (_dir, store) = store_with_sales();
        let result = QueryExecutor::default().execute(&q("SELEC * FORM sales"), &store);
        assert!(matches!(result, Err(InsightError::ExecutionError(_))));
    }

    #[test]
    fn test_read_only_policy_blocks_drop() {
        let (_dir, store) = store_with_sales();
        let executor = QueryExecutor::new(StatementPolicy::ReadOnly);
        assert_eq!(executor.policy(), StatementPolicy::ReadOnly);
        assert_eq!(QueryExecutor::default().policy(), StatementPolicy::Unrestricted);
        let result = executor.execute(&q("DROP TABLE sales"), &store);
        assert!(matches!(result, Err(InsightError::ExecutionError(_))));
        assert!(store.list_relations().unwrap().contains(&"sales".to_string()));
    }

    #[test]
    fn test_to_json() {
        assert_eq!(to_json(ValueRef::Null), Value::Null);
        assert_eq!(to_json(ValueRef::Real(f64::NAN)), Value::Null);
        assert_eq!(to_json(ValueRef::Text(b"north")), json!("north"));
        assert_eq!(to_json(ValueRef::Blob(&[1, 2, 3])), json!("<blob 3 bytes>"));
    }
}
