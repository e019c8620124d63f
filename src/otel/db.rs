//! Database operation instrumentation.
//!
//! Spans follow the OpenTelemetry semantic conventions for database clients,
//! with `db.system.name = "sqlite"`.

use tracing::{field, span, Level, Span};

/// Database operation types (maps to `db.operation.name`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbOperation {
    /// Load a tabular source into a relation
    Ingest,
    /// Drop every relation
    DropAll,
    /// Catalog listing of relations
    ListRelations,
    /// Catalog listing of one relation's attributes
    ListAttributes,
    /// Free-form query
    Query,
}

impl DbOperation {
    /// Get operation name as string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::DropAll => "drop_all",
            Self::ListRelations => "list_relations",
            Self::ListAttributes => "list_attributes",
            Self::Query => "query",
        }
    }
}

/// Create database operation span with semantic conventions.
///
/// # Arguments
///
/// * `operation` - Database operation type
/// * `relation` - Target relation name (optional)
///
/// # Returns
///
/// Tracing span with OpenTelemetry semantic attributes
///
/// # Example
///
/// ```rust,ignore
/// let span = db_span(DbOperation::Ingest, Some("sales"));
/// let _guard = span.entered();
/// ```
pub fn db_span(operation: DbOperation, relation: Option<&str>) -> Span {
    // Span name: "{operation} {relation}" or just "{operation}"
    let span_name = match relation {
        Some(rel) => format!("{} {}", operation.as_str(), rel),
        None => operation.as_str().to_string(),
    };

    let span = span!(
        Level::INFO,
        "db",
        otel.name = %span_name,
        otel.kind = "client",
        db.system.name = "sqlite",
        db.operation.name = operation.as_str(),
        db.collection.name = field::Empty,
        db.response.returned_rows = field::Empty,
        db.response.affected_rows = field::Empty,
    );

    if let Some(rel) = relation {
        span.record("db.collection.name", rel);
    }

    span
}

/// Create database query span for model-generated SQL.
///
/// # Arguments
///
/// * `query_text` - Query text as executed
///
/// # Returns
///
/// Tracing span with query attributes
pub fn db_query_span(query_text: &str) -> Span {
    span!(
        Level::INFO,
        "db.query",
        otel.name = "query",
        otel.kind = "client",
        db.system.name = "sqlite",
        db.operation.name = DbOperation::Query.as_str(),
        db.query.text = query_text,
        db.response.returned_rows = field::Empty,
        db.response.affected_rows = field::Empty,
    )
}

/// Record database operation metrics in the current span.
///
/// # Arguments
///
/// * `rows_returned` - Number of rows returned (optional)
/// * `rows_affected` - Number of rows written (optional)
///
/// # Example
///
/// ```rust,ignore
/// let span = db_query_span(sql);
/// let _guard = span.enter();
///
/// let result = run(sql)?;
/// record_db_metrics(Some(result.row_count()), None);
/// ```
pub fn record_db_metrics(rows_returned: Option<usize>, rows_affected: Option<usize>) {
    let span = Span::current();
    if let Some(returned) = rows_returned {
        span.record("db.response.returned_rows", returned);
    }
    if let Some(affected) = rows_affected {
        span.record("db.response.affected_rows", affected);
    }
}
