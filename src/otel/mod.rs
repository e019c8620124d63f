//! Tracing instrumentation for the insight pipeline.
//!
//! Follows OpenTelemetry semantic conventions:
//! - https://opentelemetry.io/docs/specs/semconv/database/database-spans/
//! - https://opentelemetry.io/docs/specs/semconv/gen-ai/
//!
//! **Span naming**: `{db.operation.name} {relation}`
//! - Example: `ingest sales`, `list_attributes housing`, `query`
//!
//! **Required attributes**:
//! - `db.system.name`: Always `"sqlite"`
//!
//! **Recommended**:
//! - `db.query.text`: model-generated SQL as executed
//! - `gen_ai.request.model`: model used for translation
//!
//! # Example
//!
//! ```rust,ignore
//! use percolate_insight::otel::{db_span, DbOperation};
//!
//! let span = db_span(DbOperation::ListAttributes, Some("sales"));
//! let _guard = span.entered();
//! ```

pub mod db;
pub mod init;
pub mod llm;

pub use db::{db_query_span, db_span, record_db_metrics, DbOperation};
pub use init::{init_tracing, LogFormat};
pub use llm::{llm_span, record_llm_response};
