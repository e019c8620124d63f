//! Error types for the question-to-chart pipeline.
//!
//! Uses `thiserror` for ergonomic error definitions with automatic `From` implementations.
//! Every pipeline stage reports its own variant so callers can tell which stage failed.

use thiserror::Error;

/// Error type for all pipeline operations.
#[derive(Error, Debug)]
pub enum InsightError {
    /// Dataset source could not be read or is malformed
    #[error("Ingestion failed: {0}")]
    IngestionError(String),

    /// Relation not present in the schema store
    #[error("Unknown relation: {0}")]
    UnknownRelation(String),

    /// Language model call failed or produced nothing usable
    #[error("Translation failed: {0}")]
    TranslationError(String),

    /// Query rejected or failed during execution
    #[error("Query execution failed: {0}")]
    ExecutionError(String),

    /// Result set too narrow to plot
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Plotting backend fault
    #[error("Render failed: {0}")]
    RenderError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Storage layer error (SQLite)
    #[error("Storage error: {0}")]
    StorageError(#[from] rusqlite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Internal error (should not happen)
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, InsightError>;

impl InsightError {
    /// Create an ingestion error with context.
    pub fn ingestion(msg: impl Into<String>) -> Self {
        Self::IngestionError(msg.into())
    }

    /// Create a translation error with context.
    pub fn translation(msg: impl Into<String>) -> Self {
        Self::TranslationError(msg.into())
    }

    /// Create an execution error with context.
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::ExecutionError(msg.into())
    }

    /// Create a render error with context.
    pub fn render(msg: impl Into<String>) -> Self {
        Self::RenderError(msg.into())
    }

    /// Stable snake_case tag for the error class.
    ///
    /// Used as a structured log field and in per-chart failure entries.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::IngestionError(_) => "ingestion_error",
            Self::UnknownRelation(_) => "unknown_relation",
            Self::TranslationError(_) => "translation_error",
            Self::ExecutionError(_) => "execution_error",
            Self::InsufficientData(_) => "insufficient_data",
            Self::RenderError(_) => "render_error",
            Self::ConfigError(_) => "config_error",
            Self::StorageError(_) => "storage_error",
            Self::JsonError(_) => "json_error",
            Self::IoError(_) => "io_error",
            Self::InternalError(_) => "internal_error",
        }
    }

    /// Short human-readable message for `{ "error": ... }` responses.
    ///
    /// Model and driver failures are summarised; the detailed text only goes to the log.
    ///
    /// # Returns
    ///
    /// Message suitable for end users
    pub fn user_message(&self) -> String {
        match self {
            Self::TranslationError(_) => "Failed to generate a response for the query.".to_string(),
            Self::ExecutionError(_) | Self::StorageError(_) => {
                "Failed to execute query or no results found.".to_string()
            }
            Self::InsufficientData(_) => {
                "Invalid graph type or insufficient data for plotting.".to_string()
            }
            Self::UnknownRelation(name) => format!("Unknown table: {}", name),
            Self::IngestionError(msg) => format!("Failed to load dataset: {}", msg),
            Self::RenderError(msg) => format!("Failed to render chart: {}", msg),
            Self::ConfigError(msg) => format!("Server misconfigured: {}", msg),
            Self::JsonError(_) | Self::IoError(_) | Self::InternalError(_) => {
                "Internal server error.".to_string()
            }
        }
    }
}
