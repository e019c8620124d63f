//! Percolate Insight - ask questions of tabular data in plain language.
//!
//! A CSV dataset is loaded into a SQLite-backed schema store, a question about
//! one relation is turned into SQL by a language model, the query runs against
//! the store and the two-column result is drawn as bar and/or pie charts.
//!
//! ```text
//! SchemaStore -> PromptBuilder -> QueryTranslator -> QueryExecutor -> ResultVisualizer
//! ```

pub mod chart;
pub mod config;
pub mod llm;
pub mod otel;
pub mod pipeline;
pub mod query;
pub mod server;
pub mod storage;
pub mod types;

pub use chart::{ChartKind, ChartSelection, ResultVisualizer, SvgRenderer};
pub use config::InsightConfig;
pub use llm::{LanguageModel, LlmClient, PromptBuilder, QueryTranslator};
pub use pipeline::{Pipeline, RenderRequest, RenderResponse, TranslateRequest, TranslateResponse};
pub use query::{QueryExecutor, StatementPolicy};
pub use storage::SchemaStore;
pub use types::{IngestionSession, InsightError, NormalizedQuery, QueryResult, Result};
