//! Schema store: SQLite persistence and CSV ingestion.

pub mod ingest;
pub mod store;

pub use ingest::{read_csv, read_csv_from, TabularSource};
pub use store::{BaselineSource, SchemaStore};
