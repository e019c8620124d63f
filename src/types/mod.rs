//! Core data types and error handling.

pub mod error;
pub mod relation;
pub mod result;

pub use error::{InsightError, Result};
pub use relation::{Attribute, AttributeType, IngestedSource, IngestionSession, Relation};
pub use result::{NormalizedQuery, QueryResult};
