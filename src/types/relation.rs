//! Relation and ingestion data structures.
//!
//! A relation is a named SQLite table created from one tabular source. The
//! ingestion session records which sources make up the current dataset.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Inferred storage type of an attribute.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum AttributeType {
    /// Every non-empty value parses as a 64-bit integer
    Integer,
    /// Every non-empty value parses as a float
    Real,
    /// Anything else
    Text,
}

impl AttributeType {
    /// SQLite column type name.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Text => "TEXT",
        }
    }

    /// Widen this type so that `other` values also fit.
    ///
    /// Integer < Real < Text.
    pub fn widen(self, other: AttributeType) -> AttributeType {
        match (self, other) {
            (Self::Text, _) | (_, Self::Text) => Self::Text,
            (Self::Real, _) | (_, Self::Real) => Self::Real,
            _ => Self::Integer,
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Named, typed column of a relation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attribute {
    /// Column name (from the header row)
    pub name: String,

    /// Inferred type
    pub attribute_type: AttributeType,
}

impl Attribute {
    pub fn new(name: impl Into<String>, attribute_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attribute_type,
        }
    }
}

/// Relation schema: name plus ordered attribute list.
///
/// Identity is the name. Rows live in the store, not here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Relation {
    /// Relation (table) name
    pub name: String,

    /// Ordered attributes
    pub attributes: Vec<Attribute>,
}

impl Relation {
    /// Derive a relation name from a source path.
    ///
    /// Base name with the extension stripped: `uploads/sales.csv` → `sales`.
    ///
    /// # Returns
    ///
    /// `None` if the path has no usable file stem
    pub fn name_from_path(path: &Path) -> Option<String> {
        path.file_stem()
            .and_then(|s| s.to_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// Attribute names in declaration order.
    pub fn attribute_names(&self) -> Vec<String> {
        self.attributes.iter().map(|a| a.name.clone()).collect()
    }
}

/// One source that was loaded during an ingestion cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestedSource {
    /// Relation created from the source
    pub relation: String,

    /// Source file path
    pub path: PathBuf,

    /// Number of data rows loaded
    pub row_count: usize,

    /// Load timestamp
    pub ingested_at: DateTime<Utc>,
}

/// Sources that make up the current dataset.
///
/// Passed into and returned from `SchemaStore::ingest_cycle`; each cycle
/// consumes the previous session and returns a replacement, so there is no
/// process-wide list of loaded files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestionSession {
    sources: Vec<IngestedSource>,
}

impl IngestionSession {
    /// Empty session (nothing ingested yet).
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a loaded source.
    pub fn record(&mut self, source: IngestedSource) {
        self.sources.push(source);
    }

    /// Loaded sources in ingestion order.
    pub fn sources(&self) -> &[IngestedSource] {
        &self.sources
    }

    /// Relation names in ingestion order.
    pub fn relations(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.relation.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_from_path() {
        assert_eq!(
            Relation::name_from_path(Path::new("uploads/sales.csv")),
            Some("sales".to_string())
        );
        assert_eq!(
            Relation::name_from_path(Path::new("housing")),
            Some("housing".to_string())
        );
        assert_eq!(Relation::name_from_path(Path::new("/")), None);
    }

    #[test]
    fn test_widen() {
        use AttributeType::*;
        assert_eq!(Integer.widen(Integer), Integer);
        assert_eq!(Integer.widen(Real), Real);
        assert_eq!(Real.widen(Integer), Real);
        assert_eq!(Real.widen(Text), Text);
        assert_eq!(Text.widen(Integer), Text);
    }

    #[test]
    fn test_session_records_in_order() {
        let mut session = IngestionSession::new();
        assert!(session.is_empty());

        for name in ["housing", "sales"] {
            session.record(IngestedSource {
                relation: name.to_string(),
                path: PathBuf::from(format!("{}.csv", name)),
                row_count: 3,
                ingested_at: Utc::now(),
            });
        }

        assert_eq!(session.relations(), vec!["housing", "sales"]);
    }
}
