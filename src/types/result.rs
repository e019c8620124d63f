//! Query and result value types.

use crate::types::error::{InsightError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Executable query text produced by the translator.
///
/// Always non-empty and free of surrounding code fences / language tags.
/// Constructed only through [`NormalizedQuery::new`], which enforces that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedQuery(String);

impl NormalizedQuery {
    /// Wrap already-normalized text.
    ///
    /// # Errors
    ///
    /// Returns `InsightError::TranslationError` if the text is empty
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(InsightError::translation("model returned an empty query"));
        }
        Ok(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for NormalizedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tabular query result.
///
/// Column labels and row tuples are positionally aligned: every row has
/// exactly `columns.len()` values. Fields are private so the invariant holds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl QueryResult {
    /// Build a result, checking row widths.
    ///
    /// # Errors
    ///
    /// Returns `InsightError::ExecutionError` if any row width differs from the column count
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        if let Some((idx, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != columns.len())
        {
            return Err(InsightError::execution(format!(
                "row {} has {} values but {} columns were reported",
                idx,
                row.len(),
                columns.len()
            )));
        }
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<Vec<Value>>) {
        (self.columns, self.rows)
    }
}
