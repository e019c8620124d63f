//! CSV reading and attribute type inference.
//!
//! The header row names the attributes. Each column's type is the narrowest of
//! INTEGER, REAL and TEXT that every non-empty cell fits; empty cells become NULL.

use crate::types::{Attribute, AttributeType, InsightError, Relation, Result};
use rusqlite::types::Value as SqlValue;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Parsed tabular source, ready to be written as a relation.
#[derive(Debug, Clone)]
pub struct TabularSource {
    /// Relation schema (name + inferred attributes)
    pub relation: Relation,

    /// Raw cells, `None` for empty
    pub records: Vec<Vec<Option<String>>>,
}

impl TabularSource {
    /// Number of data rows.
    pub fn row_count(&self) -> usize {
        self.records.len()
    }

    /// Convert one record into SQL values according to the inferred types.
    ///
    /// Inference guarantees the parse succeeds; a cell that still fails to
    /// parse is stored as text rather than dropped.
    pub fn sql_row(&self, record: &[Option<String>]) -> Vec<SqlValue> {
        self.relation
            .attributes
            .iter()
            .zip(record)
            .map(|(attr, cell)| to_sql_value(attr.attribute_type, cell.as_deref()))
            .collect()
    }
}

/// Read a CSV file into a tabular source named after the file stem.
///
/// # Arguments
///
/// * `path` - CSV file path; `uploads/sales.csv` produces relation `sales`
///
/// # Errors
///
/// Returns `InsightError::IngestionError` if the file cannot be opened, has no
/// header row, or contains rows whose width differs from the header
pub fn read_csv(path: &Path) -> Result<TabularSource> {
    let relation = Relation::name_from_path(path).ok_or_else(|| {
        InsightError::ingestion(format!("cannot derive relation name from {}", path.display()))
    })?;

    let file = File::open(path)
        .map_err(|e| InsightError::ingestion(format!("cannot open {}: {}", path.display(), e)))?;

    read_csv_from(&relation, file)
}

/// Read CSV data from any reader.
///
/// # Errors
///
/// Returns `InsightError::IngestionError` on malformed data
pub fn read_csv_from<R: Read>(relation: &str, reader: R) -> Result<TabularSource> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(reader);

    let raw_headers = rdr
        .headers()
        .map_err(|e| InsightError::ingestion(format!("cannot read header row: {}", e)))?
        .clone();

    if raw_headers.is_empty() {
        return Err(InsightError::ingestion(format!(
            "source for '{}' has no header row",
            relation
        )));
    }

    let headers = normalize_headers(raw_headers.iter());
    let mut types = vec![None::<AttributeType>; headers.len()];
    let mut records = Vec::new();

    for (idx, result) in rdr.records().enumerate() {
        let record = result.map_err(|e| {
            InsightError::ingestion(format!("malformed record {}: {}", idx + 1, e))
        })?;

        let cells: Vec<Option<String>> = record
            .iter()
            .map(|cell| {
                if cell.trim().is_empty() {
                    None
                } else {
                    Some(cell.to_string())
                }
            })
            .collect();

        for (slot, cell) in types.iter_mut().zip(&cells) {
            if let Some(text) = cell {
                let observed = infer_cell_type(text);
                *slot = Some(slot.map_or(observed, |t| t.widen(observed)));
            }
        }

        records.push(cells);
    }

    let attributes = headers
        .into_iter()
        .zip(types)
        .map(|(name, ty)| Attribute::new(name, ty.unwrap_or(AttributeType::Text)))
        .collect();

    tracing::debug!(relation, rows = records.len(), "parsed csv source");

    Ok(TabularSource {
        relation: Relation {
            name: relation.to_string(),
            attributes,
        },
        records,
    })
}

/// Make header names usable as distinct column names.
///
/// Blank names become `Unnamed: <index>`; repeats get `.1`, `.2`, ... suffixes.
pub fn normalize_headers<'a>(raw: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut out = Vec::new();

    for (idx, name) in raw.enumerate() {
        let base = match name.trim() {
            "" => format!("Unnamed: {}", idx),
            trimmed => trimmed.to_string(),
        };

        let mut candidate = base.clone();
        while let Some(count) = seen.get_mut(&candidate.to_lowercase()) {
            *count += 1;
            candidate = format!("{}.{}", base, count);
        }
        seen.insert(candidate.to_lowercase(), 0);
        out.push(candidate);
    }

    out
}

fn infer_cell_type(text: &str) -> AttributeType {
    let text = text.trim();
    if text.parse::<i64>().is_ok() {
        AttributeType::Integer
    } else if text.parse::<f64>().is_ok() {
        AttributeType::Real
    } else {
        AttributeType::Text
    }
}

fn to_sql_value(ty: AttributeType, cell: Option<&str>) -> SqlValue {
    let Some(text) = cell else {
        return SqlValue::Null;
    };

    match ty {
        AttributeType::Integer => text
            .trim()
            .parse::<i64>()
            .map(SqlValue::Integer)
            .unwrap_or_else(|_| SqlValue::Text(text.to_string())),
        AttributeType::Real => text
            .trim()
            .parse::<f64>()
            .map(SqlValue::Real)
            .unwrap_or_else(|_| SqlValue::Text(text.to_string())),
        AttributeType::Text => SqlValue::Text(text.to_string()),
    }
}
