//! Schema store backed by a single SQLite database file.
//!
//! Every operation opens its own connection and drops it before returning, on
//! success and on error alike. Nothing holds a connection between calls.

use crate::otel::{db_span, record_db_metrics, DbOperation};
use crate::storage::ingest::{read_csv, TabularSource};
use crate::types::{
    Attribute, AttributeType, IngestedSource, IngestionSession, InsightError, Relation, Result,
};
use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

/// Baseline relation that is re-ingested on every ingestion cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaselineSource {
    /// Relation name
    pub relation: String,

    /// CSV file that feeds it
    pub path: PathBuf,
}

impl BaselineSource {
    /// Resolve the baseline file as `<dir>/<relation>.csv`.
    pub fn in_dir(dir: &Path, relation: impl Into<String>) -> Self {
        let relation = relation.into();
        let path = dir.join(format!("{}.csv", relation));
        Self { relation, path }
    }
}

/// Mapping from relation name to relation, persisted in one SQLite file.
///
/// Cloning is cheap: the store is just the database location.
#[derive(Debug, Clone)]
pub struct SchemaStore {
    path: PathBuf,
}

impl SchemaStore {
    /// Open (or create) the store at `path`.
    ///
    /// # Arguments
    ///
    /// * `path` - SQLite database file; parent directories are created
    ///
    /// # Errors
    ///
    /// Returns `InsightError::StorageError` if SQLite cannot open the file
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let store = SchemaStore::open("dataset.db")?;
    /// ```
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let store = Self { path };
        // fail early on an unusable location
        store.connect()?;
        Ok(store)
    }

    /// Database file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a scoped connection. Dropping it releases the handle.
    pub(crate) fn connect(&self) -> Result<Connection> {
        Ok(Connection::open(&self.path)?)
    }

    /// Load a CSV file as a relation, replacing any relation of the same name.
    ///
    /// # Arguments
    ///
    /// * `source` - CSV path; the relation name is the file stem
    ///
    /// # Returns
    ///
    /// The ingested source record (relation name, row count, timestamp)
    ///
    /// # Errors
    ///
    /// Returns `InsightError::IngestionError` if the file is unreadable or malformed;
    /// the existing relation is left untouched in that case
    pub fn ingest(&self, source: &Path) -> Result<IngestedSource> {
        let parsed = read_csv(source)?;
        let row_count = self.write_relation(&parsed)?;

        Ok(IngestedSource {
            relation: parsed.relation.name,
            path: source.to_path_buf(),
            row_count,
            ingested_at: Utc::now(),
        })
    }

    /// Write a parsed source as a relation (drop-and-recreate, one transaction).
    ///
    /// # Returns
    ///
    /// Number of rows inserted
    pub fn write_relation(&self, source: &TabularSource) -> Result<usize> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let rows = create_relation(&tx, source)?;
        tx.commit()?;
        Ok(rows)
    }

    /// List stored relation names.
    ///
    /// Order is whatever the SQLite catalog returns; callers should not rely on it.
    pub fn list_relations(&self) -> Result<Vec<String>> {
        let span = db_span(DbOperation::ListRelations, None);
        let _guard = span.enter();

        let conn = self.connect()?;
        let names = relation_names(&conn)?;

        record_db_metrics(Some(names.len()), None);
        Ok(names)
    }

    /// List attribute names of a relation, in declaration order.
    ///
    /// # Errors
    ///
    /// Returns `InsightError::UnknownRelation` if the relation does not exist
    pub fn list_attributes(&self, relation: &str) -> Result<Vec<String>> {
        Ok(self.describe(relation)?.attribute_names())
    }

    /// Full schema of a relation (names and declared types).
    ///
    /// # Errors
    ///
    /// Returns `InsightError::UnknownRelation` if the relation does not exist
    pub fn describe(&self, relation: &str) -> Result<Relation> {
        let span = db_span(DbOperation::ListAttributes, Some(relation));
        let _guard = span.enter();

        let conn = self.connect()?;
        let stored_name: Option<String> = conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
                params![relation],
                |row| row.get(0),
            )
            .optional()?;

        let Some(name) = stored_name else {
            return Err(InsightError::UnknownRelation(relation.to_string()));
        };

        let mut stmt = conn.prepare("SELECT name, type FROM pragma_table_info(?1) ORDER BY cid")?;
        let attributes = stmt
            .query_map(params![name], |row| {
                let name: String = row.get(0)?;
                let declared: String = row.get(1)?;
                Ok(Attribute::new(name, parse_declared_type(&declared)))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        record_db_metrics(Some(attributes.len()), None);
        Ok(Relation { name, attributes })
    }

    /// Drop every relation.
    ///
    /// # Returns
    ///
    /// Number of relations dropped
    pub fn drop_all(&self) -> Result<usize> {
        let span = db_span(DbOperation::DropAll, None);
        let _guard = span.enter();

        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let relations = relation_names(&tx)?;
        for name in &relations {
            tx.execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(name)), [])?;
        }
        tx.commit()?;

        record_db_metrics(None, Some(relations.len()));
        tracing::info!(dropped = relations.len(), "dropped all relations");
        Ok(relations.len())
    }

    /// Run one ingestion cycle: drop everything, reload the baseline, load the upload.
    ///
    /// Each cycle replaces the dataset rather than extending it. The previous
    /// session is consumed and a new one describing the reloaded sources is returned.
    ///
    /// # Arguments
    ///
    /// * `previous` - Session from the last cycle
    /// * `upload` - Newly supplied CSV file
    /// * `baseline` - Baseline relation to reload alongside the upload (optional)
    ///
    /// # Errors
    ///
    /// Returns `InsightError::IngestionError` if the upload or the baseline cannot
    /// be loaded; the store is left exactly as it was. A baseline whose file is
    /// missing is skipped with a warning.
    pub fn ingest_cycle(
        &self,
        previous: IngestionSession,
        upload: &Path,
        baseline: Option<&BaselineSource>,
    ) -> Result<IngestionSession> {
        let parsed = read_csv(upload)?;
        self.replace_dataset(previous, parsed, upload, baseline)
    }

    /// Ingestion cycle for an upload that is already parsed.
    ///
    /// `path` is recorded as the upload's source in the returned session.
    ///
    /// # Algorithm
    ///
    /// 1. Parse the baseline unless the upload *is* the baseline
    /// 2. In one transaction: drop every relation, write the baseline, write the upload
    /// 3. Any failure rolls the transaction back, leaving the prior dataset in place
    pub fn replace_dataset(
        &self,
        previous: IngestionSession,
        upload: TabularSource,
        path: &Path,
        baseline: Option<&BaselineSource>,
    ) -> Result<IngestionSession> {
        tracing::info!(
            upload = %path.display(),
            previous_sources = previous.sources().len(),
            "starting ingestion cycle"
        );

        let baseline = match baseline {
            Some(b) if b.relation.eq_ignore_ascii_case(&upload.relation.name) => {
                tracing::debug!(relation = %b.relation, "upload replaces baseline");
                None
            }
            Some(b) if b.path.is_file() => Some((b, read_csv(&b.path)?)),
            Some(b) => {
                tracing::warn!(
                    relation = %b.relation,
                    path = %b.path.display(),
                    "baseline source missing, skipping"
                );
                None
            }
            None => None,
        };

        let span = db_span(DbOperation::DropAll, None);
        let _guard = span.enter();

        let mut conn = self.connect()?;
        let tx = conn.transaction()?;

        let existing = relation_names(&tx)?;
        for name in &existing {
            tx.execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(name)), [])?;
        }

        let mut session = IngestionSession::new();
        if let Some((source, parsed)) = &baseline {
            let row_count = create_relation(&tx, parsed)?;
            session.record(IngestedSource {
                relation: parsed.relation.name.clone(),
                path: source.path.clone(),
                row_count,
                ingested_at: Utc::now(),
            });
        }

        let row_count = create_relation(&tx, &upload)?;
        tx.commit()?;

        tracing::info!(dropped = existing.len(), "ingestion cycle committed");
        session.record(IngestedSource {
            relation: upload.relation.name,
            path: path.to_path_buf(),
            row_count,
            ingested_at: Utc::now(),
        });

        Ok(session)
    }
}

fn relation_names(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(names)
}

/// Drop and recreate one relation on `conn`, then insert its rows.
///
/// Runs inside the caller's transaction; nothing is committed here.
fn create_relation(conn: &Connection, source: &TabularSource) -> Result<usize> {
    let relation = &source.relation;
    let span = db_span(DbOperation::Ingest, Some(&relation.name));
    let _guard = span.enter();

    if relation.attributes.is_empty() {
        return Err(InsightError::ingestion(format!(
            "relation '{}' has no attributes",
            relation.name
        )));
    }

    let table = quote_ident(&relation.name);
    let column_defs = relation
        .attributes
        .iter()
        .map(|a| format!("{} {}", quote_ident(&a.name), a.attribute_type.as_sql()))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=relation.attributes.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");

    conn.execute(&format!("DROP TABLE IF EXISTS {}", table), [])?;
    conn.execute(&format!("CREATE TABLE {} ({})", table, column_defs), [])?;
    let mut stmt = conn.prepare(&format!("INSERT INTO {} VALUES ({})", table, placeholders))?;
    for record in &source.records {
        stmt.execute(params_from_iter(source.sql_row(record)))?;
    }

    record_db_metrics(None, Some(source.row_count()));
    tracing::info!(
        relation = %relation.name,
        attributes = relation.attributes.len(),
        rows = source.row_count(),
        "relation written"
    );

    Ok(source.row_count())
}

/// Quote an identifier for SQLite (`"` doubled inside).
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn parse_declared_type(declared: &str) -> AttributeType {
    match declared.to_ascii_uppercase().as_str() {
        "INTEGER" | "INT" | "BIGINT" => AttributeType::Integer,
        "REAL" | "FLOAT" | "DOUBLE" => AttributeType::Real,
        _ => AttributeType::Text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("sales"), "\"sales\"");
        assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
    }

    #[test]
    fn test_baseline_in_dir() {
        let baseline = BaselineSource::in_dir(Path::new("uploads"), "housing");
        assert_eq!(baseline.path, PathBuf::from("uploads/housing.csv"));
    }

    #[test]
    fn test_describe_keeps_types() {
        let dir = tempdir().unwrap();
        let csv_path = dir.path().join("sales.csv");
        std::fs::write(&csv_path, "region,revenue\nnorth,10\nsouth,12.5\n").unwrap();

        let store = SchemaStore::open(dir.path().join("db.sqlite")).unwrap();
        store.ingest(&csv_path).unwrap();

        let relation = store.describe("sales").unwrap();
        assert_eq!(relation.attributes[0].attribute_type, AttributeType::Text);
        assert_eq!(relation.attributes[1].attribute_type, AttributeType::Real);
    }

    #[test]
    fn test_failed_ingest_leaves_existing_relation() {
        let dir = tempdir().unwrap();
        let csv_path = dir.path().join("sales.csv");
        std::fs::write(&csv_path, "region,revenue\nnorth,10\n").unwrap();

        let store = SchemaStore::open(dir.path().join("db.sqlite")).unwrap();
        store.ingest(&csv_path).unwrap();

        std::fs::write(&csv_path, "region,revenue\nnorth\n").unwrap();
        assert!(store.ingest(&csv_path).is_err());
        assert_eq!(store.list_attributes("sales").unwrap(), vec!["region", "revenue"]);
    }
}
