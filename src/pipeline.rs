//! End-to-end pipeline: question in, query result and charts out.
//!
//! Every stage reports its own failure class; [`Pipeline::answer`] and
//! [`Pipeline::chart`] turn them into `{ "error": ... }` responses so a single
//! stage failing never aborts the caller.

use crate::chart::{
    ChartArtifact, ChartKind, ChartRenderer, ChartSelection, ResultVisualizer, SvgRenderer,
};
use crate::config::InsightConfig;
use crate::llm::{LanguageModel, PromptBuilder, QueryTranslator};
use crate::query::{QueryExecutor, StatementPolicy};
use crate::storage::{read_csv_from, BaselineSource, SchemaStore};
use crate::types::{
    IngestionSession, InsightError, NormalizedQuery, QueryResult, Relation, Result,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Question about one relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslateRequest {
    #[serde(alias = "table")]
    pub relation: String,
    pub question: String,
}

/// Answer to a [`TranslateRequest`].
///
/// `columns` and `rows` only ever appear together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TranslateResponse {
    Answer {
        query: String,
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    },
    Error {
        error: String,
    },
}

impl TranslateResponse {
    /// Successful answer.
    pub fn from_result(query: NormalizedQuery, result: QueryResult) -> Self {
        let (columns, rows) = result.into_parts();
        Self::Answer {
            query: query.into_string(),
            columns,
            rows,
        }
    }

    /// Failure, carrying only the user-facing message.
    pub fn from_error(error: &InsightError) -> Self {
        Self::Error {
            error: error.user_message(),
        }
    }
}

/// Chart request over a query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderRequest {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    /// `bar`, `pie` or `both`; anything else is insufficient data
    #[serde(alias = "chartKind")]
    pub graph_type: String,
}

/// One chart kind that could not be produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderFailure {
    pub kind: ChartKind,
    pub error: String,
}

/// Answer to a [`RenderRequest`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RenderResponse {
    Rendered {
        graph: ChartSelection,
        artifacts: Vec<ChartArtifact>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        errors: Vec<RenderFailure>,
    },
    Error {
        error: String,
    },
}

/// Answer to an upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadResponse {
    Success(String),
    Error(String),
}

/// Wires the schema store, prompt builder, translator, executor and visualizer.
pub struct Pipeline {
    store: SchemaStore,
    prompts: PromptBuilder,
    translator: QueryTranslator,
    executor: QueryExecutor,
    visualizer: ResultVisualizer,
    upload_dir: PathBuf,
    baseline: Option<BaselineSource>,
}

impl Pipeline {
    /// Create a pipeline.
    ///
    /// # Arguments
    ///
    /// * `store` - Schema store queries run against
    /// * `model` - Language model used for translation
    /// * `renderer` - Plotting backend
    ///
    /// # Returns
    ///
    /// Pipeline with an unrestricted executor and uploads under `./uploads`
    pub fn new(
        store: SchemaStore,
        model: Arc<dyn LanguageModel>,
        renderer: Arc<dyn ChartRenderer>,
    ) -> Self {
        Self {
            store,
            prompts: PromptBuilder::new().with_dialect("SQLite"),
            translator: QueryTranslator::new(model),
            executor: QueryExecutor::default(),
            visualizer: ResultVisualizer::new(renderer),
            upload_dir: PathBuf::from("uploads"),
            baseline: None,
        }
    }

    /// Build from configuration with the SVG renderer.
    ///
    /// # Errors
    ///
    /// Returns `InsightError::StorageError` if the database cannot be opened
    pub fn from_config(config: &InsightConfig, model: Arc<dyn LanguageModel>) -> Result<Self> {
        let store = SchemaStore::open(&config.database_path)?;
        let renderer = Arc::new(SvgRenderer::new(&config.artifact_dir));

        Ok(Self::new(store, model, renderer)
            .with_policy(config.statement_policy)
            .with_uploads(&config.upload_dir, config.baseline()))
    }

    pub fn with_policy(mut self, policy: StatementPolicy) -> Self {
        self.executor = QueryExecutor::new(policy);
        self
    }

    /// Set where uploads are saved and which baseline is reloaded with them.
    pub fn with_uploads(mut self, upload_dir: impl Into<PathBuf>, baseline: Option<BaselineSource>) -> Self {
        self.upload_dir = upload_dir.into();
        self.baseline = baseline;
        self
    }

    pub fn store(&self) -> &SchemaStore {
        &self.store
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    /// Relation names currently in the store.
    pub fn relations(&self) -> Result<Vec<String>> {
        self.store.list_relations()
    }

    /// Attribute names of a relation.
    pub fn attributes(&self, relation: &str) -> Result<Vec<String>> {
        self.store.list_attributes(relation)
    }

    /// Translate a question and execute the resulting query.
    ///
    /// Runs [`Self::prompt_for`], [`Self::generate`] and [`Self::execute`] in turn.
    ///
    /// # Errors
    ///
    /// - `UnknownRelation` if the relation is not in the store
    /// - `TranslationError` if the model fails or returns nothing usable
    /// - `ExecutionError` if the query fails
    #[tracing::instrument(skip(self, request), fields(relation = %request.relation))]
    pub async fn translate(&self, request: &TranslateRequest) -> Result<(NormalizedQuery, QueryResult)> {
        let prompt = self.prompt_for(&request.relation)?;
        let query = self.generate(&prompt, &request.question).await?;
        let result = self.execute(&query)?;
        Ok((query, result))
    }

    /// Build the instruction for a relation from its stored attributes.
    ///
    /// Touches the store; callers on an async runtime should run it as blocking work.
    pub fn prompt_for(&self, relation: &str) -> Result<String> {
        let attributes = self.store.list_attributes(relation)?;
        Ok(self.prompts.build(relation, &attributes))
    }

    /// Ask the model for a query. No store access.
    pub async fn generate(&self, prompt: &str, question: &str) -> Result<NormalizedQuery> {
        self.translator.translate(prompt, question).await
    }

    /// Execute a normalized query against the store.
    pub fn execute(&self, query: &NormalizedQuery) -> Result<QueryResult> {
        self.executor.execute(query, &self.store)
    }

    /// [`Self::translate`] folded into a response.
    pub async fn answer(&self, request: &TranslateRequest) -> TranslateResponse {
        match self.translate(request).await {
            Ok((query, result)) => TranslateResponse::from_result(query, result),
            Err(e) => {
                tracing::warn!(kind = e.kind(), error = %e, "question failed");
                TranslateResponse::from_error(&e)
            }
        }
    }

    /// Execute a query written by hand, bypassing translation.
    pub fn run_query(&self, sql: &str) -> Result<QueryResult> {
        let query = NormalizedQuery::new(sql)?;
        self.execute(&query)
    }

    /// Render charts for a result.
    ///
    /// Succeeds if at least one requested kind was produced; failed kinds are
    /// listed alongside the artifacts.
    pub fn chart(&self, request: &RenderRequest) -> RenderResponse {
        let rendered = request
            .graph_type
            .parse::<ChartSelection>()
            .and_then(|selection| {
                self.visualizer
                    .render(&request.columns, &request.rows, selection)
                    .map(|outcome| (selection, outcome))
            });

        match rendered {
            Ok((_, outcome)) if outcome.is_total_failure() => {
                let error = outcome
                    .failures
                    .first()
                    .map(|(_, e)| e.user_message())
                    .unwrap_or_else(|| "No chart was produced.".to_string());
                RenderResponse::Error { error }
            }
            Ok((selection, outcome)) => RenderResponse::Rendered {
                graph: selection,
                artifacts: outcome.artifacts,
                errors: outcome
                    .failures
                    .into_iter()
                    .map(|(kind, e)| RenderFailure {
                        kind,
                        error: e.user_message(),
                    })
                    .collect(),
            },
            Err(e) => {
                tracing::warn!(kind = e.kind(), error = %e, "chart request failed");
                RenderResponse::Error {
                    error: e.user_message(),
                }
            }
        }
    }

    /// Ingest an upload and save it into the upload directory.
    ///
    /// The bytes are staged under a hidden name, parsed and ingested. Only a
    /// successful cycle moves them to `<upload_dir>/<name>.csv`, so a rejected
    /// upload never replaces a file already there, baseline included.
    ///
    /// # Errors
    ///
    /// Returns `InsightError::IngestionError` if the name is unusable, the file
    /// is not a `.csv`, or the upload or baseline is malformed
    pub fn ingest_upload(
        &self,
        previous: IngestionSession,
        filename: &str,
        bytes: &[u8],
    ) -> Result<IngestionSession> {
        let name = sanitize_filename(filename)?;
        let target = self.upload_dir.join(&name);
        let relation = Relation::name_from_path(&target)
            .ok_or_else(|| InsightError::ingestion(format!("cannot derive relation name from {}", name)))?;

        fs::create_dir_all(&self.upload_dir)?;
        let staged = self.upload_dir.join(format!(".{}.part", name));
        fs::write(&staged, bytes)?;

        let cycle = fs::File::open(&staged)
            .map_err(InsightError::from)
            .and_then(|file| read_csv_from(&relation, file))
            .and_then(|parsed| {
                self.store
                    .replace_dataset(previous, parsed, &target, self.baseline.as_ref())
            });

        match &cycle {
            Ok(_) => match fs::rename(&staged, &target) {
                Ok(()) => tracing::info!(path = %target.display(), bytes = bytes.len(), "upload saved"),
                // store already committed, so the new session stands
                Err(e) => tracing::warn!(path = %target.display(), error = %e, "upload ingested but not saved"),
            },
            Err(_) => {
                let _ = fs::remove_file(&staged);
            }
        }
        cycle
    }

    /// Save and ingest an upload, producing the new session and a response.
    ///
    /// On failure the previous session is returned unchanged.
    pub fn upload(
        &self,
        previous: IngestionSession,
        filename: &str,
        bytes: &[u8],
    ) -> (IngestionSession, UploadResponse) {
        match self.ingest_upload(previous.clone(), filename, bytes) {
            Ok(session) => {
                let source = session.sources().last();
                let file = source
                    .and_then(|s| s.path.file_name())
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let relation = source.map(|s| s.relation.clone()).unwrap_or_default();
                let message = format!("Dataset {} uploaded and table {} created.", file, relation);
                (session, UploadResponse::Success(message))
            }
            Err(e) => {
                tracing::warn!(error = %e, "upload rejected");
                (previous, UploadResponse::Error(e.user_message()))
            }
        }
    }

    /// File names in the upload directory, sorted.
    pub fn list_datasets(&self) -> Result<Vec<String>> {
        list_datasets(&self.upload_dir)
    }
}

/// File names in `dir`, sorted. Hidden (staged) files are skipped and a
/// missing directory lists as empty.
pub fn list_datasets(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type()?.is_file() && !name.starts_with('.') {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Reduce an uploaded file name to a safe `.csv` basename.
///
/// Directory components are dropped, characters outside `[A-Za-z0-9._-]`
/// become `_`, and leading dots are removed. Dots inside the stem also become
/// `_`, since the stem is the relation name and SQL reads `a.b` as qualified.
///
/// # Errors
///
/// Returns `InsightError::IngestionError` if nothing usable remains or the
/// extension is not `.csv`
pub fn sanitize_filename(filename: &str) -> Result<String> {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();

    if cleaned.is_empty() {
        return Err(InsightError::ingestion("No selected file."));
    }

    let is_csv = Path::new(&cleaned)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    let has_stem = Path::new(&cleaned)
        .file_stem()
        .is_some_and(|stem| !stem.is_empty() && !stem.eq_ignore_ascii_case("csv"));
    if !is_csv || !has_stem {
        return Err(InsightError::ingestion(format!(
            "'{}' is not a .csv file",
            cleaned
        )));
    }

    let (stem, extension) = cleaned.split_at(cleaned.len() - ".csv".len());
    Ok(format!("{}{}", stem.replace('.', "_"), extension))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::ChartData;
    use async_trait::async_trait;
    use serde_json::json;
    use tempfile::tempdir;

    struct FixedModel(&'static str);

    #[async_trait]
    impl LanguageModel for FixedModel {
        async fn generate(&self, _instruction: &str, _question: &str) -> Result<String> {
            Ok(self.0.to_string())
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    struct PieFails {
        bar: PathBuf,
    }

    impl ChartRenderer for PieFails {
        fn render_bar(&self, _data: &ChartData) -> Result<PathBuf> {
            Ok(self.bar.clone())
        }

        fn render_pie(&self, _data: &ChartData) -> Result<PathBuf> {
            Err(InsightError::render("backend fault"))
        }
    }

    fn pipeline(dir: &Path, answer: &'static str) -> Pipeline {
        let csv = dir.join("sales.csv");
        fs::write(&csv, "region,revenue\nnorth,100\nsouth,250\neast,75\n").unwrap();
        let store = SchemaStore::open(dir.join("dataset.db")).unwrap();
        store.ingest(&csv).unwrap();

        let renderer = Arc::new(PieFails {
            bar: dir.join("bar_chart.svg"),
        });
        Pipeline::new(store, Arc::new(FixedModel(answer)), renderer)
            .with_uploads(dir.join("uploads"), None)
    }

    fn ask(relation: &str) -> TranslateRequest {
        TranslateRequest {
            relation: relation.to_string(),
            question: "revenue by region".to_string(),
        }
    }

    #[tokio::test]
    async fn test_answer_normalizes_fenced_query() {
        let dir = tempdir().unwrap();
        let p = pipeline(dir.path(), "```sql\nSELECT * FROM sales\n```");

        match p.answer(&ask("sales")).await {
            TranslateResponse::Answer { query, columns, rows } => {
                assert_eq!(query, "SELECT * FROM sales");
                assert_eq!(columns, vec!["region", "revenue"]);
                assert_eq!(rows.len(), 3);
            }
            other => panic!("expected answer, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_answer_errors_are_messages_only() {
        let dir = tempdir().unwrap();
        let p = pipeline(dir.path(), "SELECT * FROM nowhere");

        let response = p.answer(&ask("sales")).await;
        let body = serde_json::to_value(&response).unwrap();
        assert_eq!(body, json!({"error": "Failed to execute query or no results found."}));

        let response = p.answer(&ask("ghosts")).await;
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"error": "Unknown table: ghosts"})
        );
    }

    #[tokio::test]
    async fn test_empty_model_output_is_translation_error() {
        let dir = tempdir().unwrap();
        let p = pipeline(dir.path(), "```\n```");
        let result = p.translate(&ask("sales")).await;
        assert!(matches!(result, Err(InsightError::TranslationError(_))));
    }

    #[test]
    fn test_request_aliases() {
        let request: TranslateRequest =
            serde_json::from_value(json!({"table": "sales", "question": "total?"})).unwrap();
        assert_eq!(request.relation, "sales");

        let request: RenderRequest = serde_json::from_value(json!({
            "columns": ["region", "revenue"],
            "rows": [["north", 1]],
            "chartKind": "pie"
        }))
        .unwrap();
        assert_eq!(request.graph_type, "pie");
    }

    #[test]
    fn test_chart_both_reports_partial_failure() {
        let dir = tempdir().unwrap();
        let p = pipeline(dir.path(), "");

        let response = p.chart(&RenderRequest {
            columns: vec!["region".to_string(), "revenue".to_string()],
            rows: vec![vec![json!("north"), json!(100)]],
            graph_type: "both".to_string(),
        });

        let body = serde_json::to_value(&response).unwrap();
        assert_eq!(body["graph"], "both");
        assert_eq!(body["artifacts"][0]["kind"], "bar");
        assert_eq!(body["errors"][0]["kind"], "pie");
    }

    #[test]
    fn test_chart_rejects_unknown_kind_and_narrow_results() {
        let dir = tempdir().unwrap();
        let p = pipeline(dir.path(), "");
        let message = "Invalid graph type or insufficient data for plotting.";

        let unknown = p.chart(&RenderRequest {
            columns: vec!["a".to_string(), "b".to_string()],
            rows: vec![],
            graph_type: "scatter".to_string(),
        });
        assert_eq!(unknown, RenderResponse::Error { error: message.to_string() });

        let narrow = p.chart(&RenderRequest {
            columns: vec!["total".to_string()],
            rows: vec![vec![json!(425)]],
            graph_type: "bar".to_string(),
        });
        assert_eq!(narrow, RenderResponse::Error { error: message.to_string() });
    }

    #[test]
    fn test_chart_total_failure_is_error() {
        let dir = tempdir().unwrap();
        let p = pipeline(dir.path(), "");
        let response = p.chart(&RenderRequest {
            columns: vec!["region".to_string(), "revenue".to_string()],
            rows: vec![vec![json!("north"), json!(100)]],
            graph_type: "pie".to_string(),
        });
        assert!(matches!(response, RenderResponse::Error { .. }));
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("sales.csv").unwrap(), "sales.csv");
        assert_eq!(sanitize_filename("../../etc/q1 sales.csv").unwrap(), "q1_sales.csv");
        assert_eq!(sanitize_filename("C:\\data\\Housing.CSV").unwrap(), "Housing.CSV");
        assert_eq!(sanitize_filename("..hidden.csv").unwrap(), "hidden.csv");
        assert_eq!(sanitize_filename("q1.sales.csv").unwrap(), "q1_sales.csv");
        assert_eq!(sanitize_filename("a..b.CSV").unwrap(), "a__b.CSV");
        assert!(sanitize_filename("").is_err());
        assert!(sanitize_filename("notes.txt").is_err());
        assert!(sanitize_filename(".csv").is_err());
    }

    #[test]
    fn test_upload_replaces_dataset() {
        let dir = tempdir().unwrap();
        let p = pipeline(dir.path(), "");

        let (session, response) = p.upload(
            IngestionSession::new(),
            "housing.csv",
            b"city,price\nparis,10\nlyon,5\n",
        );
        assert_eq!(
            response,
            UploadResponse::Success("Dataset housing.csv uploaded and table housing created.".to_string())
        );
        assert_eq!(session.relations(), vec!["housing"]);
        assert_eq!(p.relations().unwrap(), vec!["housing"]);
        assert_eq!(p.list_datasets().unwrap(), vec!["housing.csv"]);
        assert_eq!(p.upload_dir(), dir.path().join("uploads"));
        assert_eq!(p.store().path(), dir.path().join("dataset.db"));
    }

    #[test]
    fn test_dotted_upload_name_is_queryable() {
        let dir = tempdir().unwrap();
        let p = pipeline(dir.path(), "");

        let (session, response) =
            p.upload(IngestionSession::new(), "q1.sales.csv", b"region,revenue
north,100
");
        assert!(matches!(response, UploadResponse::Success(_)));
        assert_eq!(session.relations(), vec!["q1_sales"]);

        let result = p.run_query("SELECT revenue FROM q1_sales").unwrap();
        assert_eq!(result.row_count(), 1);
        assert!(p.prompt_for("q1_sales").unwrap().contains("table named q1_sales"));
    }

    #[test]
    fn test_rejected_baseline_upload_keeps_saved_baseline() {
        let dir = tempdir().unwrap();
        let uploads = dir.path().join("uploads");
        let p = pipeline(dir.path(), "")
            .with_uploads(&uploads, Some(BaselineSource::in_dir(&uploads, "housing")));
        let housing = "city,price\nparis,10\nlyon,5\n";

        let (session, response) = p.upload(IngestionSession::new(), "housing.csv", housing.as_bytes());
        assert!(matches!(response, UploadResponse::Success(_)));

        let (session, response) = p.upload(session, "housing.csv", b"city,price\nparis\n");
        assert!(matches!(response, UploadResponse::Error(_)));
        assert_eq!(session.relations(), vec!["housing"]);
        assert_eq!(p.relations().unwrap(), vec!["housing"]);
        assert_eq!(fs::read_to_string(uploads.join("housing.csv")).unwrap(), housing);
        assert_eq!(p.list_datasets().unwrap(), vec!["housing.csv"]);

        let (session, response) = p.upload(session, "sales.csv", b"region,revenue\nnorth,100\n");
        assert!(matches!(response, UploadResponse::Success(_)));
        assert_eq!(session.relations(), vec!["housing", "sales"]);
        let mut relations = p.relations().unwrap();
        relations.sort();
        assert_eq!(relations, vec!["housing", "sales"]);
        assert_eq!(p.attributes("housing").unwrap(), vec!["city", "price"]);
    }

    #[test]
    fn test_failed_upload_keeps_previous_session() {
        let dir = tempdir().unwrap();
        let p = pipeline(dir.path(), "");

        let (session, _) = p.upload(IngestionSession::new(), "housing.csv", b"city,price\nparis,10\n");
        let (after, response) = p.upload(session, "broken.csv", b"");

        assert!(matches!(response, UploadResponse::Error(_)));
        assert_eq!(after.relations(), vec!["housing"]);
        assert_eq!(p.relations().unwrap(), vec!["housing"]);
    }

    #[test]
    fn test_list_datasets_missing_dir() {
        let dir = tempdir().unwrap();
        assert!(list_datasets(&dir.path().join("nope")).unwrap().is_empty());
    }
}
