//! HTTP surface.
//!
//! Every failure is reported as HTTP 200 with `{ "error": ... }`, so clients
//! only ever branch on the body.

use crate::chart::svg::read_artifact;
use crate::chart::ChartKind;
use crate::pipeline::{
    Pipeline, RenderRequest, RenderResponse, TranslateRequest, TranslateResponse, UploadResponse,
};
use crate::types::{IngestionSession, InsightError, Result};
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
    session: Arc<Mutex<IngestionSession>>,
    artifact_dir: PathBuf,
}

impl AppState {
    pub fn new(pipeline: Pipeline, artifact_dir: impl Into<PathBuf>) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            session: Arc::new(Mutex::new(IngestionSession::new())),
            artifact_dir: artifact_dir.into(),
        }
    }

    /// Sources loaded by the most recent upload.
    pub async fn session(&self) -> IngestionSession {
        self.session.lock().await.clone()
    }
}

#[derive(Debug, Deserialize)]
struct ColumnsRequest {
    table: String,
}

/// Build the router.
///
/// # Arguments
///
/// * `state` - Pipeline and session shared by all handlers
/// * `upload_limit_bytes` - Largest accepted multipart body
pub fn router(state: AppState, upload_limit_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/llm", get(relations_handler))
        .route("/llm/get_columns", post(columns_handler))
        .route("/llm/generate_query", post(generate_query_handler))
        .route("/llm/generate_graph", post(generate_graph_handler))
        .route(
            "/llm/upload_dataset",
            post(upload_handler).layer(DefaultBodyLimit::max(upload_limit_bytes)),
        )
        .route("/llm/get_datasets", get(datasets_handler))
        .route("/llm/artifacts/:kind", get(artifact_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
///
/// # Errors
///
/// Returns `InsightError::IoError` if the address cannot be bound
pub async fn serve(state: AppState, addr: &str, upload_limit_bytes: usize) -> Result<()> {
    let app = router(state, upload_limit_bytes);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr, "insight server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

fn error_body(error: &InsightError) -> Json<Value> {
    Json(json!({ "error": error.user_message() }))
}

/// Run blocking store work off the async executor.
async fn blocking<T, F>(state: &AppState, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&Pipeline) -> Result<T> + Send + 'static,
{
    let pipeline = state.pipeline.clone();
    tokio::task::spawn_blocking(move || work(&pipeline))
        .await
        .map_err(|e| InsightError::InternalError(format!("worker task failed: {}", e)))?
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn relations_handler(State(state): State<AppState>) -> Json<Value> {
    match blocking(&state, |p| p.relations()).await {
        Ok(relations) => Json(json!(relations)),
        Err(e) => {
            tracing::warn!(error = %e, "listing relations failed");
            error_body(&e)
        }
    }
}

async fn columns_handler(
    State(state): State<AppState>,
    Json(request): Json<ColumnsRequest>,
) -> Json<Value> {
    let table = request.table;
    match blocking(&state, move |p| p.attributes(&table)).await {
        Ok(columns) => Json(json!(columns)),
        Err(e) => {
            tracing::warn!(error = %e, "listing columns failed");
            error_body(&e)
        }
    }
}

/// Prompt and execution touch SQLite and run as blocking work; only the
/// model call is awaited on the executor.
async fn generate_query_handler(
    State(state): State<AppState>,
    Json(request): Json<TranslateRequest>,
) -> Json<TranslateResponse> {
    let relation = request.relation.clone();
    let answered = async {
        let prompt = blocking(&state, move |p| p.prompt_for(&relation)).await?;
        let query = state.pipeline.generate(&prompt, &request.question).await?;
        let executed = query.clone();
        let result = blocking(&state, move |p| p.execute(&executed)).await?;
        Ok::<_, InsightError>((query, result))
    }
    .await;

    match answered {
        Ok((query, result)) => Json(TranslateResponse::from_result(query, result)),
        Err(e) => {
            tracing::warn!(kind = e.kind(), error = %e, "question failed");
            Json(TranslateResponse::from_error(&e))
        }
    }
}

async fn generate_graph_handler(
    State(state): State<AppState>,
    Json(request): Json<RenderRequest>,
) -> Json<Value> {
    let rendered = blocking(&state, move |p| Ok(p.chart(&request))).await;
    match rendered.and_then(|response: RenderResponse| Ok(serde_json::to_value(response)?)) {
        Ok(body) => Json(body),
        Err(e) => error_body(&e),
    }
}

async fn upload_handler(State(state): State<AppState>, mut multipart: Multipart) -> Json<Value> {
    let mut upload: Option<(String, Vec<u8>)> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "malformed multipart body");
                return Json(json!({ "error": format!("Failed to read upload: {}", e) }));
            }
        };
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        match field.bytes().await {
            Ok(bytes) => upload = Some((filename, bytes.to_vec())),
            Err(e) => return Json(json!({ "error": format!("Failed to read file data: {}", e) })),
        }
    }

    let Some((filename, bytes)) = upload else {
        return Json(json!({ "error": "No file part in the request." }));
    };

    // held across the cycle so two uploads never interleave their drop/ingest steps
    let mut session = state.session.lock().await;
    let previous = session.clone();
    let outcome = blocking(&state, move |p| Ok(p.upload(previous, &filename, &bytes))).await;

    match outcome {
        Ok((next, response)) => {
            *session = next;
            match response {
                UploadResponse::Success(message) => Json(json!({ "success": message })),
                UploadResponse::Error(error) => Json(json!({ "error": error })),
            }
        }
        Err(e) => error_body(&e),
    }
}

async fn datasets_handler(State(state): State<AppState>) -> Json<Value> {
    match blocking(&state, |p| p.list_datasets()).await {
        Ok(names) => Json(json!(names)),
        Err(e) => error_body(&e),
    }
}

async fn artifact_handler(State(state): State<AppState>, Path(kind): Path<String>) -> Response {
    let kind = match kind.trim_end_matches(".svg") {
        "bar" | "bar_chart" => ChartKind::Bar,
        "pie" | "pie_chart" => ChartKind::Pie,
        other => {
            return (StatusCode::NOT_FOUND, format!("unknown chart kind '{}'", other)).into_response()
        }
    };

    match read_artifact(&state.artifact_dir, kind) {
        Ok(svg) => ([(header::CONTENT_TYPE, "image/svg+xml")], svg).into_response(),
        Err(_) => (StatusCode::NOT_FOUND, format!("no {} chart rendered yet", kind)).into_response(),
    }
}
