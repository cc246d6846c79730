//! JSON HTTP API over the engine registry.
//!
//! A thin transport: every handler resolves an [`Engine`] for the request's
//! connection string, sanitizes user text and delegates. Ingestion runs on a
//! spawned task and is observed through `/jobs`.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/query` | Answer `{connection_string, query, top_k?}` |
//! | `GET`  | `/query/history?connection_string=` | Recent queries, newest first |
//! | `GET`  | `/schema?connection_string=` | Current schema snapshot |
//! | `POST` | `/schema/refresh` | Re-introspect `{connection_string}` |
//! | `POST` | `/ingest` | Start indexing `{connection_string, paths}`; returns a job |
//! | `GET`  | `/jobs` | All ingestion jobs |
//! | `GET`  | `/jobs/{id}` | One ingestion job |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! When `connection_string` is omitted, `[db].url` from the config is used.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "validation_error", "message": "query must not be empty" } }
//! ```
//!
//! The code is [`ErrorKind::code`]; the status follows the kind (see
//! [`status_for`]). Unknown jobs are `404 not_found`.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::engine::Engine;
use crate::error::{EngineError, ErrorKind};
use crate::ingest::resolve_inputs;
use crate::jobs::{JobProgress, JobSink, JobStatus, JobTracker};
use crate::models::{HistoryRecord, QueryResponse};
use crate::registry::EngineRegistry;
use crate::sanitize::{validate_query, DEFAULT_MAX_LENGTH};
use crate::schema::SchemaSnapshot;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    registry: Arc<EngineRegistry>,
    jobs: Arc<JobTracker>,
}

impl AppState {
    pub fn new(registry: Arc<EngineRegistry>) -> Self {
        Self {
            registry,
            jobs: Arc::new(JobTracker::new()),
        }
    }

    async fn engine(&self, connection: Option<&str>) -> Result<Arc<Engine>, AppError> {
        let connection = connection
            .filter(|c| !c.trim().is_empty())
            .map(str::to_string)
            .or_else(|| self.registry.config().db.url.clone())
            .ok_or_else(|| bad_request("connection_string is required"))?;
        Ok(self.registry.get_engine(&connection).await?)
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/query", post(handle_query))
        .route("/query/history", get(handle_history))
        .route("/schema", get(handle_schema))
        .route("/schema/refresh", post(handle_schema_refresh))
        .route("/ingest", post(handle_ingest))
        .route("/jobs", get(handle_list_jobs))
        .route("/jobs/{id}", get(handle_get_job))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` and runs until terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let registry = Arc::new(EngineRegistry::new(config.clone()));
    let app = router(AppState::new(registry));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    println!("hq server listening on http://{}", bind_addr);
    tracing::info!("listening on {}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

/// HTTP status for each failure kind.
///
/// Caller mistakes (bad input, bad config, a statement the database
/// rejects) are 4xx; an unreachable database is 502; embedding and index
/// faults are 500.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation | ErrorKind::Configuration | ErrorKind::Execution => {
            StatusCode::BAD_REQUEST
        }
        ErrorKind::Extraction => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Connection => StatusCode::BAD_GATEWAY,
        ErrorKind::DimensionMismatch | ErrorKind::Embedding => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        let kind = err.kind();
        AppError {
            status: status_for(kind),
            code: kind.code().to_string(),
            message: err.to_string(),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: ErrorKind::Validation.code().to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /query ============

#[derive(Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    connection_string: Option<String>,
    query: String,
    #[serde(default)]
    top_k: Option<usize>,
}

async fn handle_query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, AppError> {
    let query = validate_query(&req.query, DEFAULT_MAX_LENGTH)?;
    let top_k = req
        .top_k
        .unwrap_or(state.registry.config().retrieval.top_k);
    if top_k == 0 {
        return Err(bad_request("top_k must be >= 1"));
    }

    let engine = state.engine(req.connection_string.as_deref()).await?;
    let response = engine.process_query(&query, top_k).await?;
    Ok(Json(response))
}

// ============ GET /query/history ============

#[derive(Deserialize)]
pub struct ConnectionParams {
    #[serde(default)]
    connection_string: Option<String>,
}

#[derive(Serialize)]
struct HistoryResponse {
    history: Vec<HistoryRecord>,
}

async fn handle_history(
    State(state): State<AppState>,
    Query(params): Query<ConnectionParams>,
) -> Result<Json<HistoryResponse>, AppError> {
    let engine = state.engine(params.connection_string.as_deref()).await?;
    Ok(Json(HistoryResponse {
        history: engine.get_history(),
    }))
}

// ============ /schema ============

async fn handle_schema(
    State(state): State<AppState>,
    Query(params): Query<ConnectionParams>,
) -> Result<Json<SchemaSnapshot>, AppError> {
    let engine = state.engine(params.connection_string.as_deref()).await?;
    Ok(Json(engine.schema().as_ref().clone()))
}

async fn handle_schema_refresh(
    State(state): State<AppState>,
    Json(params): Json<ConnectionParams>,
) -> Result<Json<SchemaSnapshot>, AppError> {
    let engine = state.engine(params.connection_string.as_deref()).await?;
    let snapshot = engine.refresh_schema().await?;
    Ok(Json(snapshot.as_ref().clone()))
}

// ============ POST /ingest ============

#[derive(Deserialize)]
pub struct IngestRequest {
    #[serde(default)]
    connection_string: Option<String>,
    paths: Vec<PathBuf>,
}

#[derive(Serialize)]
struct IngestAccepted {
    job_id: String,
    status: JobStatus,
    processed: u64,
    total_files: u64,
}

async fn handle_ingest(
    State(state): State<AppState>,
    Json(req): Json<IngestRequest>,
) -> Result<(StatusCode, Json<IngestAccepted>), AppError> {
    if req.paths.is_empty() {
        return Err(bad_request("paths must not be empty"));
    }
    let engine = state.engine(req.connection_string.as_deref()).await?;
    let files = resolve_inputs(&req.paths, &engine.config().ingest)?;

    let mut metadata = BTreeMap::new();
    if let Some(conn) = &req.connection_string {
        metadata.insert("connection_string".to_string(), conn.clone());
    }
    let job = state.jobs.create_job(files.len() as u64, metadata);
    let accepted = IngestAccepted {
        job_id: job.job_id.clone(),
        status: job.status,
        processed: job.processed,
        total_files: job.total,
    };

    let tracker = Arc::clone(&state.jobs);
    let job_id = job.job_id;
    tokio::spawn(async move {
        let sink = JobSink::new(Arc::clone(&tracker), job_id.clone());
        match engine.ingest_documents(&files, &sink).await {
            Ok(summary) => tracing::info!(
                "job {} indexed {} file(s), index size {}",
                job_id,
                summary.indexed,
                summary.vector_store_size
            ),
            Err(e) => {
                tracing::warn!("job {} failed: {}", job_id, e);
                tracker.fail(&job_id, e.to_string());
            }
        }
    });

    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

// ============ /jobs ============

#[derive(Serialize)]
struct JobListResponse {
    jobs: Vec<JobProgress>,
}

async fn handle_list_jobs(State(state): State<AppState>) -> Json<JobListResponse> {
    Json(JobListResponse {
        jobs: state.jobs.list_jobs(),
    })
}

async fn handle_get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobProgress>, AppError> {
    state
        .jobs
        .get_job(&id)
        .map(Json)
        .ok_or_else(|| not_found(format!("no job with id: {}", id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> AppState {
        AppState::new(Arc::new(EngineRegistry::new(Config::default())))
    }

    #[test]
    fn test_error_kind_status_mapping() {
        let err: AppError = EngineError::Validation("empty".into()).into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, "validation_error");

        let err: AppError = EngineError::Connection("refused".into()).into();
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);

        let err: AppError = EngineError::DimensionMismatch {
            expected: 4,
            actual: 2,
        }
        .into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code, "dimension_mismatch");
    }

    #[tokio::test]
    async fn test_query_without_connection_is_rejected() {
        let req = QueryRequest {
            connection_string: None,
            query: "How many employees do we have?".into(),
            top_k: None,
        };
        let err = handle_query(State(state()), Json(req)).await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.message.contains("connection_string"));
    }

    #[tokio::test]
    async fn test_query_is_sanitized_before_connecting() {
        let req = QueryRequest {
            connection_string: Some("sqlite:/nowhere/at/all.db".into()),
            query: "employees; DROP TABLE employees".into(),
            top_k: None,
        };
        let err = handle_query(State(state()), Json(req)).await.unwrap_err();
        assert_eq!(err.code, "validation_error");
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let err = handle_get_job(State(state()), Path("nope".into()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_ingest_job_completes() {
        let dir = tempfile::TempDir::new().unwrap();
        let db_path = dir.path().join("hr.db");
        let url = format!("sqlite:{}?mode=rwc", db_path.display());
        let pool = sqlx::SqlitePool::connect(&url).await.unwrap();
        sqlx::query("CREATE TABLE employees (id INTEGER PRIMARY KEY, name TEXT)")
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;

        let doc = dir.path().join("policy.txt");
        std::fs::write(&doc, "Remote work is allowed two days a week.").unwrap();

        let state = state();
        let req = IngestRequest {
            connection_string: Some(format!("sqlite:{}", db_path.display())),
            paths: vec![doc],
        };
        let (status, Json(accepted)) = handle_ingest(State(state.clone()), Json(req))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(accepted.total_files, 1);

        let mut job = None;
        for _ in 0..100 {
            let current = state.jobs.get_job(&accepted.job_id).unwrap();
            if current.status == JobStatus::Completed {
                job = Some(current);
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        let job = job.expect("ingest job did not complete");
        assert_eq!(job.processed, 1);
    }
}
