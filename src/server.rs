//! JSON HTTP API over the stored-values operations.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Server liveness (returns version) |
//! | `GET`  | `/values/{data_source_id}/health` | Whether the tenant's values table exists |
//! | `POST` | `/values/{data_source_id}/search` | Similarity search, optionally filtered |
//! | `POST` | `/values/{data_source_id}/search/targets` | Fan-out search across targets |
//! | `POST` | `/embeddings` | Embed search terms |
//! | `POST` | `/datasets/columns` | Searchable targets of a dataset definition |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "limit must be between 1 and 1000, got 0" } }
//! ```
//!
//! Error codes: `bad_request` (400), `timeout` (408), `storage_error` (500),
//! `embedding_error` (502), `cancelled` (503).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::Config;
use crate::dataset::extract_searchable_columns;
use crate::embedding::{create_provider, generate_embedding, EmbeddingProvider};
use crate::error::{ErrorKind, StoredValuesError};
use crate::fanout::{search_across_targets_with_report, FanOutReport};
use crate::health::health_check;
use crate::models::{SearchTarget, StoredValueResult};
use crate::query::ValueFilters;
use crate::schema::TenantNamespace;
use crate::search::{search_by_embedding, search_by_embedding_with_filters};
use crate::store::postgres::PgValueStore;
use crate::store::ValueStore;
use crate::validate::{EmbeddingOptions, SearchOptions};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ValueStore>,
    pub provider: Arc<dyn EmbeddingProvider>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn ValueStore>,
        provider: Arc<dyn EmbeddingProvider>,
        config: Config,
    ) -> Self {
        Self {
            store,
            provider,
            config: Arc::new(config),
        }
    }
}

/// Builds the router with all routes and the CORS layer.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/values/{data_source_id}/health", get(handle_value_health))
        .route("/values/{data_source_id}/search", post(handle_search))
        .route(
            "/values/{data_source_id}/search/targets",
            post(handle_search_targets),
        )
        .route("/embeddings", post(handle_embeddings))
        .route("/datasets/columns", post(handle_dataset_columns))
        .layer(cors)
        .with_state(state)
}

/// Connects to Postgres, builds the embedding provider, and serves until
/// the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = crate::db::connect(config).await?;
    let provider = create_provider(&config.embedding)?;

    let state = AppState::new(
        Arc::new(PgValueStore::new(pool)),
        Arc::from(provider),
        config.clone(),
    );

    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(bind = %bind_addr, "stored values server listening");

    axum::serve(listener, router(state)).await?;
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
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<StoredValuesError> for AppError {
    fn from(err: StoredValuesError) -> Self {
        let (status, code) = match err.kind() {
            ErrorKind::Validation | ErrorKind::Parse => (StatusCode::BAD_REQUEST, "bad_request"),
            ErrorKind::Storage => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
            ErrorKind::Embedding => (StatusCode::BAD_GATEWAY, "embedding_error"),
            ErrorKind::Cancelled => (StatusCode::SERVICE_UNAVAILABLE, "cancelled"),
        };
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

fn timeout_error(secs: u64) -> AppError {
    AppError {
        status: StatusCode::REQUEST_TIMEOUT,
        code: "timeout",
        message: format!("search timed out after {}s", secs),
    }
}

/// Applies `search.query_timeout_secs` around one search.
async fn with_query_timeout<T, F>(secs: Option<u64>, fut: F) -> Result<T, AppError>
where
    F: Future<Output = crate::error::Result<T>>,
{
    match secs {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), fut)
            .await
            .map_err(|_| timeout_error(secs))?
            .map_err(AppError::from),
        None => fut.await.map_err(AppError::from),
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

// ============ GET /values/{id}/health ============

#[derive(Serialize)]
struct ValueHealthResponse {
    data_source_id: String,
    namespace: String,
    table_exists: bool,
}

async fn handle_value_health(
    State(state): State<AppState>,
    Path(data_source_id): Path<String>,
) -> Result<Json<ValueHealthResponse>, AppError> {
    let table_exists = health_check(state.store.as_ref(), &data_source_id).await?;
    let namespace = TenantNamespace::parse(&data_source_id)?;

    Ok(Json(ValueHealthResponse {
        data_source_id,
        namespace: namespace.as_str().to_string(),
        table_exists,
    }))
}

// ============ POST /values/{id}/search ============

#[derive(Deserialize)]
struct SearchRequest {
    embedding: Vec<f32>,
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default, rename = "similarityThreshold")]
    similarity_threshold: Option<f64>,
    #[serde(flatten)]
    filters: ValueFilters,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<StoredValueResult>,
}

/// Runs a filtered search when any filter is present, a plain one otherwise.
async fn handle_search(
    State(state): State<AppState>,
    Path(data_source_id): Path<String>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    let options = SearchOptions {
        limit: req.limit.unwrap_or(state.config.search.default_limit),
        similarity_threshold: req.similarity_threshold,
    };
    let store = state.store.as_ref();
    let timeout = state.config.search.query_timeout_secs;

    let results = if req.filters.is_empty() {
        with_query_timeout(
            timeout,
            search_by_embedding(store, &data_source_id, &req.embedding, &options),
        )
        .await?
    } else {
        with_query_timeout(
            timeout,
            search_by_embedding_with_filters(
                store,
                &data_source_id,
                &req.embedding,
                &options,
                &req.filters,
            ),
        )
        .await?
    };

    Ok(Json(SearchResponse { results }))
}

// ============ POST /values/{id}/search/targets ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetSearchRequest {
    embedding: Vec<f32>,
    targets: Vec<SearchTarget>,
    #[serde(default)]
    limit_per_target: Option<i64>,
    #[serde(default)]
    similarity_threshold: Option<f64>,
}

async fn handle_search_targets(
    State(state): State<AppState>,
    Path(data_source_id): Path<String>,
    Json(req): Json<TargetSearchRequest>,
) -> Result<Json<FanOutReport>, AppError> {
    let limit_per_target = req
        .limit_per_target
        .unwrap_or(state.config.search.default_limit_per_target);
    let options = SearchOptions {
        limit: limit_per_target,
        similarity_threshold: req.similarity_threshold,
    };

    let report = with_query_timeout(
        state.config.search.query_timeout_secs,
        search_across_targets_with_report(
            state.store.as_ref(),
            &data_source_id,
            &req.embedding,
            &req.targets,
            limit_per_target,
            &options,
        ),
    )
    .await?;

    Ok(Json(report))
}

// ============ POST /embeddings ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmbeddingRequest {
    terms: Vec<String>,
    #[serde(default)]
    max_retries: Option<u32>,
}

#[derive(Serialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
    model: String,
    dims: usize,
}

async fn handle_embeddings(
    State(state): State<AppState>,
    Json(req): Json<EmbeddingRequest>,
) -> Result<Json<EmbeddingResponse>, AppError> {
    let options = EmbeddingOptions {
        max_retries: req
            .max_retries
            .unwrap_or(state.config.embedding.max_retries),
        ..EmbeddingOptions::default()
    };

    let provider = state.provider.as_ref();
    let embedding = generate_embedding(provider, &req.terms, &options).await?;
    Ok(Json(EmbeddingResponse {
        embedding,
        model: provider.model_name().to_string(),
        dims: provider.dims(),
    }))
}

// ============ POST /datasets/columns ============

#[derive(Deserialize)]
struct DatasetColumnsRequest {
    content: String,
}

#[derive(Serialize)]
struct DatasetColumnsResponse {
    targets: Vec<SearchTarget>,
}

async fn handle_dataset_columns(
    Json(req): Json<DatasetColumnsRequest>,
) -> Result<Json<DatasetColumnsResponse>, AppError> {
    let targets = extract_searchable_columns(&req.content)?;
    Ok(Json(DatasetColumnsResponse { targets }))
}
