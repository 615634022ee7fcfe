//! HTTP server for the analytics API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/api/v1/semantic/scatter` | 2D projection of execution vectors |
//! | `GET`  | `/api/v1/semantic/bottleneck` | Latency clusters |
//! | `GET`  | `/api/v1/semantic/coverage` | Reference coverage score + scatter |
//! | `GET`  | `/api/v1/semantic/hallucinations` | Outlier successful executions |
//! | `GET`  | `/api/v1/semantic/error-clusters` | Clusters of failed executions |
//! | `GET`  | `/api/v1/semantic/recommend/{function_name}` | Discovery/steady candidates |
//! | `GET`  | `/api/v1/drift/summary` | Per-function drift verdicts |
//! | `POST` | `/api/v1/drift/simulate` | Drift check for free text |
//! | `GET`  | `/api/v1/golden` | List reference records |
//! | `POST` | `/api/v1/golden` | Register an execution as a reference |
//! | `GET`  | `/api/v1/golden/stats` | Reference counts per function |
//! | `DELETE` | `/api/v1/golden/{id}` | Delete a reference record |
//!
//! Every analysis route accepts `store=<name>` to select a store from
//! `[stores]`; without it, `[db]` is used.
//!
//! # Error Contract
//!
//! Analysis failures (store unreachable, provider not configured, unknown
//! curation target) are returned as `200` with the envelope's `error`
//! object next to an empty body. Requests that cannot be understood at
//! all are `400`:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "unknown store: 'prod'" } }
//! ```

use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use vector_surfer_core::analysis::bottleneck::{self, BottleneckRequest};
use vector_surfer_core::analysis::coverage::{self, CoverageRequest};
use vector_surfer_core::analysis::drift::{self, DriftSummaryRequest, SimulateRequest};
use vector_surfer_core::analysis::errors::{self, ErrorClusterRequest};
use vector_surfer_core::analysis::hallucination::{self, HallucinationRequest};
use vector_surfer_core::analysis::recommend::{self, RecommendRequest};
use vector_surfer_core::analysis::scatter::{self, ScatterRequest};
use vector_surfer_core::analysis::{AnalysisSettings, Report};
use vector_surfer_core::embedding::EmbeddingProvider;
use vector_surfer_core::golden::{self, RegisterRequest};
use vector_surfer_core::AnalysisError;

use crate::analyze::limits;
use crate::client_cache::HandleCache;
use crate::config::{Config, DEFAULT_STORE};
use crate::embedding::create_provider;
use crate::sqlite_store::SqliteStore;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    cache: Arc<HandleCache>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl AppState {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            cache: Arc::new(HandleCache::new(&config.cache)),
            embedder: create_provider(&config.embedding)?,
            config: Arc::new(config.clone()),
        })
    }

    fn settings(&self) -> AnalysisSettings {
        self.config.analysis.clone()
    }

    /// Resolve the store, run `analysis` against it, and wrap the outcome.
    ///
    /// An unknown store name is a malformed request; failing to open a
    /// known store is reported like any other fetch failure.
    async fn run<T, F, Fut>(
        &self,
        store: Option<&str>,
        name: &str,
        analysis: F,
    ) -> Result<Json<Report<T>>, AppError>
    where
        T: Serialize + Default,
        F: FnOnce(Arc<SqliteStore>) -> Fut,
        Fut: Future<Output = Result<T, AnalysisError>>,
    {
        let path = self
            .config
            .store_path(store)
            .map_err(|e| bad_request(e.to_string()))?;
        let key = store.unwrap_or(DEFAULT_STORE);
        let result = match self.cache.get_or_open(key, path).await {
            Ok(db) => analysis(db).await,
            Err(e) => Err(AnalysisError::Fetch(e)),
        };
        Ok(Json(Report::from_result(name, result)))
    }
}

/// Build the router with all routes, CORS, and request tracing.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/v1/semantic/scatter", get(handle_scatter))
        .route("/api/v1/semantic/bottleneck", get(handle_bottleneck))
        .route("/api/v1/semantic/coverage", get(handle_coverage))
        .route("/api/v1/semantic/hallucinations", get(handle_hallucinations))
        .route("/api/v1/semantic/error-clusters", get(handle_error_clusters))
        .route(
            "/api/v1/semantic/recommend/{function_name}",
            get(handle_recommend),
        )
        .route("/api/v1/drift/summary", get(handle_drift_summary))
        .route("/api/v1/drift/simulate", post(handle_drift_simulate))
        .route(
            "/api/v1/golden",
            get(handle_golden_list).post(handle_golden_register),
        )
        .route("/api/v1/golden/stats", get(handle_golden_stats))
        .route("/api/v1/golden/{id}", delete(handle_golden_delete))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` and runs until the process is
/// terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let app = router(AppState::new(config)?);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "vector-surfer listening");
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

/// Internal error type that converts into an Axum HTTP response.
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

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, AppError> {
    query
        .map(|Query(params)| params)
        .map_err(|e| bad_request(e.body_text()))
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

// ============ Semantic analyses ============

#[derive(Debug, Deserialize)]
struct ScatterParams {
    function_name: Option<String>,
    limit: Option<usize>,
    store: Option<String>,
}

async fn handle_scatter(
    State(state): State<AppState>,
    query: Result<Query<ScatterParams>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let params = query_params(query)?;
    let req = ScatterRequest {
        function_name: params.function_name,
        limit: limits::limit(
            params.limit.unwrap_or(ScatterRequest::default().limit),
            limits::SCATTER_MAX,
        ),
    };
    state
        .run(params.store.as_deref(), "scatter", |db| async move {
            scatter::input_scatter(&*db, &req).await
        })
        .await
}

#[derive(Debug, Deserialize)]
struct BottleneckParams {
    function_name: Option<String>,
    n_clusters: Option<usize>,
    limit: Option<usize>,
    store: Option<String>,
}

async fn handle_bottleneck(
    State(state): State<AppState>,
    query: Result<Query<BottleneckParams>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let params = query_params(query)?;
    let defaults = BottleneckRequest::default();
    let req = BottleneckRequest {
        function_name: params.function_name,
        n_clusters: limits::clusters(params.n_clusters.unwrap_or(defaults.n_clusters)),
        limit: limits::limit(
            params.limit.unwrap_or(defaults.limit),
            limits::BOTTLENECK_MAX,
        ),
    };
    let settings = state.settings();
    state
        .run(params.store.as_deref(), "bottleneck", |db| async move {
            bottleneck::bottleneck_clusters(&*db, &req, &settings).await
        })
        .await
}

#[derive(Debug, Deserialize)]
struct CoverageParams {
    function_name: Option<String>,
    limit: Option<usize>,
    store: Option<String>,
}

async fn handle_coverage(
    State(state): State<AppState>,
    query: Result<Query<CoverageParams>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let params = query_params(query)?;
    let req = CoverageRequest {
        function_name: params.function_name,
        limit: limits::limit(
            params.limit.unwrap_or(CoverageRequest::default().limit),
            limits::COVERAGE_MAX,
        ),
    };
    let settings = state.settings();
    state
        .run(params.store.as_deref(), "coverage", |db| async move {
            coverage::golden_coverage(&*db, &req, &settings).await
        })
        .await
}

#[derive(Debug, Deserialize)]
struct HallucinationParams {
    function_name: Option<String>,
    threshold: Option<f64>,
    limit: Option<usize>,
    store: Option<String>,
}

async fn handle_hallucinations(
    State(state): State<AppState>,
    query: Result<Query<HallucinationParams>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let params = query_params(query)?;
    let defaults = HallucinationRequest::default();
    let req = HallucinationRequest {
        function_name: params.function_name,
        threshold: limits::threshold(
            params.threshold.unwrap_or(defaults.threshold),
            defaults.threshold,
        ),
        limit: limits::limit(
            params.limit.unwrap_or(defaults.limit),
            limits::HALLUCINATIONS_MAX,
        ),
    };
    let settings = state.settings();
    state
        .run(params.store.as_deref(), "hallucinations", |db| async move {
            hallucination::hallucination_candidates(&*db, &req, &settings).await
        })
        .await
}

#[derive(Debug, Deserialize)]
struct ErrorClusterParams {
    n_clusters: Option<usize>,
    limit: Option<usize>,
    store: Option<String>,
}

async fn handle_error_clusters(
    State(state): State<AppState>,
    query: Result<Query<ErrorClusterParams>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let params = query_params(query)?;
    let defaults = ErrorClusterRequest::default();
    let req = ErrorClusterRequest {
        n_clusters: limits::clusters(params.n_clusters.unwrap_or(defaults.n_clusters)),
        limit: limits::limit(
            params.limit.unwrap_or(defaults.limit),
            limits::ERROR_CLUSTERS_MAX,
        ),
    };
    state
        .run(params.store.as_deref(), "error_clusters", |db| async move {
            errors::error_clusters(&*db, &req).await
        })
        .await
}

#[derive(Debug, Deserialize)]
struct RecommendParams {
    limit: Option<usize>,
    store: Option<String>,
}

async fn handle_recommend(
    State(state): State<AppState>,
    Path(function_name): Path<String>,
    query: Result<Query<RecommendParams>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let params = query_params(query)?;
    let mut req = RecommendRequest::new(function_name);
    req.limit = limits::limit(params.limit.unwrap_or(req.limit), limits::RECOMMEND_MAX);
    let settings = state.settings();
    state
        .run(params.store.as_deref(), "recommend", |db| async move {
            recommend::recommend_with_diversity(&*db, &req, &settings).await
        })
        .await
}

// ============ Drift ============

#[derive(Debug, Deserialize)]
struct DriftSummaryParams {
    /// Comma-separated function names.
    functions: Option<String>,
    store: Option<String>,
}

async fn handle_drift_summary(
    State(state): State<AppState>,
    query: Result<Query<DriftSummaryParams>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let params = query_params(query)?;
    let functions: Vec<String> = params
        .functions
        .as_deref()
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    let req = DriftSummaryRequest {
        functions: (!functions.is_empty()).then_some(functions),
    };
    let settings = state.settings();
    state
        .run(params.store.as_deref(), "drift_summary", |db| async move {
            drift::drift_summary(&*db, &req, &settings).await
        })
        .await
}

#[derive(Debug, Deserialize)]
struct StoreParam {
    store: Option<String>,
}

async fn handle_drift_simulate(
    State(state): State<AppState>,
    query: Result<Query<StoreParam>, QueryRejection>,
    body: Result<Json<SimulateRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let params = query_params(query)?;
    let Json(req) = body.map_err(|e| bad_request(e.body_text()))?;
    if req.function_name.trim().is_empty() {
        return Err(bad_request("function_name must not be empty"));
    }
    if req.text.trim().is_empty() {
        return Err(bad_request("text must not be empty"));
    }
    let settings = state.settings();
    let req = SimulateRequest {
        threshold: req
            .threshold
            .map(|t| limits::threshold(t, settings.drift_threshold)),
        k: req.k.map(|k| k.max(1)),
        ..req
    };
    let embedder = state.embedder.clone();
    state
        .run(params.store.as_deref(), "drift_simulate", |db| async move {
            drift::simulate_drift(&*db, Some(&*embedder), &req, &settings).await
        })
        .await
}

// ============ Golden ============

#[derive(Debug, Deserialize)]
struct GoldenListParams {
    function_name: Option<String>,
    limit: Option<usize>,
    store: Option<String>,
}

async fn handle_golden_list(
    State(state): State<AppState>,
    query: Result<Query<GoldenListParams>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let params = query_params(query)?;
    let limit = limits::limit(
        params.limit.unwrap_or(state.config.analysis.reference_limit),
        limits::GOLDEN_LIST_MAX,
    );
    let function_name = params.function_name;
    state
        .run(params.store.as_deref(), "golden_list", |db| async move {
            golden::list(&*db, function_name.as_deref(), limit).await
        })
        .await
}

async fn handle_golden_register(
    State(state): State<AppState>,
    query: Result<Query<StoreParam>, QueryRejection>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let params = query_params(query)?;
    let Json(req) = body.map_err(|e| bad_request(e.body_text()))?;
    if req.execution_id.trim().is_empty() {
        return Err(bad_request("execution_id must not be empty"));
    }
    state
        .run(params.store.as_deref(), "golden_register", |db| async move {
            golden::register(&*db, &req).await.map(|mut record| {
                record.vector = None;
                Some(record)
            })
        })
        .await
}

async fn handle_golden_stats(
    State(state): State<AppState>,
    query: Result<Query<StoreParam>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let params = query_params(query)?;
    state
        .run(params.store.as_deref(), "golden_stats", |db| async move {
            golden::stats(&*db).await
        })
        .await
}

async fn handle_golden_delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: Result<Query<StoreParam>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let params = query_params(query)?;
    state
        .run(params.store.as_deref(), "golden_delete", |db| async move {
            golden::delete(&*db, &id).await
        })
        .await
}
