//! HTTP surface: router, handlers, and the API-key boundary check.
//!
//! The transport layer is deliberately thin — every decision about a
//! request's fate belongs to [`crate::orchestrator`]; this module only
//! extracts the upload, maps [`OcrError`] onto status codes via the pure
//! [`ErrorBody`] conversion, and enforces the two boundary concerns the
//! orchestration core must not know about: the pre-shared API key and the
//! per-request wall-clock budget.

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::backend::registry::Registry;
use crate::config::ServiceConfig;
use crate::document::UploadedDocument;
use crate::error::{ErrorBody, OcrError};
use crate::gpu;
use crate::orchestrator::Orchestrator;

/// Uploads above this size are rejected at the framework boundary.
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<Orchestrator>,
    api_key: Option<String>,
    limiter: Arc<Semaphore>,
}

impl AppState {
    /// State over the builtin backend list.
    pub fn new(config: ServiceConfig) -> Self {
        let registry = Registry::with_builtins(&config.enabled_backends);
        Self::with_registry(config, registry)
    }

    /// State over an explicit registry — the seam the integration tests
    /// use to substitute instrumented backends.
    pub fn with_registry(config: ServiceConfig, registry: Registry) -> Self {
        let limiter = Arc::new(Semaphore::new(config.concurrency));
        let api_key = config.api_key.clone();
        if api_key.is_none() {
            warn!("API_KEY not set; /ocr requests are unauthenticated");
        }
        Self {
            orchestrator: Arc::new(Orchestrator::new(Arc::new(registry), config)),
            api_key,
            limiter,
        }
    }
}

/// Build the service router.
///
/// `/services` and `/health` stay outside the API-key check so capability
/// and liveness probes work without credentials.
pub fn build_router(state: AppState) -> Router {
    let timeout = Duration::from_secs(
        state
            .orchestrator
            .config()
            .request_timeout_secs,
    );

    let protected = Router::new()
        .route("/ocr/{backend}", post(ocr))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    Router::new()
        .merge(protected)
        .route("/services", get(services))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(timeout))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

/// Bind and serve until the process exits.
pub async fn serve(config: ServiceConfig) -> Result<(), std::io::Error> {
    let addr = config.bind_addr();
    info!(
        addr = %addr,
        services = ?config.enabled_backends,
        auth = config.api_key.is_some(),
        "starting ocr service"
    );

    let app = build_router(AppState::new(config));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await
}

// ── Handlers ─────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct OcrResponse {
    text: String,
}

#[derive(Serialize)]
struct ServicesResponse {
    services: Vec<String>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    services: Vec<String>,
    gpu: gpu::GpuStatus,
}

async fn ocr(
    State(state): State<AppState>,
    Path(backend): Path<String>,
    multipart: Multipart,
) -> Response {
    // Bound in-flight work per worker; excess requests queue here rather
    // than piling onto the accelerator.
    let _permit = match state.limiter.clone().acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => return OcrError::Internal("request limiter closed".into()).into_response(),
    };

    let doc = match read_upload(multipart).await {
        Ok(doc) => doc,
        Err(response) => return response,
    };

    match state.orchestrator.handle(&backend, doc).await {
        Ok(text) => Json(OcrResponse { text }).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn services(State(state): State<AppState>) -> Json<ServicesResponse> {
    Json(ServicesResponse {
        services: state.orchestrator.registry().names(),
    })
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        services: state.orchestrator.registry().names(),
        gpu: gpu::probe().await,
    })
}

/// Pull the first file field out of the multipart body.
async fn read_upload(mut multipart: Multipart) -> Result<UploadedDocument, Response> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Err(invalid_request("no file field in upload")),
            Err(e) => return Err(invalid_request(&e.to_string())),
        };

        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };

        let data = field
            .bytes()
            .await
            .map_err(|e| invalid_request(&e.to_string()))?;
        return Ok(UploadedDocument::new(filename, data.to_vec()));
    }
}

fn invalid_request(detail: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "error": "invalid multipart upload",
            "details": { "error": detail },
            "type": "invalid_request",
        })),
    )
        .into_response()
}

// ── Auth ─────────────────────────────────────────────────────────────────

async fn require_api_key(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(expected) = state.api_key.as_deref() else {
        return next.run(req).await;
    };

    let provided = req
        .headers()
        .get("x-api-key")
        .and_then(|value| value.to_str().ok());

    if provided == Some(expected) {
        next.run(req).await
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "error": "Invalid or missing API Key",
                "details": {},
                "type": "unauthorized",
            })),
        )
            .into_response()
    }
}

impl IntoResponse for OcrError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorBody::from(&self))).into_response()
    }
}
