//! Axum-based HTTP server for the oven control surface.
//!
//! Provides REST endpoints for:
//! - GET `/api/latest` - Current oven state
//! - POST `/api/start` - Start a reflow cycle
//! - POST `/api/abort` - Abort the running cycle
//! - POST `/api/idle` - Return the controller to idle
//! - POST `/api/set` - Set the target temperature
//! - GET `/api/export` - Captured run log as CSV
//! - GET `/` - Dashboard (serves index.html)

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::bridge::OvenBridge;
use crate::config::WebConfig;
use crate::gateway::CommandGateway;
use crate::state::OvenState;

use super::api::{
    parse_set_request, AbortResponse, CommandResponse, ErrorResponse, SetResponse, BAD_SET_VALUE,
};

/// File name offered for the CSV download.
pub const EXPORT_FILE_NAME: &str = "reflow_log.csv";

// ============================================================================
// Route Handlers
// ============================================================================

/// Run a gateway call off the async workers; device writes may block.
async fn with_gateway<T, F>(bridge: Arc<OvenBridge>, f: F) -> Result<T, Response>
where
    T: Send + 'static,
    F: FnOnce(&CommandGateway) -> T + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(bridge.gateway()))
        .await
        .map_err(|e| {
            error!(error = %e, "Gateway task failed");
            internal_error("command task failed")
        })
}

fn internal_error(message: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new(message)),
    )
        .into_response()
}

/// GET /api/latest - Returns current oven state
async fn latest(State(bridge): State<Arc<OvenBridge>>) -> Json<OvenState> {
    Json(bridge.store().snapshot())
}

/// POST /api/start
async fn start(State(bridge): State<Arc<OvenBridge>>) -> Result<Json<CommandResponse>, Response> {
    let result = with_gateway(bridge, |gateway| gateway.start()).await?;
    Ok(Json(result.into()))
}

/// POST /api/abort
async fn abort(State(bridge): State<Arc<OvenBridge>>) -> Result<Json<AbortResponse>, Response> {
    let outcome = with_gateway(bridge, |gateway| gateway.abort()).await?;
    Ok(Json(outcome.into()))
}

/// POST /api/idle
async fn idle(State(bridge): State<Arc<OvenBridge>>) -> Result<Json<CommandResponse>, Response> {
    let result = with_gateway(bridge, |gateway| gateway.idle()).await?;
    Ok(Json(result.into()))
}

/// POST /api/set - Set the target temperature
///
/// Accepts JSON: `{"set": 180}` or `{"set": "180"}`.
async fn set(State(bridge): State<Arc<OvenBridge>>, body: Bytes) -> Response {
    let Some(value) = parse_set_request(&body) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(BAD_SET_VALUE)),
        )
            .into_response();
    };

    match with_gateway(bridge, move |gateway| gateway.set_setpoint(value)).await {
        Ok(outcome) => Json(SetResponse::from(outcome)).into_response(),
        Err(response) => response,
    }
}

/// GET /api/export - Download the captured run log
async fn export(State(bridge): State<Arc<OvenBridge>>) -> Response {
    match bridge.recorder().export_csv() {
        Ok(csv) => (
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", EXPORT_FILE_NAME),
                ),
            ],
            csv,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Run log export failed");
            internal_error("export failed")
        }
    }
}

/// GET / - Serve the dashboard
async fn index() -> impl IntoResponse {
    Html(include_str!("../../www/index.html"))
}

/// Fallback handler for 404
async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(ErrorResponse::new("not found")))
}

// ============================================================================
// Server Builder
// ============================================================================

/// Configuration for the web server
#[derive(Debug, Clone)]
pub struct WebServerConfig {
    /// Address to bind to
    pub addr: SocketAddr,
    /// Whether to enable CORS for all origins
    pub cors_permissive: bool,
}

impl Default for WebServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
            cors_permissive: true,
        }
    }
}

impl WebServerConfig {
    /// Create a new config with the given address
    pub fn new(addr: impl Into<SocketAddr>) -> Self {
        Self {
            addr: addr.into(),
            ..Default::default()
        }
    }

    /// Set whether CORS should be permissive
    pub fn cors(mut self, permissive: bool) -> Self {
        self.cors_permissive = permissive;
        self
    }

    /// Create from shared WebConfig
    pub fn from_config(config: &WebConfig) -> Result<Self, std::net::AddrParseError> {
        Ok(Self {
            addr: config.bind_addr().parse()?,
            cors_permissive: config.cors_permissive,
        })
    }
}

/// Build the Axum router with all routes
pub fn build_router(bridge: Arc<OvenBridge>, config: &WebServerConfig) -> Router {
    let mut router = Router::new()
        // API routes
        .route("/api/latest", get(latest))
        .route("/api/start", post(start))
        .route("/api/abort", post(abort))
        .route("/api/idle", post(idle))
        .route("/api/set", post(set))
        .route("/api/export", get(export))
        // Dashboard
        .route("/", get(index))
        // Fallback
        .fallback(not_found)
        .with_state(bridge)
        .layer(TraceLayer::new_for_http());

    if config.cors_permissive {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router
}

/// Serve the control surface until `shutdown` resolves.
pub async fn run_server<F>(
    bridge: Arc<OvenBridge>,
    config: WebServerConfig,
    shutdown: F,
) -> Result<(), std::io::Error>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let router = build_router(bridge, &config);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    info!(addr = %config.addr, "Control surface listening on http://{}", config.addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}
