//! paperrec HTTP API
//!
//! Axum server exposing recommendations over HTTP (port 8767 by default).
//!
//! Each endpoint is a thin axum handler that delegates to an inner function
//! returning `(StatusCode, Value)`, so the logic is testable without going
//! through the router.
//!
//! Cross-origin calls are allowed from `[http] cors_origins` only (GET/POST/
//! OPTIONS, with credentials) so a browser frontend can reach the API.
//!
//! Endpoints:
//! - GET /recommend/:user_id?k=N : top-N unseen papers for a user
//! - GET /health                 : artifact sizes and build id
//! - GET /version                : server version info

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use paperrec_core::config::HttpConfig;
use paperrec_core::InteractionSource;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};

use crate::recommend::{recommend_for_user, ServingState};

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub serving: ServingState,
    pub interactions: Arc<dyn InteractionSource>,
    pub build_id: String,
}

pub fn build_router(state: Arc<HttpState>, cors: CorsLayer) -> Router {
    Router::new()
        .route("/recommend/:user_id", get(recommend_handler))
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .layer(cors)
        .with_state(state)
}

/// Exact-match origin list. An origin that is not a valid header value is a
/// start-up error.
pub fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    let origins = origins
        .iter()
        .map(|o| {
            HeaderValue::from_str(o).with_context(|| format!("Invalid CORS origin {o:?}"))
        })
        .collect::<Result<Vec<_>>>()?;

    // Credentials rule out a wildcard, so request headers are mirrored instead.
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true))
}

/// Serve until the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: HttpState,
    config: &HttpConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let app = build_router(Arc::new(state), cors_layer(&config.cors_origins)?);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("paperrec HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request / Response DTOs
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct RecommendParams {
    pub k: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: String,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            error: msg.into(),
            status: "error".to_string(),
        }
    }
}

// ============================================================================
// Inner (directly testable) functions
// ============================================================================

/// Recommendations as a bare JSON array of `{paper_id, score}`.
pub async fn recommend_inner(
    state: &HttpState,
    user_id: i64,
    params: RecommendParams,
) -> (StatusCode, serde_json::Value) {
    let k = state.serving.effective_k(params.k);

    match recommend_for_user(&state.serving, state.interactions.as_ref(), user_id, k).await {
        Ok(recs) => (StatusCode::OK, serde_json::json!(recs)),
        Err(e) => {
            tracing::error!(user_id, "Recommendation failed: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!(ErrorResponse::new(format!("{e:#}"))),
            )
        }
    }
}

/// Pure: reports what was loaded at start-up.
pub fn health_inner(state: &HttpState) -> serde_json::Value {
    serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "papers": state.serving.store.len(),
        "vectors": state.serving.index.len(),
        "dimensions": state.serving.index.dimensions(),
        "build_id": state.build_id,
    })
}

pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "service": "paperrec",
    })
}

// ============================================================================
// Axum handler wrappers
// ============================================================================

pub async fn recommend_handler(
    State(state): State<Arc<HttpState>>,
    Path(user_id): Path<i64>,
    Query(params): Query<RecommendParams>,
) -> impl IntoResponse {
    let (status, body) = recommend_inner(&state, user_id, params).await;
    (status, Json(body))
}

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    (StatusCode::OK, Json(health_inner(&state)))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

// ============================================================================
// Unit Tests
// ============================================================================
