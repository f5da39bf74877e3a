//! Router configuration for the relay.
//!
//! # Route Structure
//!
//! ```text
//! /health       - Health check (JSON)
//! /metrics      - Prometheus text exposition (when metrics are enabled)
//! /*            - Forwarding pipeline (signature-protected relay paths)
//! ```
//!
//! The forwarder is registered as the fallback so every path that is not a
//! service endpoint is treated as a signed relay path, mirroring a root
//! catch-all handler.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::error;

use super::forward::{forward_handler, AppState};

// =============================================================================
// Service Endpoints
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,
}

/// Health check endpoint.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Prometheus metrics endpoint.
pub async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics.encode() {
        Ok(text) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the application router.
///
/// Service endpoints are registered first; everything else falls through
/// to the forwarding pipeline. The metrics endpoint is mounted only when
/// metrics are enabled, and the tower-http trace layer only when request
/// tracing is not disabled.
pub fn create_router(state: AppState) -> Router {
    let metrics_enabled = state.config.metrics_enabled;
    let enable_tracing = !state.config.no_tracing;

    let mut router = Router::new().route("/health", get(health_handler));

    if metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    let router = router.fallback(forward_handler).with_state(state);

    if enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}
