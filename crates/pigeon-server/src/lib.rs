//! EventPigeon server library logic.
//!
//! HTTP front door for the alert log: publish, recent reads, and a live
//! SSE tail. Handlers share one [`AppState`] holding the opened
//! [`EventLog`].

pub mod api_alerts;
pub mod api_stream;
pub mod background;
pub mod config;
pub mod enrich;
pub mod error;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Json, Router,
};
use pigeon_log::{EventLog, Publisher};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across all request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The alert log.
    pub log: EventLog,
    /// Write path into `log`.
    pub publisher: Publisher,
    /// `limit` used by `GET /alerts/recent` when none is given.
    pub default_recent_limit: u32,
    /// Cancelled on server shutdown; ends open SSE streams.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Builds state around an opened log.
    pub fn new(log: EventLog, default_recent_limit: u32, shutdown: CancellationToken) -> Self {
        Self {
            publisher: Publisher::new(log.clone()),
            log,
            default_recent_limit,
            shutdown,
        }
    }
}

/// Maximum request body size (64 KiB). Alerts are small.
const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/alerts", post(api_alerts::create_alert_handler))
        .route("/alerts/recent", get(api_alerts::recent_alerts_handler))
        .route("/alerts/stream", get(api_stream::alert_stream_handler))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
