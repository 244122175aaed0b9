//! Alert publish and recent-read handlers.
//!
//! Provides:
//! - `POST /alerts`: enrich, append, and echo the stored record
//! - `GET /alerts/recent`: the newest N records, newest first

use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    Json,
};
use pigeon_log::{LogError, RecordView};
use serde::Deserialize;

use crate::enrich::{self, AlertIn};
use crate::error::ApiError;
use crate::AppState;

/// Query parameters for `GET /alerts/recent`.
#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    /// How many records to return (default from config, range `1..=max`).
    pub limit: Option<i64>,
}

/// Handler for `POST /alerts`.
///
/// Returns `201 Created` with the stored record, including its log id.
pub async fn create_alert_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(alert): Json<AlertIn>,
) -> Result<(StatusCode, Json<RecordView>), ApiError> {
    let enriched = enrich::enrich(alert)?;
    let id = state.publisher.publish(enriched.to_record()?).await?;

    tracing::info!(%id, source = ?enriched.payload.get("source"), "accepted alert");
    Ok((StatusCode::CREATED, Json(enriched.into_view(id))))
}

/// Handler for `GET /alerts/recent`.
///
/// Records whose payload no longer decodes are left out of the response.
pub async fn recent_alerts_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<RecentQuery>,
) -> Result<Json<Vec<RecordView>>, ApiError> {
    let requested = params
        .limit
        .unwrap_or_else(|| i64::from(state.default_recent_limit));
    let limit = u32::try_from(requested).map_err(|_| {
        LogError::InvalidArgument(format!(
            "limit must be between 1 and {}, got {requested}",
            state.log.settings().max_recent_limit
        ))
    })?;

    let records = state.log.read_recent(limit).await?;
    let views = records
        .iter()
        .filter_map(|record| match record.decode() {
            Ok(view) => Some(view),
            Err(e) => {
                tracing::warn!(id = %record.id, error = %e, "skipping malformed record");
                None
            }
        })
        .collect();

    Ok(Json(views))
}
