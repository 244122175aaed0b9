//! Mapping from event log failures to HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pigeon_log::LogError;

/// Error returned by API handlers.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub LogError);

impl ApiError {
    /// Status code for this failure.
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            LogError::StoreUnavailable(_) | LogError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            LogError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            LogError::MalformedRecord { .. }
            | LogError::Database(_)
            | LogError::Serialization(_)
            | LogError::Schema(_)
            | LogError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self.0, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self.0, "request rejected");
        }
        (
            status,
            Json(serde_json::json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}
