use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::core::SessionError;
use crate::telephony::TelephonyError;

/// Errors returned by HTTP handlers.
///
/// Rendered as `{"error": "..."}` with a status matching the variant.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    ServiceUnavailable(String),

    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    Internal(String),
}

/// Result type for HTTP handlers.
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<SessionError> for AppError {
    fn from(error: SessionError) -> Self {
        match error {
            SessionError::CallId(_) => AppError::BadRequest(error.to_string()),
            SessionError::NotFound(_) => AppError::NotFound(error.to_string()),
            SessionError::AlreadyAttached(_) => AppError::Conflict(error.to_string()),
            SessionError::Closed(_) => AppError::ServiceUnavailable(error.to_string()),
            SessionError::Upstream(_) | SessionError::Transcoder(_) => {
                AppError::Upstream(error.to_string())
            }
        }
    }
}

impl From<TelephonyError> for AppError {
    fn from(error: TelephonyError) -> Self {
        match error {
            TelephonyError::InvalidConfiguration(_) => AppError::Internal(error.to_string()),
            TelephonyError::RequestFailed(_) | TelephonyError::Api { .. } => {
                AppError::Upstream(error.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = %status, error = %self, "Request failed");
        } else {
            tracing::debug!(status = %status, error = %self, "Request rejected");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
