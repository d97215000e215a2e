//! Maps domain `AppError` to HTTP responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, ErrorKind};

/// Standard API error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// Machine-readable error code.
    pub error: String,
    /// Human-readable message.
    pub message: String,
}

impl AppError {
    /// HTTP status and machine-readable code for this error.
    pub fn status(&self) -> (StatusCode, &'static str) {
        match self.kind {
            ErrorKind::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ErrorKind::Conflict => (StatusCode::CONFLICT, "CONFLICT"),
            ErrorKind::ServiceUnavailable => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE")
            }
            ErrorKind::Internal
            | ErrorKind::Storage
            | ErrorKind::Configuration
            | ErrorKind::Plugin
            | ErrorKind::Serialization => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status();
        if status.is_server_error() {
            tracing::error!(kind = %self.kind, error = %self.message, "Request failed");
        }

        let body = ApiErrorResponse {
            error: error_code.to_string(),
            message: self.message,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::service_unavailable("not ready").status().0,
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(AppError::not_found("x").status().0, StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::plugin("boom").status().0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
