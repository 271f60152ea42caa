//! API error types and response handling.
//!
//! Handlers return [`ApiResult`]; core errors convert into [`ApiError`] and
//! render as a consistent JSON body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use beaconwatch_core::BeaconError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type.
#[derive(Debug, Clone)]
pub struct ApiError {
    /// Response status.
    pub status: StatusCode,
    /// Machine-readable error code.
    pub error_code: String,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// 503 Service Unavailable with the given code.
    pub fn service_unavailable(error_code: &str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            error_code: error_code.to_string(),
            message: message.into(),
            details: None,
        }
    }
}

/// Standard JSON error response body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "REGION_NOT_FOUND",
    "message": "Region not found: 'lobby'",
    "details": null
}))]
pub struct ErrorResponse {
    /// Machine-readable error code.
    #[schema(example = "REGION_NOT_FOUND")]
    pub error: String,

    /// Human-readable error message.
    #[schema(example = "Region not found: 'lobby'")]
    pub message: String,

    /// Optional additional details for debugging.
    #[schema(nullable)]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(
                status = %self.status,
                error_code = %self.error_code,
                message = %self.message,
                "Request failed"
            );
        }

        let body = ErrorResponse {
            error: self.error_code,
            message: self.message,
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<BeaconError> for ApiError {
    fn from(err: BeaconError) -> Self {
        let status = StatusCode::from_u16(err.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let details = match &err {
            BeaconError::CapacityExceeded { max } => Some(serde_json::json!({ "max": max })),
            _ => None,
        };
        Self {
            status,
            error_code: err.error_code().to_string(),
            message: err.to_string(),
            details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_unavailable_error() {
        let err = ApiError::service_unavailable("SERVICE_STOPPED", "Test message");
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(err.to_string().contains("Test message"));
    }

    #[test]
    fn test_beacon_error_mapping() {
        let err = ApiError::from(BeaconError::RegionNotFound("lobby".into()));
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.error_code, "REGION_NOT_FOUND");

        let err = ApiError::from(BeaconError::CapacityExceeded { max: 20 });
        assert_eq!(err.status, StatusCode::CONFLICT);
        assert_eq!(err.details, Some(serde_json::json!({ "max": 20 })));

        let err = ApiError::from(BeaconError::AuthorizationDenied);
        assert_eq!(err.status, StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_error_response_serialization() {
        let response = ErrorResponse {
            error: "INVALID_UUID".to_string(),
            message: "Test message".to_string(),
            details: None,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("INVALID_UUID"));
    }
}
