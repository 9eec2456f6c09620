//! HTTP error types for `Leadgate` server.
//!
//! Maps domain errors from `leadgate-core` into HTTP responses. Every error
//! variant produces a JSON body with a machine-readable `error` field and a
//! human-readable `message`. Malformed payloads get their own error code;
//! admission rejections share one generic code so a client cannot tell which
//! check fired.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::{debug, error};

use leadgate_core::error::SubscribeError;

/// Message returned for submissions rejected by admission control.
pub const INVALID_REQUEST_MESSAGE: &str = "invalid request data";
/// Message returned for submissions that fail shape or attribute validation.
pub const MALFORMED_REQUEST_MESSAGE: &str = "malformed request data";
/// Message returned for internal failures.
pub const INTERNAL_MESSAGE: &str = "an unexpected error occurred";

/// Application-level error returned from HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// The submission body is unreadable, mistyped, or fails the segment
    /// attribute rules.
    #[error("malformed submission")]
    Malformed,

    /// The submission was rejected by admission control.
    #[error("submission rejected")]
    Validation,

    /// The address is already on the target list.
    #[error("email already subscribed")]
    EmailExists,

    /// Admin credential missing or wrong.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Client sent invalid input outside the subscription flow.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Internal failure; the detail is logged, never returned.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            Self::Malformed => (
                StatusCode::BAD_REQUEST,
                "malformed_request",
                MALFORMED_REQUEST_MESSAGE.to_owned(),
            ),
            Self::Validation => (
                StatusCode::BAD_REQUEST,
                "validation_error",
                INVALID_REQUEST_MESSAGE.to_owned(),
            ),
            Self::EmailExists => (
                StatusCode::CONFLICT,
                "email_exists",
                "email already subscribed".to_owned(),
            ),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            Self::Internal(detail) => {
                error!(detail = %detail, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    INTERNAL_MESSAGE.to_owned(),
                )
            }
        };

        let body = ErrorBody {
            error: error_type,
            message,
        };

        (status, axum::Json(body)).into_response()
    }
}

impl From<SubscribeError> for AppError {
    fn from(err: SubscribeError) -> Self {
        match err {
            SubscribeError::Malformed(ref inner) => {
                debug!(error = %inner, "malformed submission");
                Self::Malformed
            }
            SubscribeError::Rejected => Self::Validation,
            SubscribeError::AlreadySubscribed => Self::EmailExists,
            SubscribeError::Registry(_) => Self::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::to_bytes;
    use leadgate_core::error::{PayloadError, RegistryError};

    use super::*;

    async fn body_of(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn malformed_is_distinct_from_rejected() {
        let malformed = AppError::from(SubscribeError::Malformed(PayloadError::InvalidEmail {
            reason: "missing '@'",
        }));
        let rejected = AppError::from(SubscribeError::Rejected);

        let (malformed_status, malformed_body) = body_of(malformed).await;
        let (rejected_status, rejected_body) = body_of(rejected).await;
        assert_eq!(malformed_status, StatusCode::BAD_REQUEST);
        assert_eq!(rejected_status, StatusCode::BAD_REQUEST);
        assert_eq!(malformed_body["error"], "malformed_request");
        assert_eq!(rejected_body["error"], "validation_error");
        assert_ne!(malformed_body, rejected_body);
        assert!(!malformed_body.to_string().contains("missing"));
    }

    #[tokio::test]
    async fn registry_detail_is_not_returned() {
        let err = AppError::from(SubscribeError::Registry(RegistryError::Provider {
            status: 500,
            body: "upstream secret detail".to_owned(),
        }));
        let (status, body) = body_of(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "internal_error");
        assert_eq!(body["message"], INTERNAL_MESSAGE);
    }

    #[tokio::test]
    async fn duplicate_maps_to_conflict() {
        let (status, body) = body_of(AppError::from(SubscribeError::AlreadySubscribed)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "email_exists");
    }
}
