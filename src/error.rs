//! Application-level error types and their HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::store::StoreError;

/// Error sum surfaced by the core components.
///
/// Each variant maps to a fixed HTTP status; the transport attaches the
/// request correlation ID separately via the `x-request-id` header.
#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("identity not established")]
    Unauthorized,

    #[error("store error: {0}")]
    Store(#[source] StoreError),

    #[error("deadline exceeded")]
    Timeout,

    #[error("pipeline error: {0}")]
    Pipeline(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Machine-readable kind carried in the error body.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "validation_error",
            CoreError::NotFound(_) => "not_found",
            CoreError::Unauthorized => "unauthorized",
            CoreError::Store(_) => "store_error",
            CoreError::Timeout => "timeout",
            CoreError::Pipeline(_) => "pipeline_error",
            CoreError::Internal(_) => "internal_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Unauthorized => StatusCode::UNAUTHORIZED,
            CoreError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            CoreError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            CoreError::Pipeline(_) | CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Timeout => CoreError::Timeout,
            // A foreign-key failure on an interaction append means the
            // referenced track does not exist, which is an input problem.
            StoreError::ForeignKey(entity) => {
                CoreError::Validation(format!("unknown {entity}"))
            }
            other => CoreError::Store(other),
        }
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": {
                "kind": self.kind(),
                "message": self.to_string(),
            }
        }));
        (status, body).into_response()
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_error_contract() {
        assert_eq!(
            CoreError::Validation("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            CoreError::NotFound("x".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(CoreError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            CoreError::Store(StoreError::Unavailable("down".into())).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(CoreError::Timeout.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            CoreError::Pipeline("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn store_timeout_converts_to_timeout() {
        let err: CoreError = StoreError::Timeout.into();
        assert!(matches!(err, CoreError::Timeout));
    }

    #[test]
    fn foreign_key_converts_to_validation() {
        let err: CoreError = StoreError::ForeignKey("track".into()).into();
        assert!(matches!(err, CoreError::Validation(_)));
    }
}
