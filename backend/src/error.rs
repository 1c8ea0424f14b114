//! Unified error handling for the backend API.
//!
//! Handlers return [`ApiResult`] and use `?` on workflow calls; the
//! [`WorkflowError`] taxonomy is mapped onto HTTP status codes here and
//! nowhere else.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use shared::api::ErrorResponse;
use shared::WorkflowError;
use thiserror::Error;

/// Unified error type for API handlers
#[derive(Debug, Error)]
pub enum ApiError {
    /// Failure reported by the calendar workflow or storage
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    /// Request body or query failed validation before reaching the workflow
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Missing or malformed acting-user header
    #[error("Missing or invalid user identity")]
    Unauthenticated,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

/// HTTP status for each workflow error kind
pub fn status_for(err: &WorkflowError) -> StatusCode {
    match err {
        WorkflowError::Validation(_) => StatusCode::BAD_REQUEST,
        WorkflowError::NotFound(_) => StatusCode::NOT_FOUND,
        WorkflowError::InvalidState(_) => StatusCode::CONFLICT,
        WorkflowError::Forbidden(_) => StatusCode::FORBIDDEN,
        WorkflowError::Conflict(_) => StatusCode::CONFLICT,
        WorkflowError::UpstreamFetch(_) => StatusCode::BAD_GATEWAY,
        WorkflowError::Configuration(_) | WorkflowError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::Workflow(err) => {
                match err {
                    WorkflowError::Internal(e) => tracing::error!("Internal error: {:?}", e),
                    WorkflowError::Configuration(msg) => {
                        tracing::error!("Configuration error: {}", msg)
                    }
                    other => tracing::debug!(code = other.code(), "Request refused: {}", other),
                }
                (
                    status_for(err),
                    ErrorResponse::new(err.code(), err.user_message()),
                )
            }
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new("validation_error", msg.clone()),
            ),
            ApiError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                ErrorResponse::new("unauthenticated", self.to_string()),
            ),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_onto_http_statuses() {
        let cases = [
            (WorkflowError::validation("bad"), StatusCode::BAD_REQUEST),
            (WorkflowError::not_found("Event"), StatusCode::NOT_FOUND),
            (WorkflowError::invalid_state("done"), StatusCode::CONFLICT),
            (WorkflowError::forbidden("no"), StatusCode::FORBIDDEN),
            (WorkflowError::conflict("race"), StatusCode::CONFLICT),
            (
                WorkflowError::UpstreamFetch("feed down".to_string()),
                StatusCode::BAD_GATEWAY,
            ),
            (
                WorkflowError::from(anyhow::anyhow!("db down")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(status_for(&err), status, "{}", err.code());
        }
    }

    #[test]
    fn internal_detail_is_not_sent_to_clients() {
        let response = ApiError::from(WorkflowError::from(anyhow::anyhow!("password=hunter2")))
            .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
