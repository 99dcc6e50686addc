//! Unified server error type.
//!
//! Every handler returns `Result<T, ServerError>`, which implements
//! [`axum::response::IntoResponse`] so errors are automatically converted
//! to a JSON-body HTTP response with an appropriate status code.
//!
//! Database errors are logged with full detail but only a generic message is
//! returned to the caller so that SQL and file paths never leak to clients.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use datachat_core::RuntimeError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// All errors that can occur in the datachat-server request lifecycle.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Propagated from the pipeline runtime.
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// Propagated from the message store.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The caller referenced a resource that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller sent an invalid or malformed request.
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl From<validator::ValidationErrors> for ServerError {
    fn from(e: validator::ValidationErrors) -> Self {
        ServerError::BadRequest(e.to_string())
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, client_message) = match &self {
            ServerError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            ServerError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),

            ServerError::Runtime(e) => match e {
                RuntimeError::QueueFull { .. } => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "the job queue is full, try again later".to_owned(),
                ),
                RuntimeError::AlreadySubmitted { .. } => (StatusCode::CONFLICT, e.to_string()),
                RuntimeError::JobNotFound { .. } => (StatusCode::NOT_FOUND, e.to_string()),
                RuntimeError::Shutdown => {
                    error!(error = %e, "pipeline runtime unavailable");
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "the server is shutting down".to_owned(),
                    )
                }
            },
            ServerError::Database(e) => {
                error!(error = %e, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
            }
        };
        (status, Json(json!({ "error": client_message }))).into_response()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn queue_full_maps_to_service_unavailable() {
        let resp = ServerError::from(RuntimeError::QueueFull { capacity: 4 }).into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn duplicate_submission_maps_to_conflict() {
        let resp = ServerError::from(RuntimeError::AlreadySubmitted {
            message_id: Uuid::nil(),
        })
        .into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn database_errors_are_internal() {
        let resp = ServerError::from(sqlx::Error::PoolTimedOut).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
