//! Health / heartbeat endpoint.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use std::sync::Arc;
use utoipa::OpenApi;

use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(get_health))]
pub struct HealthApi;

/// Register health-check routes.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(get_health))
}

/// Heartbeat endpoint.
///
/// Returns `{"status": "ok", "version": "...", "backend": "...", ...}` with
/// HTTP 200.  `lost_jobs` should stay at zero; anything else means answers
/// were dropped because the message store kept failing.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Server is healthy", body = Value)
    )
)]
pub async fn get_health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status":      "ok",
        "version":     env!("CARGO_PKG_VERSION"),
        "backend":     state.config.backend.kind.to_string(),
        "queued_jobs": state.orchestrator.queued(),
        "lost_jobs":   state.orchestrator.tracker().lost_jobs(),
        "polling":     state.reader.polling_enabled(),
    }))
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;
    use crate::state::testing::test_state;

    #[tokio::test]
    async fn health_response_has_ok_status() {
        let Json(body) = get_health(State(test_state().await)).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["lost_jobs"], 0);
    }

    #[tokio::test]
    async fn health_response_has_version() {
        let Json(body) = get_health(State(test_state().await)).await;
        assert!(!body["version"].as_str().unwrap_or("").is_empty());
        assert_eq!(body["backend"], "profile");
    }
}
