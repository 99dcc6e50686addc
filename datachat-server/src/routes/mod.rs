//! Axum router construction.
//!
//! [`build`] assembles the complete application router, including:
//! - Middleware layers (CORS, per-request trace-ID injection)
//! - Optional Swagger UI / OpenAPI spec endpoint (disable with `DATACHAT_ENABLE_SWAGGER=false`)
//! - Health / heartbeat route
//! - `/v1` chat and job routes

pub mod doc;
mod health;
mod v1;

use std::sync::Arc;

use axum::{Router, middleware};
use tower::ServiceBuilder;
use utoipa_swagger_ui::SwaggerUi;

use crate::middleware::{cors, trace};
use crate::state::AppState;

// ── Router builder ────────────────────────────────────────────────────────────

/// Build the complete Axum [`Router`] for the application.
pub fn build(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .merge(health::router())
        .nest("/v1", v1::router());

    if state.config.enable_swagger {
        app = app.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", doc::get_docs()));
    }

    app
        // Outermost layers execute first on the way in.
        .layer(ServiceBuilder::new().layer(cors::cors_layer(&state.config)))
        .layer(middleware::from_fn(trace::trace_middleware))
        .with_state(state)
}

#[cfg(test)]
mod test {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::state::testing::test_state;

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn stored_messages_are_listed_newest_first() {
        let app = build(test_state().await);
        let chat = Uuid::new_v4();

        for content in ["first", "second"] {
            let (status, _) = send(
                &app,
                post_json(&format!("/v1/chats/{chat}/messages"), json!({ "content": content })),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, body) = send(&app, get(&format!("/v1/chats/{chat}/messages?limit=1"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["metadata"]["count"], 1);
        assert_eq!(body["metadata"]["total"], 2);
        assert_eq!(body["data"][0]["content"], "second");
    }

    #[tokio::test]
    async fn out_of_range_limit_is_rejected() {
        let app = build(test_state().await);
        let chat = Uuid::new_v4();
        let (status, body) = send(&app, get(&format!("/v1/chats/{chat}/messages?limit=101"))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn executing_a_prompt_answers_in_the_chat() {
        let app = build(test_state().await);
        let chat = Uuid::new_v4();

        let (_, created) = send(
            &app,
            post_json(&format!("/v1/chats/{chat}/messages"), json!({ "content": "profile it" })),
        )
        .await;
        let message_id = created["id"].as_str().unwrap().to_owned();

        let (status, body) = send(
            &app,
            post_json(&format!("/v1/chats/{chat}/messages/{message_id}/execute"), json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["status"], "pending");

        // no dataset attached, so the profile query cannot run
        let mut answer = Value::Null;
        for _ in 0..50 {
            let (_, body) = send(&app, get(&format!("/v1/chats/{chat}/messages?poll=true"))).await;
            if body["metadata"]["total"] == 2 {
                answer = body["data"][0].clone();
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert_eq!(answer["content_type"], "error");
        assert_eq!(answer["system_generated"], true);

        let mut job = Value::Null;
        for _ in 0..50 {
            let (status, body) = send(&app, get(&format!("/v1/jobs/{message_id}"))).await;
            assert_eq!(status, StatusCode::OK);
            job = body;
            if job["state"] == "completed" {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert_eq!(job["state"], "completed");
        assert_eq!(job["content_type"], "error");
    }

    #[tokio::test]
    async fn executing_an_unknown_message_is_not_found() {
        let app = build(test_state().await);
        let uri = format!("/v1/chats/{}/messages/{}/execute", Uuid::new_v4(), Uuid::new_v4());
        let (status, _) = send(&app, post_json(&uri, json!({}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, get(&format!("/v1/jobs/{}", Uuid::new_v4()))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn trace_id_is_echoed() {
        let app = build(test_state().await);
        let trace_id = Uuid::new_v4().to_string();
        let req = Request::get("/health")
            .header(trace::X_TRACE_ID, &trace_id)
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.headers()[trace::X_TRACE_ID], trace_id.as_str());
    }
}
