//! Chat message routes: direct submission, long-poll listing and prompt
//! execution.
//!
//! Execution is fire-and-forget.  The handler enqueues a job and answers
//! `202`; the answer shows up later as a system message in the same chat.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use datachat_core::{DatasetRef, MessageStore, NewMessage, PromptJob};
use tracing::{debug, info};
use utoipa::OpenApi;
use uuid::Uuid;
use validator::Validate;

use crate::error::ServerError;
use crate::schemas::v1::chat::{
    CreateMessageRequest, ExecuteMessageRequest, ExecuteMessageResponse, ListMessagesQuery,
    ListMessagesResponse, ListMetadata, MessageResponse,
};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(create_message, list_messages, get_message, execute_message),
    components(schemas(
        CreateMessageRequest,
        MessageResponse,
        ListMessagesResponse,
        ListMetadata,
        ExecuteMessageRequest,
        ExecuteMessageResponse
    ))
)]
pub struct ChatsApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/chats/{chat_id}/messages",
            get(list_messages).post(create_message),
        )
        .route("/chats/{chat_id}/messages/{message_id}", get(get_message))
        .route(
            "/chats/{chat_id}/messages/{message_id}/execute",
            post(execute_message),
        )
}

/// Append a user message to a chat.
#[utoipa::path(
    post,
    path = "/v1/chats/{chat_id}/messages",
    tag = "chats",
    params(("chat_id" = Uuid, Path, description = "Chat to append to")),
    request_body = CreateMessageRequest,
    responses(
        (status = 201, description = "Message stored", body = MessageResponse),
        (status = 400, description = "Bad request"),
        (status = 500, description = "Database error"),
    )
)]
pub async fn create_message(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<Uuid>,
    Json(req): Json<CreateMessageRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ServerError> {
    req.validate()?;
    let stored = state
        .store
        .insert(NewMessage::from_user(
            chat_id,
            req.sender_id,
            req.artifact_version_id,
            req.content,
        ))
        .await?;
    debug!(%chat_id, message_id = %stored.id, "user message stored");
    Ok((StatusCode::CREATED, Json(stored.into())))
}

/// List the messages of a chat, newest first.
///
/// With `poll=true` the request blocks until at least one message matches,
/// the poll window elapses or the server starts shutting down.
#[utoipa::path(
    get,
    path = "/v1/chats/{chat_id}/messages",
    tag = "chats",
    params(
        ("chat_id" = Uuid, Path, description = "Chat to read"),
        ListMessagesQuery
    ),
    responses(
        (status = 200, description = "Messages listed", body = ListMessagesResponse),
        (status = 400, description = "Bad request"),
        (status = 500, description = "Database error"),
    )
)]
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<Uuid>,
    Query(q): Query<ListMessagesQuery>,
) -> Result<Json<ListMessagesResponse>, ServerError> {
    q.validate()?;
    let page = state.reader.list(chat_id, &q.filter(), q.poll).await?;
    Ok(Json(ListMessagesResponse {
        metadata: ListMetadata {
            count: page.messages.len(),
            total: page.total,
        },
        data: page.messages.into_iter().map(MessageResponse::from).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/v1/chats/{chat_id}/messages/{message_id}",
    tag = "chats",
    params(
        ("chat_id" = Uuid, Path, description = "Chat the message belongs to"),
        ("message_id" = Uuid, Path, description = "Message to retrieve")
    ),
    responses(
        (status = 200, description = "Message retrieved", body = MessageResponse),
        (status = 404, description = "Message not found"),
        (status = 500, description = "Database error"),
    )
)]
pub async fn get_message(
    State(state): State<Arc<AppState>>,
    Path((chat_id, message_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<MessageResponse>, ServerError> {
    let message = state
        .store
        .get(chat_id, message_id)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("message {message_id} not found")))?;
    Ok(Json(message.into()))
}

/// Run the prompt pipeline for a stored user message.
#[utoipa::path(
    post,
    path = "/v1/chats/{chat_id}/messages/{message_id}/execute",
    tag = "chats",
    params(
        ("chat_id" = Uuid, Path, description = "Chat the message belongs to"),
        ("message_id" = Uuid, Path, description = "Message holding the prompt")
    ),
    request_body = ExecuteMessageRequest,
    responses(
        (status = 202, description = "Job queued", body = ExecuteMessageResponse),
        (status = 400, description = "Bad request"),
        (status = 404, description = "Message not found"),
        (status = 409, description = "A job for this message is already running"),
        (status = 503, description = "Job queue full"),
    )
)]
pub async fn execute_message(
    State(state): State<Arc<AppState>>,
    Path((chat_id, message_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<ExecuteMessageRequest>,
) -> Result<(StatusCode, Json<ExecuteMessageResponse>), ServerError> {
    let message = state
        .store
        .get(chat_id, message_id)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("message {message_id} not found")))?;

    let config = req
        .dataset_config()
        .map_err(|e| ServerError::BadRequest(format!("invalid dataset_config: {e}")))?;
    let dataset = req
        .dataset_uri
        .as_deref()
        .map(str::trim)
        .filter(|uri| !uri.is_empty())
        .map(|uri| DatasetRef {
            artifact_version_id: req.artifact_version_id.or(message.artifact_version_id),
            uri: uri.to_owned(),
            config,
        });

    let window = state.config.pipeline.history_window as i64;
    let history = state.store.previous(chat_id, message_id, window).await?;

    let job = PromptJob {
        message_id,
        chat_id,
        prompt: message.content,
        dataset,
        history,
    };
    state.orchestrator.submit(job).await?;
    info!(%chat_id, %message_id, "prompt execution queued");

    Ok((
        StatusCode::ACCEPTED,
        Json(ExecuteMessageResponse {
            message_id,
            chat_id,
            status: "pending".to_owned(),
        }),
    ))
}
