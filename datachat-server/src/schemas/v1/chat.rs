//! Chat message request / response types.

use chrono::{DateTime, Utc};
use datachat_core::{ChatMessage, ContentType, DatasetConfig, MessageFilter};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

fn default_limit() -> i64 {
    20
}

// ── Messages ─────────────────────────────────────────────────────────────────

/// Body of `POST /v1/chats/{chat_id}/messages`.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct CreateMessageRequest {
    /// 1 byte to 128 KiB.
    #[validate(length(min = 1, max = 131072))]
    pub content: String,
    #[serde(default)]
    pub sender_id: Option<Uuid>,
    #[serde(default)]
    pub artifact_version_id: Option<Uuid>,
}

/// Query of `GET /v1/chats/{chat_id}/messages`.
#[derive(Debug, Clone, Deserialize, IntoParams, Validate)]
#[into_params(parameter_in = Query)]
pub struct ListMessagesQuery {
    /// Page size, 1..=100.
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 100))]
    pub limit: i64,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub offset: i64,
    /// Only messages created strictly after this instant.
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    /// Only messages created at or before this instant.
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
    /// Block until a matching message exists or the poll window elapses.
    #[serde(default)]
    pub poll: bool,
}

impl ListMessagesQuery {
    pub fn filter(&self) -> MessageFilter {
        MessageFilter {
            limit: self.limit,
            offset: self.offset,
            from: self.from,
            to: self.to,
        }
    }
}

/// A stored chat message.
///
/// `content` is a string for `text`/`error` messages and the parsed
/// `{method_name, components}` object for `json` messages.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MessageResponse {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub sender_id: Option<Uuid>,
    pub system_generated: bool,
    pub artifact_version_id: Option<Uuid>,
    #[schema(value_type = Object)]
    pub content: Value,
    /// `text`, `json` or `error`.
    pub content_type: String,
    pub created_at: DateTime<Utc>,
}

impl From<ChatMessage> for MessageResponse {
    fn from(m: ChatMessage) -> Self {
        let content = match m.content_type {
            ContentType::Json => {
                serde_json::from_str(&m.content).unwrap_or_else(|_| Value::String(m.content.clone()))
            }
            ContentType::Text | ContentType::Error => Value::String(m.content.clone()),
        };
        Self {
            id: m.id,
            chat_id: m.chat_id,
            sender_id: m.sender_id,
            system_generated: m.system_generated,
            artifact_version_id: m.artifact_version_id,
            content,
            content_type: m.content_type.to_string(),
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ListMetadata {
    /// Messages in this page.
    pub count: usize,
    /// Messages matching the filter, ignoring pagination.
    pub total: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ListMessagesResponse {
    pub metadata: ListMetadata,
    pub data: Vec<MessageResponse>,
}

// ── Execution ────────────────────────────────────────────────────────────────

/// Body of `POST /v1/chats/{chat_id}/messages/{message_id}/execute`.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ExecuteMessageRequest {
    #[serde(default)]
    pub artifact_version_id: Option<Uuid>,
    /// Storage URI of the dataset file (`file://`, `volume://` or a path).
    #[serde(default)]
    pub dataset_uri: Option<String>,
    /// `{files: [{file_name, file_type, file_schema, rows}]}`.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub dataset_config: Option<Value>,
}

impl ExecuteMessageRequest {
    /// Decode `dataset_config`; a missing document is an empty config.
    pub fn dataset_config(&self) -> Result<DatasetConfig, serde_json::Error> {
        match &self.dataset_config {
            Some(v) => serde_json::from_value(v.clone()),
            None => Ok(DatasetConfig::default()),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ExecuteMessageResponse {
    pub message_id: Uuid,
    pub chat_id: Uuid,
    /// Always `pending`; completion is observed by listing messages.
    pub status: String,
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn query(limit: i64, offset: i64) -> ListMessagesQuery {
        ListMessagesQuery {
            limit,
            offset,
            from: None,
            to: None,
            poll: false,
        }
    }

    #[test]
    fn limit_and_offset_bounds() {
        assert!(query(20, 0).validate().is_ok());
        assert!(query(100, 5).validate().is_ok());
        assert!(query(0, 0).validate().is_err());
        assert!(query(101, 0).validate().is_err());
        assert!(query(20, -1).validate().is_err());
    }

    #[test]
    fn empty_content_is_rejected() {
        let req = CreateMessageRequest {
            content: String::new(),
            sender_id: None,
            artifact_version_id: None,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn json_messages_expose_structured_content() {
        let msg = ChatMessage {
            id: Uuid::new_v4(),
            chat_id: Uuid::new_v4(),
            sender_id: None,
            system_generated: true,
            artifact_version_id: None,
            content: r#"{"method_name":"SQL","components":[]}"#.into(),
            content_type: ContentType::Json,
            created_at: Utc::now(),
        };
        let resp = MessageResponse::from(msg);
        assert_eq!(resp.content["method_name"], "SQL");
        assert_eq!(resp.content_type, "json");
    }

    #[test]
    fn dataset_config_defaults_to_empty() {
        let req = ExecuteMessageRequest::default();
        assert!(req.dataset_config().unwrap().files.is_empty());

        let req = ExecuteMessageRequest {
            dataset_config: Some(json!({"files": [{"file_name": "a.csv", "file_type": "csv"}]})),
            ..Default::default()
        };
        assert_eq!(req.dataset_config().unwrap().files[0].file_type, "csv");
    }
}
