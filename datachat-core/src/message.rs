//! Chat message model and the structured (`json`) content contract.
//!
//! A [`ChatMessage`] is immutable once written.  Its `content` column always
//! holds a string; for [`ContentType::Json`] that string is a serialized
//! [`MessageJsonContent`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Kind of content stored in a message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ContentType {
    Text,
    Json,
    Error,
}

/// A persisted chat message.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub id: Uuid,
    pub chat_id: Uuid,
    /// `None` when the pipeline wrote the message (sender is "system").
    pub sender_id: Option<Uuid>,
    pub system_generated: bool,
    pub artifact_version_id: Option<Uuid>,
    pub content: String,
    pub content_type: ContentType,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Parse the content of a `json` message back into its structured form.
    ///
    /// Returns `None` for `text`/`error` messages.
    pub fn json_content(&self) -> Option<Result<MessageJsonContent, serde_json::Error>> {
        match self.content_type {
            ContentType::Json => Some(serde_json::from_str(&self.content)),
            _ => None,
        }
    }
}

/// Insert form of a message; id and timestamp are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub chat_id: Uuid,
    pub sender_id: Option<Uuid>,
    pub system_generated: bool,
    pub artifact_version_id: Option<Uuid>,
    pub content: String,
    pub content_type: ContentType,
}

impl NewMessage {
    /// A message written by a user.
    pub fn from_user(
        chat_id: Uuid,
        sender_id: Option<Uuid>,
        artifact_version_id: Option<Uuid>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            chat_id,
            sender_id,
            system_generated: false,
            artifact_version_id,
            content: content.into(),
            content_type: ContentType::Text,
        }
    }

    /// A message written by the pipeline.
    pub fn from_system(
        chat_id: Uuid,
        artifact_version_id: Option<Uuid>,
        content: impl Into<String>,
        content_type: ContentType,
    ) -> Self {
        Self {
            chat_id,
            sender_id: None,
            system_generated: true,
            artifact_version_id,
            content: content.into(),
            content_type,
        }
    }
}

// ── Structured content ────────────────────────────────────────────────────────

/// Component kinds understood by the chat frontend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ComponentType {
    Table,
    Text,
    PlotHist,
    PlotBar,
    PlotHeatmap,
}

/// Display hints attached to a component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_title: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_description: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight_columns: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight_values_from_table: Option<bool>,
}

impl ComponentConfig {
    pub fn new(show_title: bool, show_description: bool) -> Self {
        Self {
            show_title: Some(show_title),
            show_description: Some(show_description),
            highlight_columns: Some(Vec::new()),
            highlight_values_from_table: None,
        }
    }
}

/// One renderable block of a structured message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    #[serde(rename = "type")]
    pub kind: ComponentType,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub config: Option<ComponentConfig>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl Component {
    pub fn new(kind: ComponentType, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: Some(name.into()),
            description: None,
            config: None,
            data: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_config(mut self, config: ComponentConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Content of a `json` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageJsonContent {
    pub method_name: String,
    pub components: Vec<Component>,
}

impl MessageJsonContent {
    pub fn new(method_name: impl Into<String>) -> Self {
        Self {
            method_name: method_name.into(),
            components: Vec::new(),
        }
    }

    pub fn push(&mut self, component: Component) {
        self.components.push(component);
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
