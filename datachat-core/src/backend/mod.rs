//! Execution backends: the pluggable "prompt → query or explanation" step.
//!
//! A backend only translates.  Running the query is the engine's job; turning
//! the resulting table into message content goes through
//! [`ExecutionBackend::present`], which backends may override to render
//! something other than a plain result table.

pub mod answer;
pub mod llm;
pub mod profile;
pub mod sql;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{BackendConfig, BackendKind};
use crate::engine::dataset::{Dataset, Schema};
use crate::engine::table::Table;
use crate::message::{ChatMessage, Component, ComponentConfig, ComponentType, MessageJsonContent};
use crate::runtime::retry::FailureKind;

pub use answer::AnswerBackend;
pub use llm::LlmClient;
pub use profile::ProfileBackend;
pub use sql::SqlBackend;

/// Everything a backend may look at when translating a prompt.
#[derive(Debug, Clone, Copy)]
pub struct TranslateRequest<'a> {
    pub prompt: &'a str,
    /// Normalized column name → declared type.
    pub schema: &'a Schema,
    pub dataset: Option<&'a Dataset>,
    /// Earlier messages in the chat, newest first.
    pub history: &'a [ChatMessage],
}

/// What a backend made of a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Translation {
    /// An SQLite query over table `df`.
    Query(String),
    /// A natural-language answer or an explanation of why no query exists.
    Explanation(String),
}

#[derive(Debug, Error)]
pub enum BackendError {
    /// The provider answered 429.
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// Missing or rejected credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Provider unreachable or answered 5xx.
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("request timed out")]
    Timeout,

    /// Any other non-success status.
    #[error("provider error (HTTP {status}): {message}")]
    Provider { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl BackendError {
    pub fn kind(&self) -> FailureKind {
        match self {
            BackendError::RateLimited { .. } => FailureKind::RateLimited,
            BackendError::Unauthorized(_) => FailureKind::Unauthorized,
            BackendError::Unavailable(_) => FailureKind::Unavailable,
            BackendError::Timeout => FailureKind::Timeout,
            BackendError::Provider { .. }
            | BackendError::InvalidResponse(_)
            | BackendError::Config(_) => FailureKind::Internal,
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            BackendError::Timeout
        } else if e.is_connect() || e.is_request() {
            BackendError::Unavailable(e.to_string())
        } else if e.is_decode() || e.is_body() {
            BackendError::InvalidResponse(e.to_string())
        } else {
            BackendError::Unavailable(e.to_string())
        }
    }
}

#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Short identifier used in logs and as fallback `method_name`.
    fn name(&self) -> &'static str;

    async fn translate(&self, req: TranslateRequest<'_>) -> Result<Translation, BackendError>;

    /// Render an executed query result as structured message content.
    ///
    /// `source` is the dataset the query ran against, with its schema.
    fn present(&self, result: &Table, _source: Option<(&Dataset, &Schema)>) -> MessageJsonContent {
        sql_table_content(result)
    }
}

/// Single-table rendering of a query result.
pub fn sql_table_content(table: &Table) -> MessageJsonContent {
    let mut content = MessageJsonContent::new("SQL");
    content.push(
        Component::new(ComponentType::Table, "Column Names")
            .with_description("The Result of your SQL Query")
            .with_config(ComponentConfig::new(true, false))
            .with_data(table.to_json_data()),
    );
    content
}

/// Construct the backend selected by `config.kind`.
pub fn build_backend(config: &BackendConfig) -> Result<Arc<dyn ExecutionBackend>, BackendError> {
    Ok(match config.kind {
        BackendKind::Sql => Arc::new(SqlBackend::new(LlmClient::new(config)?)),
        BackendKind::Answer => Arc::new(AnswerBackend::new(LlmClient::new(config)?)),
        BackendKind::Profile => Arc::new(ProfileBackend::new()),
    })
}

/// `'a', 'b', 'c'` list of column names for prompts.
pub(crate) fn quoted_columns<'a>(columns: impl IntoIterator<Item = &'a str>) -> String {
    columns
        .into_iter()
        .map(|c| format!("'{c}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::table::Value;
    use serde_json::json;

    #[test]
    fn default_presentation_is_a_single_sql_table() {
        let mut table = Table::with_columns(["region", "total"]);
        table.push_row(vec![Value::Text("north".into()), Value::Real(12.5)]);

        let content = sql_table_content(&table);
        let value = serde_json::to_value(&content).unwrap();
        assert_eq!(
            value,
            json!({
                "method_name": "SQL",
                "components": [{
                    "type": "table",
                    "name": "Column Names",
                    "description": "The Result of your SQL Query",
                    "config": {"show_title": true, "show_description": false, "highlight_columns": []},
                    "data": {"region": ["north"], "total": ["12.500"]}
                }]
            })
        );
    }

    #[test]
    fn errors_map_to_failure_kinds() {
        assert_eq!(BackendError::RateLimited { retry_after: None }.kind(), FailureKind::RateLimited);
        assert_eq!(BackendError::Unauthorized("x".into()).kind(), FailureKind::Unauthorized);
        assert_eq!(BackendError::Timeout.kind(), FailureKind::Timeout);
        assert_eq!(
            BackendError::Provider { status: 400, message: "bad".into() }.kind(),
            FailureKind::Internal
        );
    }

    #[test]
    fn build_backend_selects_by_kind() {
        let cfg = BackendConfig {
            kind: BackendKind::Profile,
            ..BackendConfig::default()
        };
        assert_eq!(build_backend(&cfg).unwrap().name(), "profile");
        let cfg = BackendConfig::default();
        assert_eq!(build_backend(&cfg).unwrap().name(), "sql");
    }
}
