//! Append-only chat message log.
//!
//! [`MessageStore`] is the only persistence interface the pipeline and the
//! long-poll reader depend on.  Writers only append, readers only scan; there
//! is no update or delete.  The default implementation is
//! [`sqlite::SqliteMessageStore`].
//!
//! Trait methods return `impl Future` so no `async-trait` boxing is needed.

pub mod sqlite;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::message::{ChatMessage, NewMessage};

pub use sqlite::SqliteMessageStore;

/// Pagination and time-window filter for [`MessageStore::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageFilter {
    pub limit: i64,
    pub offset: i64,
    /// Exclusive lower bound: `created_at > from`.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound: `created_at <= to`.
    pub to: Option<DateTime<Utc>>,
}

impl Default for MessageFilter {
    fn default() -> Self {
        Self {
            limit: 20,
            offset: 0,
            from: None,
            to: None,
        }
    }
}

/// One page of messages plus the unpaginated match count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessagePage {
    /// Newest first.
    pub messages: Vec<ChatMessage>,
    pub total: i64,
}

pub trait MessageStore: Send + Sync + 'static {
    /// Append a message; the store assigns id and creation time.
    fn insert(
        &self,
        message: NewMessage,
    ) -> impl std::future::Future<Output = Result<ChatMessage, sqlx::Error>> + Send;

    fn get(
        &self,
        chat_id: Uuid,
        message_id: Uuid,
    ) -> impl std::future::Future<Output = Result<Option<ChatMessage>, sqlx::Error>> + Send;

    /// Messages of `chat_id` matching `filter`, ordered by creation time
    /// descending (ties by id descending).
    fn list(
        &self,
        chat_id: Uuid,
        filter: &MessageFilter,
    ) -> impl std::future::Future<Output = Result<MessagePage, sqlx::Error>> + Send;

    /// Up to `limit` messages created strictly before `message_id`, newest
    /// first.
    fn previous(
        &self,
        chat_id: Uuid,
        message_id: Uuid,
        limit: i64,
    ) -> impl std::future::Future<Output = Result<Vec<ChatMessage>, sqlx::Error>> + Send;
}
