//! SQLite implementation of [`MessageStore`].
//!
//! Migrations under `datachat-core/migrations` are embedded at compile time
//! and run by [`SqliteMessageStore::connect`].  Queries use the runtime-checked
//! `sqlx::query` form, so no `DATABASE_URL` is needed to build.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::warn;
use uuid::Uuid;

use super::{MessageFilter, MessagePage, MessageStore};
use crate::message::{ChatMessage, ContentType, NewMessage};

type MessageRow = (
    String,
    String,
    Option<String>,
    bool,
    Option<String>,
    String,
    String,
    String,
);

const COLUMNS: &str = "id, chat_id, sender_id, system_generated, artifact_version_id, \
                       content, content_type, created_at";

/// Fixed-width timestamp encoding; lexical order equals time order.
fn encode_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_uuid(raw: &str, field: &'static str) -> Uuid {
    raw.parse().unwrap_or_else(|e: uuid::Error| {
        warn!(raw, field, error = %e, "failed to parse uuid column; using nil");
        Uuid::nil()
    })
}

fn decode_row(row: MessageRow) -> ChatMessage {
    let (id, chat_id, sender_id, system_generated, artifact_version_id, content, content_type, created_at) =
        row;
    ChatMessage {
        id: parse_uuid(&id, "id"),
        chat_id: parse_uuid(&chat_id, "chat_id"),
        sender_id: sender_id.as_deref().map(|s| parse_uuid(s, "sender_id")),
        system_generated,
        artifact_version_id: artifact_version_id
            .as_deref()
            .map(|s| parse_uuid(s, "artifact_version_id")),
        content,
        content_type: content_type.parse().unwrap_or_else(|_| {
            warn!(raw = %content_type, "unknown content_type; using text");
            ContentType::Text
        }),
        created_at: created_at.parse().unwrap_or_else(|e: chrono::ParseError| {
            warn!(raw = %created_at, error = %e, "failed to parse message created_at; using now");
            Utc::now()
        }),
    }
}

/// SQLite-backed message log.
#[derive(Clone, Debug)]
pub struct SqliteMessageStore {
    pool: SqlitePool,
}

impl SqliteMessageStore {
    /// Open (or create) the database at `url` and run pending migrations.
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Self::from_pool(pool).await
    }

    /// Private in-memory database on a single connection.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self, sqlx::Error> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl MessageStore for SqliteMessageStore {
    async fn insert(&self, message: NewMessage) -> Result<ChatMessage, sqlx::Error> {
        let stored = ChatMessage {
            id: Uuid::new_v4(),
            chat_id: message.chat_id,
            sender_id: message.sender_id,
            system_generated: message.system_generated,
            artifact_version_id: message.artifact_version_id,
            content: message.content,
            content_type: message.content_type,
            created_at: Utc::now().trunc_subsecs(6),
        };
        sqlx::query(
            "INSERT INTO messages (id, chat_id, sender_id, system_generated, \
             artifact_version_id, content, content_type, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(stored.id.to_string())
        .bind(stored.chat_id.to_string())
        .bind(stored.sender_id.map(|u| u.to_string()))
        .bind(stored.system_generated)
        .bind(stored.artifact_version_id.map(|u| u.to_string()))
        .bind(&stored.content)
        .bind(stored.content_type.as_ref())
        .bind(encode_ts(&stored.created_at))
        .execute(&self.pool)
        .await?;
        Ok(stored)
    }

    async fn get(&self, chat_id: Uuid, message_id: Uuid) -> Result<Option<ChatMessage>, sqlx::Error> {
        let row: Option<MessageRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM messages WHERE chat_id = ?1 AND id = ?2"
        ))
        .bind(chat_id.to_string())
        .bind(message_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(decode_row))
    }

    async fn list(&self, chat_id: Uuid, filter: &MessageFilter) -> Result<MessagePage, sqlx::Error> {
        let from = filter.from.as_ref().map(encode_ts);
        let to = filter.to.as_ref().map(encode_ts);
        let predicate = "chat_id = ?1 \
                         AND (?2 IS NULL OR created_at > ?2) \
                         AND (?3 IS NULL OR created_at <= ?3)";

        let (total,): (i64,) =
            sqlx::query_as(&format!("SELECT COUNT(*) FROM messages WHERE {predicate}"))
                .bind(chat_id.to_string())
                .bind(&from)
                .bind(&to)
                .fetch_one(&self.pool)
                .await?;

        let rows: Vec<MessageRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM messages WHERE {predicate} \
             ORDER BY created_at DESC, id DESC LIMIT ?4 OFFSET ?5"
        ))
        .bind(chat_id.to_string())
        .bind(&from)
        .bind(&to)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(MessagePage {
            messages: rows.into_iter().map(decode_row).collect(),
            total,
        })
    }

    async fn previous(
        &self,
        chat_id: Uuid,
        message_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ChatMessage>, sqlx::Error> {
        let rows: Vec<MessageRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM messages \
             WHERE chat_id = ?1 \
               AND created_at < (SELECT created_at FROM messages WHERE id = ?2) \
             ORDER BY created_at DESC, id DESC LIMIT ?3"
        ))
        .bind(chat_id.to_string())
        .bind(message_id.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(decode_row).collect())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::Duration;

    async fn store() -> SqliteMessageStore {
        SqliteMessageStore::in_memory().await.unwrap()
    }

    async fn seed(store: &SqliteMessageStore, chat: Uuid, n: usize) -> Vec<ChatMessage> {
        let mut out = Vec::new();
        for i in 0..n {
            out.push(
                store
                    .insert(NewMessage::from_user(chat, None, None, format!("m{i}")))
                    .await
                    .unwrap(),
            );
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        out
    }

    #[test]
    fn encoded_timestamps_are_fixed_width() {
        let a = "2024-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let b = a + Duration::microseconds(1500);
        assert_eq!(encode_ts(&a), "2024-01-01T00:00:00.000000Z");
        assert_eq!(encode_ts(&b), "2024-01-01T00:00:00.001500Z");
        assert!(encode_ts(&a) < encode_ts(&b));
    }

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let store = store().await;
        let chat = Uuid::new_v4();
        let msg = store
            .insert(NewMessage::from_system(chat, Some(Uuid::new_v4()), "oops", ContentType::Error))
            .await
            .unwrap();

        let loaded = store.get(chat, msg.id).await.unwrap().unwrap();
        assert_eq!(loaded, msg);
        assert!(loaded.system_generated);
        assert!(store.get(Uuid::new_v4(), msg.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_orders_newest_first_and_paginates() {
        let store = store().await;
        let chat = Uuid::new_v4();
        let seeded = seed(&store, chat, 5).await;
        seed(&store, Uuid::new_v4(), 2).await;

        let page = store
            .list(chat, &MessageFilter { limit: 2, offset: 1, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(page.total, 5);
        let contents: Vec<_> = page.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m3", "m2"]);
        assert_eq!(page.messages[0].id, seeded[3].id);
    }

    #[tokio::test]
    async fn from_is_exclusive_and_to_is_inclusive() {
        let store = store().await;
        let chat = Uuid::new_v4();
        let seeded = seed(&store, chat, 4).await;

        let filter = MessageFilter {
            limit: 100,
            offset: 0,
            from: Some(seeded[0].created_at),
            to: Some(seeded[2].created_at),
        };
        let page = store.list(chat, &filter).await.unwrap();
        let contents: Vec<_> = page.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m1"]);
        assert_eq!(page.total, 2);
    }

    #[tokio::test]
    async fn previous_returns_older_messages_only() {
        let store = store().await;
        let chat = Uuid::new_v4();
        let seeded = seed(&store, chat, 4).await;

        let prev = store.previous(chat, seeded[2].id, 10).await.unwrap();
        let contents: Vec<_> = prev.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m1", "m0"]);

        let prev = store.previous(chat, seeded[3].id, 1).await.unwrap();
        assert_eq!(prev.len(), 1);
        assert_eq!(prev[0].content, "m2");
    }
}
