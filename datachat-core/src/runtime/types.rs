use serde::Serialize;
use strum::{AsRefStr, Display};
use thiserror::Error;
use uuid::Uuid;

use crate::engine::dataset::DatasetRef;
use crate::engine::table::Table;
use crate::message::{ChatMessage, ContentType};

/// Jobs are identified by the message id they answer.
pub type JobId = Uuid;

/// A prompt submitted for execution.
///
/// Created by the submit endpoint and consumed by exactly one worker.
#[derive(Debug, Clone)]
pub struct PromptJob {
    pub message_id: JobId,
    pub chat_id: Uuid,
    pub prompt: String,
    pub dataset: Option<DatasetRef>,
    /// Bounded window of earlier messages in the chat, newest first.
    pub history: Vec<ChatMessage>,
}

// ── Stage results ─────────────────────────────────────────────────────────────

/// Classification of a [`StageResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, Serialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StageKind {
    Sql,
    Text,
    Error,
}

/// Payload of a [`StageResult`].
#[derive(Debug, Clone, PartialEq)]
pub enum StageContent {
    Text(String),
    /// Column-major query result.
    Table(Table),
}

/// Typed value handed from one stage to the next.
///
/// Never persisted directly: the persist stage turns the final result into
/// exactly one [`ChatMessage`].
#[derive(Debug, Clone, PartialEq)]
pub struct StageResult {
    pub kind: StageKind,
    pub content: StageContent,
}

impl StageResult {
    /// An unexecuted query.
    pub fn sql(query: impl Into<String>) -> Self {
        Self {
            kind: StageKind::Sql,
            content: StageContent::Text(query.into()),
        }
    }

    /// The result of an executed query.
    pub fn table(table: Table) -> Self {
        Self {
            kind: StageKind::Sql,
            content: StageContent::Table(table),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: StageKind::Text,
            content: StageContent::Text(text.into()),
        }
    }

    /// A user-facing error.  Callers must pass a generic message, never a raw
    /// backend error.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: StageKind::Error,
            content: StageContent::Text(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == StageKind::Error
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.content {
            StageContent::Text(t) => Some(t),
            StageContent::Table(_) => None,
        }
    }
}

// ── Job tracking ──────────────────────────────────────────────────────────────

/// Named stages of the chain, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, Serialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StageName {
    Translate,
    Execute,
    Persist,
}

impl StageName {
    pub const ALL: [StageName; 3] = [StageName::Translate, StageName::Execute, StageName::Persist];

    pub fn index(self) -> usize {
        match self {
            StageName::Translate => 0,
            StageName::Execute => 1,
            StageName::Persist => 2,
        }
    }
}

/// High-level lifecycle state of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum JobStatus {
    /// Queued, no worker has picked it up yet.
    Pending,
    /// A worker is running the named stage.
    Running { stage: StageName },
    /// A message of the given content type was persisted.
    Completed { content_type: ContentType },
    /// Persist failed for good, or the job was abandoned at shutdown.
    Lost,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed { .. } | JobStatus::Lost)
    }
}

/// Execution status of a single stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Pending,
    Running,
    Completed,
    Failed,
    /// Not run because an earlier stage produced an error.
    Skipped,
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors produced by the runtime layer.
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    /// The job queue is at capacity.
    #[error("job queue full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// The orchestrator has shut down and no longer accepts jobs.
    #[error("orchestrator shut down")]
    Shutdown,

    /// A job for this message is already queued or running.
    #[error("job already submitted for message {message_id}")]
    AlreadySubmitted { message_id: JobId },

    /// The referenced job does not exist.
    #[error("job not found: {message_id}")]
    JobNotFound { message_id: JobId },
}
