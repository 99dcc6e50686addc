//! Asynchronous prompt pipeline over tabular datasets.
//!
//! A submitted [`PromptJob`] is translated by an [`ExecutionBackend`] into a
//! query or an explanation, executed against an in-memory copy of the
//! dataset and written back to the chat as exactly one message.  Readers
//! follow a chat through the [`LongPollReader`].

pub mod backend;
pub mod config;
pub mod engine;
pub mod message;
pub mod reader;
pub mod runtime;
pub mod store;

pub use backend::{BackendError, ExecutionBackend, build_backend};
pub use config::{BackendConfig, BackendKind, PipelineConfig, PollConfig};
pub use engine::dataset::{DatasetConfig, DatasetFile, DatasetRef};
pub use message::{ChatMessage, ContentType, MessageJsonContent, NewMessage};
pub use reader::LongPollReader;
pub use runtime::orchestrator::Orchestrator;
pub use runtime::retry::{FailureKind, RetryPolicy};
pub use runtime::tracker::{JobTracker, JobView, StageProgress};
pub use runtime::types::{JobId, JobStatus, PromptJob, RuntimeError, StageName, StageStatus};
pub use store::{MessageFilter, MessagePage, MessageStore, SqliteMessageStore};
