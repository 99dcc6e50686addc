//! Pipeline and backend configuration.
//!
//! Both structs are built once at process start (the server maps environment
//! variables onto them) and handed to the orchestrator by value or `Arc`.
//! Nothing in this crate reads the environment directly.

use std::time::Duration;

use strum::{AsRefStr, Display, EnumString};

use crate::runtime::retry::{FailureKind, RetryPolicy};

/// Long-poll behaviour of the message reader.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay between two store queries while waiting.
    pub interval: Duration,
    /// Upper bound on how long a single poll request may block.
    pub max_wait: Duration,
    /// When `false`, `poll=true` requests behave like `poll=false`.
    pub enabled: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            max_wait: Duration::from_secs(20),
            enabled: true,
        }
    }
}

/// Configuration shared by the stage runner, orchestrator and reader.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of worker tasks draining the job queue.
    pub workers: usize,
    /// Capacity of the bounded job queue; `submit` fails when it is full.
    pub queue_capacity: usize,
    pub translate: RetryPolicy,
    pub execute: RetryPolicy,
    pub persist: RetryPolicy,
    /// Maximum number of rows an executed query may return.
    pub row_cap: usize,
    /// Number of prior chat messages handed to backends as context.
    pub history_window: usize,
    /// How long shutdown waits for queued and running jobs to finish.
    pub shutdown_grace: Duration,
    pub poll: PollConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 64,
            translate: RetryPolicy {
                deadline: Duration::from_secs(60),
                max_attempts: 3,
                backoff: Duration::from_secs(30),
                retryable: vec![
                    FailureKind::Timeout,
                    FailureKind::RateLimited,
                    FailureKind::Unavailable,
                ],
            },
            execute: RetryPolicy {
                deadline: Duration::from_secs(30),
                max_attempts: 1,
                backoff: Duration::ZERO,
                retryable: Vec::new(),
            },
            persist: RetryPolicy {
                deadline: Duration::from_secs(10),
                max_attempts: 2,
                backoff: Duration::from_secs(1),
                // An insert that outlives its deadline may still have
                // committed; retrying it would write the message twice.
                retryable: vec![FailureKind::Storage],
            },
            row_cap: 100,
            history_window: 10,
            shutdown_grace: Duration::from_secs(30),
            poll: PollConfig::default(),
        }
    }
}

/// Which [`ExecutionBackend`](crate::backend::ExecutionBackend) serves prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum BackendKind {
    /// Prompt → SQLite query → table.
    Sql,
    /// Prompt → direct natural-language answer.
    #[strum(to_string = "answer", serialize = "langchain")]
    Answer,
    /// Any prompt → dataset profile (no LLM involved).
    #[strum(to_string = "profile", serialize = "getting_started")]
    Profile,
}

/// Connection settings for the OpenAI-compatible chat completion API.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    /// Per-request HTTP timeout; the stage deadline still applies on top.
    pub http_timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Sql,
            base_url: "https://api.openai.com/v1".to_owned(),
            api_key: None,
            model: "gpt-3.5-turbo".to_owned(),
            http_timeout: Duration::from_secs(55),
        }
    }
}
