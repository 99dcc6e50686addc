//! The fixed `translate → execute → persist` chain for one job.
//!
//! Every stage boundary converts failures into an `error` [`StageResult`],
//! so the chain always reaches persist.  The only way a job ends without a
//! confirmed message is persist itself failing; that case is logged as
//! `job lost` and counted by the tracker.  A timed-out insert is never
//! retried since it may already have committed.

use std::sync::Arc;

use tracing::{Instrument, error, info, info_span, warn};

use crate::backend::{BackendError, ExecutionBackend, TranslateRequest, Translation};
use crate::config::PipelineConfig;
use crate::engine::dataset::{self, Dataset, Schema};
use crate::engine::{EngineError, QueryEngine};
use crate::message::{ContentType, NewMessage};
use crate::runtime::retry::{FailureKind, StageFailure};
use crate::runtime::stage::StageRunner;
use crate::runtime::tracker::JobTracker;
use crate::runtime::types::{JobStatus, PromptJob, StageContent, StageKind, StageName, StageResult, StageStatus};
use crate::store::MessageStore;

// ── User-facing messages ──────────────────────────────────────────────────────

pub const TRANSLATE_FAILED: &str = "An error occurred while translating the user prompt";
pub const TRANSLATE_TIMEOUT: &str = "The translation of the prompt timed out";
pub const RATE_LIMITED: &str = "Rate limit error from OpenAI API. Please try again later";
pub const INVALID_CREDENTIALS: &str = "OpenAI API key is invalid";
pub const DATASET_FAILED: &str = "The dataset could not be loaded";
pub const EXECUTE_FAILED: &str = "An error occurred while executing method";
pub const EXECUTE_TIMEOUT: &str = "The execution of the prompt timed out";

fn translate_failure(e: BackendError) -> StageFailure {
    let kind = e.kind();
    let user_message = match kind {
        FailureKind::Unauthorized => INVALID_CREDENTIALS,
        FailureKind::RateLimited => RATE_LIMITED,
        FailureKind::Timeout => TRANSLATE_TIMEOUT,
        _ => TRANSLATE_FAILED,
    };
    StageFailure::new(kind, user_message, e.to_string())
}

fn execute_failure(e: EngineError) -> StageFailure {
    StageFailure::new(FailureKind::Query, EXECUTE_FAILED, e.to_string())
}

fn storage_failure(e: sqlx::Error) -> StageFailure {
    use sqlx::error::ErrorKind;

    let permanent = e.as_database_error().is_some_and(|db| {
        matches!(
            db.kind(),
            ErrorKind::UniqueViolation
                | ErrorKind::ForeignKeyViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::CheckViolation
        )
    });
    let kind = if permanent {
        FailureKind::Internal
    } else {
        FailureKind::Storage
    };
    StageFailure::new(kind, String::new(), e.to_string())
}

/// Shared, immutable context of all workers.
pub(crate) struct Chain<S> {
    pub(crate) config: Arc<PipelineConfig>,
    pub(crate) backend: Arc<dyn ExecutionBackend>,
    pub(crate) engine: QueryEngine,
    pub(crate) store: Arc<S>,
    pub(crate) tracker: JobTracker,
}

impl<S: MessageStore> Chain<S> {
    pub(crate) fn new(
        config: Arc<PipelineConfig>,
        backend: Arc<dyn ExecutionBackend>,
        store: Arc<S>,
        tracker: JobTracker,
    ) -> Self {
        Self {
            engine: QueryEngine::new(config.row_cap),
            config,
            backend,
            store,
            tracker,
        }
    }

    /// Drive one job through all three stages.
    pub(crate) async fn run(&self, job: PromptJob) {
        let span = info_span!("job", message_id = %job.message_id, chat_id = %job.chat_id);
        self.run_inner(job).instrument(span).await
    }

    async fn run_inner(&self, job: PromptJob) {
        info!(backend = self.backend.name(), "job started");

        let (translated, dataset) = self.translate(&job).await;

        let executed = if translated.is_error() {
            self.tracker
                .set_stage_status(job.message_id, StageName::Execute, StageStatus::Skipped)
                .await;
            translated
        } else {
            self.execute(&job, translated, dataset.as_ref()).await
        };

        self.persist(&job, executed, dataset.as_ref()).await;
    }

    async fn begin(&self, job: &PromptJob, stage: StageName) {
        self.tracker
            .set_status(job.message_id, JobStatus::Running { stage })
            .await;
        self.tracker
            .set_stage_status(job.message_id, stage, StageStatus::Running)
            .await;
    }

    async fn finish(&self, job: &PromptJob, stage: StageName, attempts: u32, ok: bool) {
        self.tracker.set_attempts(job.message_id, stage, attempts).await;
        let status = if ok {
            StageStatus::Completed
        } else {
            StageStatus::Failed
        };
        self.tracker.set_stage_status(job.message_id, stage, status).await;
    }

    // ── Translate ────────────────────────────────────────────────────────────

    /// Load the dataset (once, never retried) and translate the prompt.
    async fn translate(&self, job: &PromptJob) -> (StageResult, Option<Dataset>) {
        self.begin(job, StageName::Translate).await;

        let (schema, dataset) = match &job.dataset {
            None => (Schema::new(), None),
            Some(reference) => {
                let loaded = tokio::time::timeout(self.config.execute.deadline, dataset::load(reference)).await;
                match loaded {
                    Ok(Ok(ds)) => (reference.schema(), Some(ds)),
                    Ok(Err(e)) => {
                        warn!(error = %e, uri = %reference.uri, "dataset load failed");
                        self.finish(job, StageName::Translate, 1, false).await;
                        return (StageResult::error(DATASET_FAILED), None);
                    }
                    Err(_) => {
                        warn!(uri = %reference.uri, "dataset load timed out");
                        self.finish(job, StageName::Translate, 1, false).await;
                        return (StageResult::error(DATASET_FAILED), None);
                    }
                }
            }
        };

        let req = TranslateRequest {
            prompt: &job.prompt,
            schema: &schema,
            dataset: dataset.as_ref(),
            history: &job.history,
        };
        let backend = &self.backend;
        let tracker = &self.tracker;
        let message_id = job.message_id;

        let outcome = StageRunner::new(StageName::Translate, &self.config.translate, TRANSLATE_TIMEOUT)
            .run(move |attempt| async move {
                tracker.set_attempts(message_id, StageName::Translate, attempt).await;
                backend.translate(req).await.map_err(translate_failure)
            })
            .await;

        let ok = outcome.result.is_ok();
        self.finish(job, StageName::Translate, outcome.attempts, ok).await;

        let result = match outcome.result {
            Ok(Translation::Query(q)) => StageResult::sql(q),
            Ok(Translation::Explanation(text)) => StageResult::text(text),
            Err(failure) => StageResult::error(failure.user_message),
        };
        (result, dataset)
    }

    // ── Execute ──────────────────────────────────────────────────────────────

    async fn execute(&self, job: &PromptJob, input: StageResult, dataset: Option<&Dataset>) -> StageResult {
        self.begin(job, StageName::Execute).await;

        let schema = job.dataset.as_ref().map(|d| d.schema()).unwrap_or_default();
        let engine = self.engine;
        let input = &input;
        let schema = &schema;

        let outcome = StageRunner::new(StageName::Execute, &self.config.execute, EXECUTE_TIMEOUT)
            .run(move |_| async move {
                match (input.kind, &input.content) {
                    (StageKind::Sql, StageContent::Text(query)) => {
                        let Some(ds) = dataset else {
                            return Err(StageFailure::new(
                                FailureKind::Dataset,
                                EXECUTE_FAILED,
                                "query produced but no dataset is attached",
                            ));
                        };
                        engine
                            .execute(ds, schema, query)
                            .await
                            .map(StageResult::table)
                            .map_err(execute_failure)
                    }
                    _ => Ok(input.clone()),
                }
            })
            .await;

        let ok = outcome.result.is_ok();
        self.finish(job, StageName::Execute, outcome.attempts, ok).await;

        match outcome.result {
            Ok(result) => result,
            Err(failure) => StageResult::error(failure.user_message),
        }
    }

    // ── Persist ──────────────────────────────────────────────────────────────

    /// Serialize the final result into message content.
    fn render(
        &self,
        job: &PromptJob,
        result: StageResult,
        dataset: Option<&Dataset>,
    ) -> (String, ContentType) {
        match (result.kind, result.content) {
            (StageKind::Error, StageContent::Text(msg)) => (msg, ContentType::Error),
            (StageKind::Text, StageContent::Text(text)) => (text, ContentType::Text),
            (StageKind::Sql, StageContent::Table(table)) => {
                let schema = job.dataset.as_ref().map(|d| d.schema()).unwrap_or_default();
                let source = dataset.map(|ds| (ds, &schema));
                match serde_json::to_string(&self.backend.present(&table, source)) {
                    Ok(json) => (json, ContentType::Json),
                    Err(e) => {
                        warn!(error = %e, "failed to serialize structured content");
                        (EXECUTE_FAILED.to_owned(), ContentType::Error)
                    }
                }
            }
            (kind, _) => {
                warn!(%kind, "unexpected final stage result");
                (EXECUTE_FAILED.to_owned(), ContentType::Error)
            }
        }
    }

    async fn persist(&self, job: &PromptJob, result: StageResult, dataset: Option<&Dataset>) {
        self.begin(job, StageName::Persist).await;

        let (content, content_type) = self.render(job, result, dataset);
        let artifact_version_id = job.dataset.as_ref().and_then(|d| d.artifact_version_id);
        let store = &self.store;
        let tracker = &self.tracker;
        let message_id = job.message_id;
        let chat_id = job.chat_id;
        let content = &content;

        let outcome = StageRunner::new(StageName::Persist, &self.config.persist, "")
            .run(move |attempt| async move {
                tracker.set_attempts(message_id, StageName::Persist, attempt).await;
                store
                    .insert(NewMessage::from_system(
                        chat_id,
                        artifact_version_id,
                        content.clone(),
                        content_type,
                    ))
                    .await
                    .map_err(storage_failure)
            })
            .await;

        let ok = outcome.result.is_ok();
        self.finish(job, StageName::Persist, outcome.attempts, ok).await;

        match outcome.result {
            Ok(msg) => {
                self.tracker
                    .set_status(job.message_id, JobStatus::Completed { content_type })
                    .await;
                info!(persisted_id = %msg.id, %content_type, "job completed");
            }
            Err(failure) => {
                self.tracker.mark_lost(job.message_id).await;
                error!(
                    attempts = outcome.attempts,
                    error = %failure.detail,
                    lost_total = self.tracker.lost_jobs(),
                    "job lost: persist failed"
                );
            }
        }
    }
}
