//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use datachat_core::{LongPollReader, Orchestrator, SqliteMessageStore};

use crate::config::Config;

/// State shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// Chat message log.
    pub store: Arc<SqliteMessageStore>,
    /// Job queue and worker pool of the prompt pipeline.
    pub orchestrator: Orchestrator<SqliteMessageStore>,
    /// Long-poll reader over `store`.
    pub reader: LongPollReader<SqliteMessageStore>,
}

impl AppState {
    /// Wire the pipeline around `store`.  Must be called inside a Tokio
    /// runtime since it spawns the workers.
    pub fn new(
        config: Config,
        store: SqliteMessageStore,
        backend: Arc<dyn datachat_core::ExecutionBackend>,
    ) -> Self {
        let store = Arc::new(store);
        let pipeline = Arc::new(config.pipeline.clone());
        let orchestrator = Orchestrator::start(
            Arc::clone(&pipeline),
            backend,
            Arc::clone(&store),
            datachat_core::JobTracker::new(),
        );
        let reader = LongPollReader::new(Arc::clone(&store), pipeline.poll.clone());
        Self {
            config: Arc::new(config),
            store,
            orchestrator,
            reader,
        }
    }
}
