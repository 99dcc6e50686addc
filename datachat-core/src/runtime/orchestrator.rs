use std::sync::Arc;
use std::time::Duration;

use flume::{Receiver, Sender, TrySendError};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backend::ExecutionBackend;
use crate::config::PipelineConfig;
use crate::runtime::chain::Chain;
use crate::runtime::tracker::{JobTracker, JobView};
use crate::runtime::types::{JobId, PromptJob, RuntimeError};
use crate::store::MessageStore;

/// The runtime orchestrator.
///
/// Owns a bounded job queue drained by a fixed pool of workers.  Each worker
/// takes one [`PromptJob`] at a time and runs its whole chain before taking
/// the next, so stages of a job never overlap while jobs of the same chat may
/// finish in any order.
///
/// # Usage
///
/// ```rust,ignore
/// let orchestrator = Orchestrator::start(config, backend, store, JobTracker::new());
/// orchestrator.submit(job).await?;
/// // completion is observed by reading the message store
/// orchestrator.shutdown().await;
/// ```
pub struct Orchestrator<S> {
    tx: Sender<PromptJob>,
    tracker: JobTracker,
    capacity: usize,
    grace: Duration,
    closing: CancellationToken,
    workers: Arc<Mutex<JoinSet<()>>>,
    _store: std::marker::PhantomData<fn() -> S>,
}

impl<S> Clone for Orchestrator<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            tracker: self.tracker.clone(),
            capacity: self.capacity,
            grace: self.grace,
            closing: self.closing.clone(),
            workers: Arc::clone(&self.workers),
            _store: std::marker::PhantomData,
        }
    }
}

impl<S: MessageStore> Orchestrator<S> {
    /// Start the orchestrator and spawn its workers.
    ///
    /// Workers run until [`Orchestrator::shutdown`] is called and the queue
    /// is drained.
    pub fn start(
        config: Arc<PipelineConfig>,
        backend: Arc<dyn ExecutionBackend>,
        store: Arc<S>,
        tracker: JobTracker,
    ) -> Self {
        let capacity = config.queue_capacity.max(1);
        let workers = config.workers.max(1);
        let grace = config.shutdown_grace;
        let (tx, rx) = flume::bounded::<PromptJob>(capacity);
        let closing = CancellationToken::new();

        let chain = Arc::new(Chain::new(config, backend, store, tracker.clone()));
        let mut set = JoinSet::new();
        for worker in 0..workers {
            let rx = rx.clone();
            let chain = Arc::clone(&chain);
            let closing = closing.clone();
            set.spawn(async move {
                Self::worker_loop(worker, rx, chain, closing).await;
            });
        }
        info!(workers, capacity, "orchestrator started");

        Self {
            tx,
            tracker,
            capacity,
            grace,
            closing,
            workers: Arc::new(Mutex::new(set)),
            _store: std::marker::PhantomData,
        }
    }

    async fn worker_loop(
        worker: usize,
        rx: Receiver<PromptJob>,
        chain: Arc<Chain<S>>,
        closing: CancellationToken,
    ) {
        loop {
            // Once closing, keep taking queued jobs until the queue is empty.
            let job = tokio::select! {
                biased;
                job = rx.recv_async() => match job {
                    Ok(job) => job,
                    Err(_) => break,
                },
                _ = closing.cancelled() => match rx.try_recv() {
                    Ok(job) => job,
                    Err(_) => break,
                },
            };
            debug!(worker, message_id = %job.message_id, "worker picked up job");
            chain.run(job).await;
        }
        debug!(worker, "worker stopped");
    }

    // ── Public API ───────────────────────────────────────────────────────────

    /// Enqueue a job and return without waiting for it.
    ///
    /// Fails with [`RuntimeError::QueueFull`] when the queue is saturated and
    /// with [`RuntimeError::AlreadySubmitted`] while an earlier job for the
    /// same message is still in flight.  After [`Orchestrator::shutdown`]
    /// every submission fails with [`RuntimeError::Shutdown`].
    pub async fn submit(&self, job: PromptJob) -> Result<JobId, RuntimeError> {
        if self.closing.is_cancelled() {
            return Err(RuntimeError::Shutdown);
        }
        let message_id = job.message_id;
        self.tracker.register(message_id, job.chat_id).await?;

        match self.tx.try_send(job) {
            Ok(()) => {
                debug!(%message_id, "job queued");
                Ok(message_id)
            }
            Err(e) => {
                self.tracker.forget(message_id).await;
                Err(match e {
                    TrySendError::Full(_) => RuntimeError::QueueFull {
                        capacity: self.capacity,
                    },
                    TrySendError::Disconnected(_) => RuntimeError::Shutdown,
                })
            }
        }
    }

    /// Return a snapshot of the job's current status.
    pub async fn status(&self, message_id: JobId) -> Result<JobView, RuntimeError> {
        self.tracker
            .get(message_id)
            .await
            .ok_or(RuntimeError::JobNotFound { message_id })
    }

    pub fn tracker(&self) -> &JobTracker {
        &self.tracker
    }

    /// Jobs waiting for a worker.
    pub fn queued(&self) -> usize {
        self.tx.len()
    }

    /// Stop accepting jobs and let the workers drain the queue.
    ///
    /// Workers get `shutdown_grace` to finish queued and running jobs.  When
    /// the grace period runs out they are aborted, and every job without a
    /// persisted message is marked lost.  Returns the number of jobs lost
    /// this way.
    pub async fn shutdown(&self) -> usize {
        self.closing.cancel();
        let mut workers = self.workers.lock().await;
        info!(queued = self.tx.len(), grace_ms = self.grace.as_millis() as u64, "draining job queue");

        let drained = tokio::time::timeout(self.grace, async {
            while workers.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!("shutdown grace period elapsed; aborting workers");
            workers.abort_all();
            while workers.join_next().await.is_some() {}
        }

        // Jobs still queued or cut off mid-chain.
        let abandoned = self.tracker.unfinished().await;
        for message_id in &abandoned {
            self.tracker.mark_lost(*message_id).await;
            error!(
                %message_id,
                lost_total = self.tracker.lost_jobs(),
                "job lost: abandoned at shutdown"
            );
        }
        info!(lost = abandoned.len(), "orchestrator stopped");
        abandoned.len()
    }
}
