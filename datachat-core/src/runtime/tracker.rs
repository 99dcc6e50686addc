use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::runtime::types::{JobId, JobStatus, RuntimeError, StageName, StageStatus};

/// Per-stage progress of one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageProgress {
    pub stage: StageName,
    pub status: StageStatus,
    pub attempts: u32,
}

/// The in-memory record for a single submitted job.
#[derive(Debug, Clone)]
struct JobRecord {
    chat_id: Uuid,
    status: JobStatus,
    stages: [StageProgress; 3],
    submitted_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

/// Thread-safe job registry.
///
/// Uses a `tokio::sync::RwLock<HashMap>` so status reads never wait on each
/// other while workers update records.  Records are kept in memory only; a
/// restart forgets them (the messages themselves are durable).
#[derive(Debug, Clone, Default)]
pub struct JobTracker {
    inner: Arc<RwLock<HashMap<JobId, JobRecord>>>,
    lost: Arc<AtomicU64>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job as `Pending`.
    ///
    /// Fails if a job for the same message is still in flight; a finished
    /// job may be submitted again and replaces the old record.
    pub async fn register(&self, message_id: JobId, chat_id: Uuid) -> Result<(), RuntimeError> {
        let mut guard = self.inner.write().await;
        if let Some(existing) = guard.get(&message_id) {
            if !existing.status.is_terminal() {
                return Err(RuntimeError::AlreadySubmitted { message_id });
            }
        }
        guard.insert(
            message_id,
            JobRecord {
                chat_id,
                status: JobStatus::Pending,
                stages: StageName::ALL.map(|stage| StageProgress {
                    stage,
                    status: StageStatus::Pending,
                    attempts: 0,
                }),
                submitted_at: Utc::now(),
                finished_at: None,
            },
        );
        Ok(())
    }

    /// Drop a record that never made it into the queue.
    pub async fn forget(&self, message_id: JobId) {
        self.inner.write().await.remove(&message_id);
    }

    pub async fn set_status(&self, message_id: JobId, status: JobStatus) {
        if let Some(record) = self.inner.write().await.get_mut(&message_id) {
            if status.is_terminal() {
                record.finished_at = Some(Utc::now());
            }
            record.status = status;
        }
    }

    pub async fn set_stage_status(&self, message_id: JobId, stage: StageName, status: StageStatus) {
        if let Some(record) = self.inner.write().await.get_mut(&message_id) {
            record.stages[stage.index()].status = status;
        }
    }

    pub async fn set_attempts(&self, message_id: JobId, stage: StageName, attempts: u32) {
        if let Some(record) = self.inner.write().await.get_mut(&message_id) {
            record.stages[stage.index()].attempts = attempts;
        }
    }

    /// Mark a job lost and bump the lost-job counter.
    pub async fn mark_lost(&self, message_id: JobId) {
        self.lost.fetch_add(1, Ordering::Relaxed);
        self.set_status(message_id, JobStatus::Lost).await;
    }

    /// Jobs that have not reached a terminal state.
    pub async fn unfinished(&self) -> Vec<JobId> {
        self.inner
            .read()
            .await
            .iter()
            .filter(|(_, record)| !record.status.is_terminal())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Number of jobs lost since start-up.
    pub fn lost_jobs(&self) -> u64 {
        self.lost.load(Ordering::Relaxed)
    }

    /// Return a snapshot of the job's state.
    pub async fn get(&self, message_id: JobId) -> Option<JobView> {
        let guard = self.inner.read().await;
        let record = guard.get(&message_id)?;
        Some(JobView {
            message_id,
            chat_id: record.chat_id,
            status: record.status.clone(),
            stages: record.stages.to_vec(),
            submitted_at: record.submitted_at,
            finished_at: record.finished_at,
        })
    }
}

/// A read-only view of a job's current state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobView {
    pub message_id: JobId,
    pub chat_id: Uuid,
    pub status: JobStatus,
    pub stages: Vec<StageProgress>,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::message::ContentType;

    #[tokio::test]
    async fn in_flight_jobs_cannot_be_registered_twice() {
        let tracker = JobTracker::new();
        let id = Uuid::new_v4();
        tracker.register(id, Uuid::nil()).await.unwrap();
        assert!(matches!(
            tracker.register(id, Uuid::nil()).await,
            Err(RuntimeError::AlreadySubmitted { .. })
        ));

        tracker
            .set_status(id, JobStatus::Completed { content_type: ContentType::Text })
            .await;
        tracker.register(id, Uuid::nil()).await.unwrap();
        assert_eq!(tracker.get(id).await.unwrap().status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn lost_jobs_are_counted() {
        let tracker = JobTracker::new();
        let id = Uuid::new_v4();
        tracker.register(id, Uuid::nil()).await.unwrap();
        tracker.set_attempts(id, StageName::Persist, 2).await;
        tracker.mark_lost(id).await;

        let view = tracker.get(id).await.unwrap();
        assert_eq!(view.status, JobStatus::Lost);
        assert!(view.finished_at.is_some());
        assert_eq!(view.stages[2].attempts, 2);
        assert_eq!(tracker.lost_jobs(), 1);
    }

    #[tokio::test]
    async fn unfinished_lists_only_non_terminal_jobs() {
        let tracker = JobTracker::new();
        let done = Uuid::new_v4();
        let running = Uuid::new_v4();
        tracker.register(done, Uuid::nil()).await.unwrap();
        tracker.register(running, Uuid::nil()).await.unwrap();
        tracker
            .set_status(done, JobStatus::Completed { content_type: ContentType::Json })
            .await;
        tracker
            .set_status(running, JobStatus::Running { stage: StageName::Execute })
            .await;

        assert_eq!(tracker.unfinished().await, vec![running]);
    }
}
