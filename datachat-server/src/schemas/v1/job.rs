//! Job tracker view.

use chrono::{DateTime, Utc};
use datachat_core::{JobStatus, JobView, StageProgress};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StageResponse {
    /// `translate`, `execute` or `persist`.
    pub stage: String,
    /// `pending`, `running`, `completed`, `failed` or `skipped`.
    pub status: String,
    pub attempts: u32,
}

impl From<StageProgress> for StageResponse {
    fn from(p: StageProgress) -> Self {
        Self {
            stage: p.stage.to_string(),
            status: stage_status(p.status).to_owned(),
            attempts: p.attempts,
        }
    }
}

fn stage_status(status: datachat_core::StageStatus) -> &'static str {
    use datachat_core::StageStatus::*;
    match status {
        Pending => "pending",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Skipped => "skipped",
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct JobResponse {
    pub message_id: Uuid,
    pub chat_id: Uuid,
    /// `pending`, `running`, `completed` or `lost`.
    pub state: String,
    /// Stage currently running, when `state` is `running`.
    pub stage: Option<String>,
    /// Content type of the persisted answer, when `state` is `completed`.
    pub content_type: Option<String>,
    pub stages: Vec<StageResponse>,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<JobView> for JobResponse {
    fn from(v: JobView) -> Self {
        let (state, stage, content_type) = match v.status {
            JobStatus::Pending => ("pending", None, None),
            JobStatus::Running { stage } => ("running", Some(stage.to_string()), None),
            JobStatus::Completed { content_type } => ("completed", None, Some(content_type.to_string())),
            JobStatus::Lost => ("lost", None, None),
        };
        Self {
            message_id: v.message_id,
            chat_id: v.chat_id,
            state: state.to_owned(),
            stage,
            content_type,
            stages: v.stages.into_iter().map(StageResponse::from).collect(),
            submitted_at: v.submitted_at,
            finished_at: v.finished_at,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use datachat_core::{ContentType, StageName, StageStatus};

    #[test]
    fn completed_job_reports_content_type() {
        let view = JobView {
            message_id: Uuid::nil(),
            chat_id: Uuid::nil(),
            status: JobStatus::Completed {
                content_type: ContentType::Error,
            },
            stages: vec![StageProgress {
                stage: StageName::Execute,
                status: StageStatus::Skipped,
                attempts: 0,
            }],
            submitted_at: Utc::now(),
            finished_at: Some(Utc::now()),
        };
        let resp = JobResponse::from(view);
        assert_eq!(resp.state, "completed");
        assert_eq!(resp.content_type.as_deref(), Some("error"));
        assert_eq!(resp.stages[0].stage, "execute");
        assert_eq!(resp.stages[0].status, "skipped");
    }
}
