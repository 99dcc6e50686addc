//! Deadline + retry wrapper shared by all stages.

use std::future::Future;

use tracing::{debug, warn};

use crate::runtime::retry::{FailureKind, RetryPolicy, StageFailure};
use crate::runtime::types::StageName;

/// Outcome of running one stage to completion.
#[derive(Debug)]
pub struct StageOutcome<T> {
    pub result: Result<T, StageFailure>,
    /// Attempts actually made (≥ 1).
    pub attempts: u32,
}

/// Runs a stage body under a [`RetryPolicy`].
///
/// Each attempt gets the full policy deadline; an attempt that exceeds it is
/// dropped (releasing whatever it held) and reported as
/// [`FailureKind::Timeout`].  Failures are retried only while
/// [`RetryPolicy::should_retry`] allows it, with the fixed policy backoff in
/// between.
#[derive(Debug, Clone, Copy)]
pub struct StageRunner<'a> {
    stage: StageName,
    policy: &'a RetryPolicy,
    timeout_message: &'a str,
}

impl<'a> StageRunner<'a> {
    /// `timeout_message` is the user-facing text used when an attempt times
    /// out.
    pub fn new(stage: StageName, policy: &'a RetryPolicy, timeout_message: &'a str) -> Self {
        Self {
            stage,
            policy,
            timeout_message,
        }
    }

    /// Run `attempt_fn` until it succeeds, fails permanently, or the attempt
    /// budget is spent.  `attempt_fn` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, mut attempt_fn: F) -> StageOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, StageFailure>>,
    {
        let stage = self.stage;
        let mut attempt = 1;
        loop {
            debug!(%stage, attempt, "stage attempt started");

            let result = match tokio::time::timeout(self.policy.deadline, attempt_fn(attempt)).await {
                Ok(r) => r,
                Err(_) => Err(StageFailure::new(
                    FailureKind::Timeout,
                    self.timeout_message,
                    format!("{stage} exceeded its {:?} deadline", self.policy.deadline),
                )),
            };

            match result {
                Ok(value) => {
                    return StageOutcome {
                        result: Ok(value),
                        attempts: attempt,
                    };
                }
                Err(failure) if self.policy.should_retry(failure.kind, attempt) => {
                    warn!(
                        %stage,
                        attempt,
                        kind = %failure.kind,
                        detail = %failure.detail,
                        backoff_ms = self.policy.backoff.as_millis() as u64,
                        "stage attempt failed; retrying"
                    );
                    tokio::time::sleep(self.policy.backoff).await;
                    attempt += 1;
                }
                Err(failure) => {
                    warn!(
                        %stage,
                        attempt,
                        kind = %failure.kind,
                        class = %failure.class(),
                        detail = %failure.detail,
                        "stage failed"
                    );
                    return StageOutcome {
                        result: Err(failure),
                        attempts: attempt,
                    };
                }
            }
        }
    }
}
