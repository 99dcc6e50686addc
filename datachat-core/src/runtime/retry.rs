//! Failure taxonomy and per-stage retry policy.

use std::time::Duration;

use strum::{AsRefStr, Display};

/// Coarse failure class; decides whether retrying can help at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum FailureClass {
    /// May succeed if attempted again (rate limit, timeout, storage hiccup).
    Transient,
    /// Will fail the same way every time (bad credentials, empty dataset).
    Permanent,
}

/// Fine-grained failure kind carried by a [`StageFailure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    /// The stage deadline expired.
    Timeout,
    /// The LLM provider answered 429.
    RateLimited,
    /// The LLM provider rejected the credentials.
    Unauthorized,
    /// The LLM provider is unreachable or answered 5xx.
    Unavailable,
    /// The message store failed transiently.
    Storage,
    /// The dataset is missing, empty or of an unsupported kind.
    Dataset,
    /// The generated query could not be executed.
    Query,
    /// Anything else (malformed provider response, serialization, ...).
    Internal,
}

impl FailureKind {
    pub fn class(self) -> FailureClass {
        match self {
            FailureKind::Timeout
            | FailureKind::RateLimited
            | FailureKind::Unavailable
            | FailureKind::Storage => FailureClass::Transient,
            FailureKind::Unauthorized
            | FailureKind::Dataset
            | FailureKind::Query
            | FailureKind::Internal => FailureClass::Permanent,
        }
    }
}

/// Deadline and retry budget of a single stage.
///
/// A failure is retried only when its kind is listed in `retryable` *and*
/// the attempt budget is not exhausted.  A transient kind that is not listed
/// (e.g. an execute timeout) still fails immediately.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Deadline applied to every individual attempt.
    pub deadline: Duration,
    /// Total attempts including the first one; never less than 1.
    pub max_attempts: u32,
    /// Fixed delay between two attempts.
    pub backoff: Duration,
    pub retryable: Vec<FailureKind>,
}

impl RetryPolicy {
    /// `true` if attempt number `attempt` (1-based) failed with `kind` and
    /// another attempt is allowed.
    pub fn should_retry(&self, kind: FailureKind, attempt: u32) -> bool {
        attempt < self.max_attempts.max(1)
            && kind.class() == FailureClass::Transient
            && self.retryable.contains(&kind)
    }
}

/// A classified stage failure.
///
/// `user_message` is the only text that ever reaches the chat; `detail` is
/// for logs.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind} failure: {detail}")]
pub struct StageFailure {
    pub kind: FailureKind,
    pub user_message: String,
    pub detail: String,
}

impl StageFailure {
    pub fn new(kind: FailureKind, user_message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            user_message: user_message.into(),
            detail: detail.into(),
        }
    }

    pub fn class(&self) -> FailureClass {
        self.kind.class()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn policy(max_attempts: u32, retryable: Vec<FailureKind>) -> RetryPolicy {
        RetryPolicy {
            deadline: Duration::from_secs(1),
            max_attempts,
            backoff: Duration::ZERO,
            retryable,
        }
    }

    #[test]
    fn retries_only_listed_transient_kinds_within_budget() {
        let p = policy(3, vec![FailureKind::RateLimited, FailureKind::Timeout]);
        assert!(p.should_retry(FailureKind::RateLimited, 1));
        assert!(p.should_retry(FailureKind::RateLimited, 2));
        assert!(!p.should_retry(FailureKind::RateLimited, 3));
        assert!(!p.should_retry(FailureKind::Storage, 1));
    }

    #[test]
    fn permanent_kinds_are_never_retried() {
        let p = policy(5, vec![FailureKind::Unauthorized, FailureKind::Dataset]);
        assert!(!p.should_retry(FailureKind::Unauthorized, 1));
        assert!(!p.should_retry(FailureKind::Dataset, 1));
    }

    #[test]
    fn single_attempt_policy_never_retries() {
        let p = policy(1, vec![FailureKind::Timeout]);
        assert!(!p.should_retry(FailureKind::Timeout, 1));
        let zero = policy(0, vec![FailureKind::Timeout]);
        assert!(!zero.should_retry(FailureKind::Timeout, 1));
    }
}
