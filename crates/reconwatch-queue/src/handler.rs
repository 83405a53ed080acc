//! Job handler contract: what the worker pool dispatches to.

use async_trait::async_trait;
use reconwatch_core::domain::Job;

/// Result of running a job to completion. The pool translates this into the
/// right `JobQueue` call — §7's propagation policy lives here, not in the
/// store: handlers never raise, they classify.
pub enum HandlerOutcome {
    Success,
    /// Transient failure: `scanner_timeout`, `scanner_error`,
    /// `dependency_unreachable` — consumes an attempt, backs off, retries
    /// until `max_attempts`.
    Retryable(String),
    /// `scope_denied` or any other terminal error the job should never be
    /// retried for, regardless of attempts remaining.
    Fatal(String),
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Run the work described by `job`. Must never panic on expected
    /// failure modes — wrap them in `HandlerOutcome` instead.
    async fn handle(&self, job: &Job) -> HandlerOutcome;
}
