//! The async invocation queue (spec.md §4.2): lease-based dispatch,
//! retry with full-jitter exponential backoff, dead-letter handling,
//! pause/resume, and idempotent enqueue.

mod enqueue;
mod lease;
mod models;
mod pause;
mod summary;

pub use enqueue::{enqueue, enqueue_with_idempotency, EnqueueIdempotentOutcome};
pub use lease::{acquire_due, mark_dlq, mark_retry, mark_succeeded, scheduled_retry_time};
pub use models::{
    AsyncInvocation, InvocationStatus, NewInvocation, QueueSummary, ResolutionResult,
    DEFAULT_BACKOFF_BASE_MS, DEFAULT_BACKOFF_MAX_MS, DEFAULT_MAX_ATTEMPTS,
};
pub use pause::{
    delete, pause, pause_by_function, pause_by_workflow, requeue_from_dlq, resume,
    resume_by_function, resume_by_workflow,
};
pub use summary::summary;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn scheduled_retry_time_is_in_the_future_and_bounded() {
        let before = chrono::Utc::now();
        let t = scheduled_retry_time(1, 1000, 60_000);
        assert!(t >= before);
        assert!(t <= before + Duration::milliseconds(1_000) + Duration::seconds(1));
    }

    #[test]
    fn scheduled_retry_time_caps_growth_at_backoff_max() {
        let before = chrono::Utc::now();
        let t = scheduled_retry_time(50, 1000, 60_000);
        assert!(t <= before + Duration::milliseconds(60_000) + Duration::seconds(1));
    }
}
