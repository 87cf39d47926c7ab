//! The error taxonomy shared by every engine in this core (§7 of the spec):
//! validation, not-found, state-mismatch, conflict, quota-denied, and
//! transient storage errors. Execution failures from the `Executor`/
//! `WebhookClient` collaborators are not represented here — the worker
//! absorbs those into a retry/DLQ state transition rather than surfacing
//! them as a `CoreError`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Input malformed — rejected before any write.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Target resource absent in the caller's current scope.
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    /// Target resource exists but isn't in the status the operation requires.
    #[error("{resource} {id} is {observed}, expected {expected}")]
    StateMismatch {
        resource: &'static str,
        id: String,
        expected: String,
        observed: String,
    },

    /// Unique-constraint violation or a lost idempotency/claim race.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Quota admission denied; the caller should wait `retry_after_s`
    /// before retrying the same admission check.
    #[error("quota denied, retry after {retry_after_s}s")]
    QuotaDenied { retry_after_s: i64 },

    /// Transient storage failure. Retryable at the caller's layer — this
    /// core does not automatically retry it internally.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl CoreError {
    pub fn not_found(resource: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource,
            id: id.into(),
        }
    }

    pub fn state_mismatch(
        resource: &'static str,
        id: impl Into<String>,
        expected: impl Into<String>,
        observed: impl Into<String>,
    ) -> Self {
        Self::StateMismatch {
            resource,
            id: id.into(),
            expected: expected.into(),
            observed: observed.into(),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_formats_with_resource_and_id() {
        let e = CoreError::not_found("invocation", "abc-123");
        assert_eq!(e.to_string(), "invocation not found: abc-123");
    }

    #[test]
    fn state_mismatch_surfaces_both_statuses() {
        let e = CoreError::state_mismatch("invocation", "abc", "dlq", "queued");
        assert_eq!(e.to_string(), "invocation abc is queued, expected dlq");
    }

    #[test]
    fn quota_denied_carries_retry_hint() {
        let e = CoreError::QuotaDenied { retry_after_s: 60 };
        assert_eq!(e.to_string(), "quota denied, retry after 60s");
    }
}
