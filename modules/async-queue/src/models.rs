use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum InvocationStatus {
    Queued,
    Running,
    Succeeded,
    Dlq,
    Paused,
}

impl InvocationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Dlq => "dlq",
            Self::Paused => "paused",
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct AsyncInvocation {
    pub id: Uuid,
    pub tenant_id: String,
    pub namespace: String,
    pub function_id: String,
    pub function_name: String,
    pub workflow_id: Option<String>,
    pub workflow_name: Option<String>,
    pub payload: serde_json::Value,
    pub status: InvocationStatus,
    pub attempt: i32,
    pub max_attempts: i32,
    pub backoff_base_ms: i64,
    pub backoff_max_ms: i64,
    pub next_run_at: DateTime<Utc>,
    pub locked_by: Option<String>,
    pub locked_until: Option<DateTime<Utc>>,
    pub request_id: Option<String>,
    pub output: Option<serde_json::Value>,
    pub duration_ms: Option<i64>,
    pub cold_start: Option<bool>,
    pub last_error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Inputs for a new invocation. Defaults are filled in by [`crate::enqueue::enqueue`]
/// when left `None`.
#[derive(Debug, Clone, Default)]
pub struct NewInvocation {
    pub function_id: String,
    pub function_name: String,
    pub workflow_id: Option<String>,
    pub workflow_name: Option<String>,
    pub payload: serde_json::Value,
    pub max_attempts: Option<i32>,
    pub backoff_base_ms: Option<i64>,
    pub backoff_max_ms: Option<i64>,
}

pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;
pub const DEFAULT_BACKOFF_BASE_MS: i64 = 1_000;
pub const DEFAULT_BACKOFF_MAX_MS: i64 = 60_000;

/// Result fields recorded when a delivery resolves.
#[derive(Debug, Clone, Default)]
pub struct ResolutionResult {
    pub request_id: Option<String>,
    pub output: Option<serde_json::Value>,
    pub duration_ms: Option<i64>,
    pub cold_start: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueSummary {
    pub queued: i64,
    pub running: i64,
    pub succeeded: i64,
    pub dlq: i64,
    pub paused: i64,
    pub succeeded_last_60s: i64,
    pub succeeded_last_300s: i64,
}
