use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_MAX_ATTEMPTS: i32 = 8;
pub const DEFAULT_BACKOFF_BASE_MS: i64 = 500;
pub const DEFAULT_BACKOFF_MAX_MS: i64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum OutboxStatus {
    Pending,
    Publishing,
    Published,
    Failed,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct EventOutboxRow {
    pub id: Uuid,
    pub tenant_id: String,
    pub namespace: String,
    pub topic_id: Uuid,
    pub ordering_key: String,
    pub payload: serde_json::Value,
    pub headers: Option<serde_json::Value>,
    pub status: OutboxStatus,
    pub attempt: i32,
    pub max_attempts: i32,
    pub next_attempt_at: DateTime<Utc>,
    pub locked_by: Option<String>,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub message_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct NewOutboxEntry {
    pub topic_id: Uuid,
    pub ordering_key: String,
    pub payload: serde_json::Value,
    pub headers: Option<serde_json::Value>,
}
