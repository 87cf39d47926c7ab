use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum InboxStatus {
    Processing,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct EventInboxRow {
    pub subscription_id: Uuid,
    pub message_id: Uuid,
    pub tenant_id: String,
    pub namespace: String,
    pub delivery_id: Uuid,
    pub status: InboxStatus,
    pub request_id: Option<String>,
    pub output: Option<serde_json::Value>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum PrepareOutcome {
    Proceed,
    Deduplicated(EventInboxRow),
}
