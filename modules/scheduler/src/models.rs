use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Uuid,
    pub tenant_id: String,
    pub namespace: String,
    pub function_name: String,
    pub function_id: String,
    pub cron_expression: String,
    pub input: Option<serde_json::Value>,
    pub enabled: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct NewSchedule {
    pub function_name: String,
    pub function_id: String,
    pub cron_expression: String,
    pub input: Option<serde_json::Value>,
}
