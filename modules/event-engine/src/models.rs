use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct EventTopic {
    pub id: Uuid,
    pub tenant_id: String,
    pub namespace: String,
    pub name: String,
    pub retention_hours: i32,
    pub next_sequence: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A subscription's consumer target. Modeled as a tagged variant rather
/// than two optional ID/name pairs so "both halves set" is structurally
/// unrepresentable outside of the DB row itself (spec.md §9 Design Notes).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionTarget {
    Function { id: String, name: String },
    Workflow { id: String, name: String },
}

impl SubscriptionTarget {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Function { .. } => "function",
            Self::Workflow { .. } => "workflow",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WebhookConfig {
    pub url: Option<String>,
    pub method: Option<String>,
    pub headers: Option<serde_json::Value>,
    pub signing_secret: Option<String>,
    pub timeout_s: Option<i32>,
}

pub const DEFAULT_WEBHOOK_TIMEOUT_S: i32 = 30;
pub const MAX_WEBHOOK_TIMEOUT_S: i32 = 120;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EventSubscriptionRow {
    pub id: Uuid,
    pub tenant_id: String,
    pub namespace: String,
    pub topic_id: Uuid,
    pub name: String,
    pub consumer_group: String,
    pub target_type: String,
    pub function_id: Option<String>,
    pub function_name: Option<String>,
    pub workflow_id: Option<String>,
    pub workflow_name: Option<String>,
    pub enabled: bool,
    pub max_attempts: i32,
    pub backoff_base_ms: i64,
    pub backoff_max_ms: i64,
    pub max_inflight: i32,
    pub rate_limit_per_sec: i32,
    pub last_acked_sequence: i64,
    pub last_acked_at: Option<DateTime<Utc>>,
    pub last_dispatch_at: Option<DateTime<Utc>>,
    pub webhook_url: Option<String>,
    pub webhook_method: Option<String>,
    pub webhook_headers: Option<serde_json::Value>,
    pub webhook_signing_secret: Option<String>,
    pub webhook_timeout_s: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EventSubscriptionRow {
    pub fn target(&self) -> SubscriptionTarget {
        if self.target_type == "workflow" {
            SubscriptionTarget::Workflow {
                id: self.workflow_id.clone().unwrap_or_default(),
                name: self.workflow_name.clone().unwrap_or_default(),
            }
        } else {
            SubscriptionTarget::Function {
                id: self.function_id.clone().unwrap_or_default(),
                name: self.function_name.clone().unwrap_or_default(),
            }
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct EventMessage {
    pub id: Uuid,
    pub tenant_id: String,
    pub namespace: String,
    pub topic_id: Uuid,
    pub sequence: i64,
    pub ordering_key: String,
    pub payload: serde_json::Value,
    pub headers: Option<serde_json::Value>,
    pub source_outbox_id: Option<Uuid>,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum DeliveryStatus {
    Queued,
    Running,
    Succeeded,
    Dlq,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Dlq => "dlq",
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct EventDelivery {
    pub id: Uuid,
    pub tenant_id: String,
    pub namespace: String,
    pub subscription_id: Uuid,
    pub message_id: Uuid,
    pub message_sequence: i64,
    pub ordering_key: String,
    pub status: DeliveryStatus,
    pub attempt: i32,
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

/// A dispatchable delivery joined with the webhook parameters of its
/// subscription, as returned by `acquire_due_delivery`.
#[derive(Debug, Clone)]
pub struct DispatchableDelivery {
    pub delivery: EventDelivery,
    pub target: SubscriptionTarget,
    pub webhook: WebhookConfig,
}

#[derive(Debug, Clone)]
pub struct PublishResult {
    pub message: EventMessage,
    pub fanout_count: i64,
    pub newly_published: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionStats {
    pub inflight_count: i64,
    pub queued_count: i64,
    pub dlq_count: i64,
    pub latest_sequence: i64,
    pub oldest_unacked_at: Option<DateTime<Utc>>,
    pub lag: i64,
}
