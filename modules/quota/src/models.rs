use serde::Serialize;

pub const WINDOWED_DIMENSIONS: &[&str] = &["invocations", "event_publishes"];
pub const GAUGE_DIMENSIONS: &[&str] = &[
    "functions_count",
    "memory_mb",
    "vcpu_milli",
    "disk_iops",
    "async_queue_depth",
];

#[derive(Debug, Clone, Serialize)]
pub struct QuotaDecision {
    pub allowed: bool,
    pub used: i64,
    pub limit: i64,
    pub window_s: i32,
    pub retry_after_s: i32,
}

pub(crate) struct QuotaRow {
    pub hard_limit: i64,
    pub burst: i64,
    pub window_s: i32,
}
