use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionRecord {
    pub id: String,
    pub tenant_id: String,
    pub namespace: String,
    pub name: String,
    pub runtime_id: String,
    pub memory_mb: i32,
    pub timeout_s: i32,
    pub env: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeRef {
    pub function_id: String,
    pub storage_uri: String,
    pub checksum: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub size_bytes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerRef {
    pub id: String,
    pub name: String,
    pub storage_uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeRecord {
    pub id: String,
    pub name: String,
    pub image: String,
}

/// A tagged feature set a concrete [`crate::store::MetadataStore`] can
/// advertise, checked by callers instead of runtime type introspection
/// (spec.md §9 Design Notes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreCapability {
    Pagination,
    Workflow,
}
