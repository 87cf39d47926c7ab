use async_trait::async_trait;
use queue_errors::CoreResult;
use scope::Scope;

use crate::models::{CodeRef, FileEntry, FunctionRecord, LayerRef, RuntimeRecord, StoreCapability};

/// The metadata store the cache wraps. Out of scope for this core (the
/// function/runtime registry lives in another service); only the
/// interface and a test double are implemented here.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    fn capabilities(&self) -> &[StoreCapability];

    async fn get_function_by_name(&self, scope: &Scope, name: &str) -> CoreResult<Option<FunctionRecord>>;
    async fn get_function_by_id(&self, scope: &Scope, id: &str) -> CoreResult<Option<FunctionRecord>>;
    async fn put_function(&self, record: FunctionRecord) -> CoreResult<()>;
    async fn delete_function(&self, scope: &Scope, id: &str) -> CoreResult<()>;

    async fn get_code(&self, function_id: &str) -> CoreResult<Option<CodeRef>>;
    async fn list_files(&self, function_id: &str) -> CoreResult<Vec<FileEntry>>;
    async fn list_layers(&self, function_id: &str) -> CoreResult<Vec<LayerRef>>;

    async fn get_runtime(&self, id: &str) -> CoreResult<Option<RuntimeRecord>>;
}

pub fn has_capability(store: &dyn MetadataStore, capability: StoreCapability) -> bool {
    store.capabilities().contains(&capability)
}
