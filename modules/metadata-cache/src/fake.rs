use std::collections::HashMap;

use async_trait::async_trait;
use queue_errors::CoreResult;
use scope::Scope;
use tokio::sync::RwLock;

use crate::models::{CodeRef, FileEntry, FunctionRecord, LayerRef, RuntimeRecord, StoreCapability};
use crate::store::MetadataStore;

/// In-memory [`MetadataStore`] for tests. The real store (function
/// registry, code storage, layers) lives in another service and is out
/// of scope for this core.
#[derive(Default)]
pub struct FakeMetadataStore {
    functions: RwLock<HashMap<String, FunctionRecord>>,
    code: RwLock<HashMap<String, CodeRef>>,
    files: RwLock<HashMap<String, Vec<FileEntry>>>,
    layers: RwLock<HashMap<String, Vec<LayerRef>>>,
    runtimes: RwLock<HashMap<String, RuntimeRecord>>,
}

impl FakeMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_function(&self, record: FunctionRecord) {
        self.functions.write().await.insert(record.id.clone(), record);
    }

    pub async fn seed_runtime(&self, record: RuntimeRecord) {
        self.runtimes.write().await.insert(record.id.clone(), record);
    }
}

#[async_trait]
impl MetadataStore for FakeMetadataStore {
    fn capabilities(&self) -> &[StoreCapability] {
        &[]
    }

    async fn get_function_by_name(&self, scope: &Scope, name: &str) -> CoreResult<Option<FunctionRecord>> {
        let hit = self
            .functions
            .read()
            .await
            .values()
            .find(|f| f.tenant_id == scope.tenant_id && f.namespace == scope.namespace && f.name == name)
            .cloned();
        Ok(hit)
    }

    async fn get_function_by_id(&self, scope: &Scope, id: &str) -> CoreResult<Option<FunctionRecord>> {
        let hit = self.functions.read().await.get(id).cloned().filter(|f| {
            f.tenant_id == scope.tenant_id && f.namespace == scope.namespace
        });
        Ok(hit)
    }

    async fn put_function(&self, record: FunctionRecord) -> CoreResult<()> {
        self.functions.write().await.insert(record.id.clone(), record);
        Ok(())
    }

    async fn delete_function(&self, _scope: &Scope, id: &str) -> CoreResult<()> {
        self.functions.write().await.remove(id);
        Ok(())
    }

    async fn get_code(&self, function_id: &str) -> CoreResult<Option<CodeRef>> {
        Ok(self.code.read().await.get(function_id).cloned())
    }

    async fn list_files(&self, function_id: &str) -> CoreResult<Vec<FileEntry>> {
        Ok(self.files.read().await.get(function_id).cloned().unwrap_or_default())
    }

    async fn list_layers(&self, function_id: &str) -> CoreResult<Vec<LayerRef>> {
        Ok(self.layers.read().await.get(function_id).cloned().unwrap_or_default())
    }

    async fn get_runtime(&self, id: &str) -> CoreResult<Option<RuntimeRecord>> {
        Ok(self.runtimes.read().await.get(id).cloned())
    }
}
