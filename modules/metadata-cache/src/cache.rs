use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use queue_errors::CoreResult;
use scope::Scope;
use tokio::sync::RwLock;

use crate::models::{CodeRef, FileEntry, FunctionRecord, LayerRef, RuntimeRecord};
use crate::store::MetadataStore;

pub const DEFAULT_TTL: Duration = Duration::from_secs(5);

struct Entry<T> {
    value: T,
    expires_at: DateTime<Utc>,
}

impl<T: Clone> Entry<T> {
    fn fresh(&self) -> Option<T> {
        if self.expires_at > Utc::now() {
            Some(self.value.clone())
        } else {
            None
        }
    }
}

fn name_key(scope: &Scope, name: &str) -> String {
    format!("{}/{}/{}", scope.tenant_id, scope.namespace, name)
}

fn id_key(scope: &Scope, id: &str) -> String {
    format!("{}/{}/{}", scope.tenant_id, scope.namespace, id)
}

/// Read-through cache over a [`MetadataStore`]. Misses fall through to
/// the underlying store; writes that mutate a function invalidate all
/// of its cached entries via the id→name-key map (spec.md §4.7).
pub struct MetadataCache<S: MetadataStore> {
    store: Arc<S>,
    ttl: Duration,
    by_name: RwLock<HashMap<String, Entry<FunctionRecord>>>,
    by_id: RwLock<HashMap<String, Entry<FunctionRecord>>>,
    id_to_name_key: RwLock<HashMap<String, String>>,
    code: RwLock<HashMap<String, Entry<Option<CodeRef>>>>,
    files: RwLock<HashMap<String, Entry<Vec<FileEntry>>>>,
    layers: RwLock<HashMap<String, Entry<Vec<LayerRef>>>>,
    runtimes: RwLock<HashMap<String, Entry<RuntimeRecord>>>,
}

impl<S: MetadataStore> MetadataCache<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_ttl(store, DEFAULT_TTL)
    }

    pub fn with_ttl(store: Arc<S>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            by_name: RwLock::new(HashMap::new()),
            by_id: RwLock::new(HashMap::new()),
            id_to_name_key: RwLock::new(HashMap::new()),
            code: RwLock::new(HashMap::new()),
            files: RwLock::new(HashMap::new()),
            layers: RwLock::new(HashMap::new()),
            runtimes: RwLock::new(HashMap::new()),
        }
    }

    fn expiry(&self) -> DateTime<Utc> {
        Utc::now() + chrono::Duration::from_std(self.ttl).unwrap_or_default()
    }

    pub async fn get_function_by_name(
        &self,
        scope: &Scope,
        name: &str,
    ) -> CoreResult<Option<FunctionRecord>> {
        let key = name_key(scope, name);
        if let Some(hit) = self.by_name.read().await.get(&key).and_then(Entry::fresh) {
            return Ok(Some(hit));
        }

        let record = self.store.get_function_by_name(scope, name).await?;
        if let Some(record) = &record {
            self.remember(scope, record.clone()).await;
        }
        Ok(record)
    }

    pub async fn get_function_by_id(
        &self,
        scope: &Scope,
        id: &str,
    ) -> CoreResult<Option<FunctionRecord>> {
        let key = id_key(scope, id);
        if let Some(hit) = self.by_id.read().await.get(&key).and_then(Entry::fresh) {
            return Ok(Some(hit));
        }

        let record = self.store.get_function_by_id(scope, id).await?;
        if let Some(record) = &record {
            self.remember(scope, record.clone()).await;
        }
        Ok(record)
    }

    async fn remember(&self, scope: &Scope, record: FunctionRecord) {
        let expires_at = self.expiry();
        let nk = name_key(scope, &record.name);
        let ik = id_key(scope, &record.id);

        self.by_name.write().await.insert(
            nk.clone(),
            Entry { value: record.clone(), expires_at },
        );
        self.by_id.write().await.insert(ik.clone(), Entry { value: record.clone(), expires_at });
        self.id_to_name_key.write().await.insert(ik, nk);
    }

    pub async fn get_code(&self, function_id: &str) -> CoreResult<Option<CodeRef>> {
        if let Some(hit) = self.code.read().await.get(function_id).and_then(Entry::fresh) {
            return Ok(hit);
        }
        let value = self.store.get_code(function_id).await?;
        self.code.write().await.insert(
            function_id.to_string(),
            Entry { value: value.clone(), expires_at: self.expiry() },
        );
        Ok(value)
    }

    pub async fn list_files(&self, function_id: &str) -> CoreResult<Vec<FileEntry>> {
        if let Some(hit) = self.files.read().await.get(function_id).and_then(Entry::fresh) {
            return Ok(hit);
        }
        let value = self.store.list_files(function_id).await?;
        self.files.write().await.insert(
            function_id.to_string(),
            Entry { value: value.clone(), expires_at: self.expiry() },
        );
        Ok(value)
    }

    pub async fn list_layers(&self, function_id: &str) -> CoreResult<Vec<LayerRef>> {
        if let Some(hit) = self.layers.read().await.get(function_id).and_then(Entry::fresh) {
            return Ok(hit);
        }
        let value = self.store.list_layers(function_id).await?;
        self.layers.write().await.insert(
            function_id.to_string(),
            Entry { value: value.clone(), expires_at: self.expiry() },
        );
        Ok(value)
    }

    pub async fn get_runtime(&self, id: &str) -> CoreResult<Option<RuntimeRecord>> {
        if let Some(hit) = self.runtimes.read().await.get(id).and_then(Entry::fresh) {
            return Ok(Some(hit));
        }
        let value = self.store.get_runtime(id).await?;
        if let Some(record) = &value {
            self.runtimes.write().await.insert(
                id.to_string(),
                Entry { value: record.clone(), expires_at: self.expiry() },
            );
        }
        Ok(value)
    }

    /// Writes through to the store, then invalidates every cached
    /// entry for the function (name key, id key, code, files, layers).
    pub async fn put_function(&self, record: FunctionRecord) -> CoreResult<()> {
        self.store.put_function(record.clone()).await?;
        self.invalidate_function_id(&record.id).await;
        Ok(())
    }

    pub async fn delete_function(&self, scope: &Scope, id: &str) -> CoreResult<()> {
        self.store.delete_function(scope, id).await?;
        self.invalidate_function_id(id).await;
        Ok(())
    }

    /// Invalidates all cached entries for a function when only its id
    /// is known, via the secondary id→name-key map (spec.md §4.7).
    pub async fn invalidate_function_id(&self, id: &str) {
        let name_key = self.id_to_name_key.write().await.remove(id);
        if let Some(name_key) = name_key {
            self.by_name.write().await.remove(&name_key);
        }
        // id_key entries are prefixed per-scope; remove every entry whose
        // suffix matches this raw id since the scope isn't known here.
        self.by_id.write().await.retain(|k, _| !k.ends_with(&format!("/{id}")));
        self.code.write().await.remove(id);
        self.files.write().await.remove(id);
        self.layers.write().await.remove(id);
    }
}
