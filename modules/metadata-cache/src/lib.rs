pub mod cache;
pub mod fake;
pub mod models;
pub mod store;

pub use cache::{MetadataCache, DEFAULT_TTL};
pub use fake::FakeMetadataStore;
pub use models::{CodeRef, FileEntry, FunctionRecord, LayerRef, RuntimeRecord, StoreCapability};
pub use store::{has_capability, MetadataStore};

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use scope::Scope;
    use serde_json::json;

    use super::*;

    fn sample(id: &str, name: &str) -> FunctionRecord {
        FunctionRecord {
            id: id.to_string(),
            tenant_id: "t1".into(),
            namespace: "default".into(),
            name: name.to_string(),
            runtime_id: "node20".into(),
            memory_mb: 128,
            timeout_s: 30,
            env: json!({}),
            updated_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn miss_then_hit() {
        let store = Arc::new(FakeMetadataStore::new());
        store.seed_function(sample("f1", "hello")).await;
        let cache = MetadataCache::new(store.clone());
        let scope = Scope::new("t1", "default");

        let first = cache.get_function_by_name(&scope, "hello").await.unwrap();
        assert!(first.is_some());
        let second = cache.get_function_by_id(&scope, "f1").await.unwrap();
        assert_eq!(second.unwrap().id, "f1");
    }

    #[tokio::test]
    async fn write_invalidates_cached_entries() {
        let store = Arc::new(FakeMetadataStore::new());
        store.seed_function(sample("f1", "hello")).await;
        let cache = MetadataCache::new(store.clone());
        let scope = Scope::new("t1", "default");

        cache.get_function_by_name(&scope, "hello").await.unwrap();

        let mut updated = sample("f1", "hello");
        updated.memory_mb = 256;
        cache.put_function(updated).await.unwrap();

        let refreshed = cache.get_function_by_name(&scope, "hello").await.unwrap().unwrap();
        assert_eq!(refreshed.memory_mb, 256);
    }

    #[tokio::test]
    async fn entry_expires_after_ttl() {
        let store = Arc::new(FakeMetadataStore::new());
        store.seed_function(sample("f1", "hello")).await;
        let cache = MetadataCache::with_ttl(store.clone(), Duration::from_millis(10));
        let scope = Scope::new("t1", "default");

        cache.get_function_by_name(&scope, "hello").await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        store.seed_function(sample("f1", "renamed")).await;
        let refreshed = cache.get_function_by_id(&scope, "f1").await.unwrap().unwrap();
        assert_eq!(refreshed.name, "renamed");
    }
}
