//! Cached resolver: in-memory cache wrapper for any ModelSpecResolver.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use model_spec_core::ModelSpec;

use super::resolver::ModelSpecResolver;

/// Wraps any resolver with an in-memory cache keyed by "provider/model".
pub struct CachedResolver<R> {
    inner: R,
    cache: Arc<RwLock<HashMap<String, ModelSpec>>>,
}

impl<R> CachedResolver<R>
where
    R: ModelSpecResolver,
{
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Merges new specs into the cache. Existing keys are overwritten;
    /// keys absent from `specs` are kept.
    pub async fn refresh(&self, specs: HashMap<String, ModelSpec>) {
        let mut cache = self.cache.write().await;
        for (k, v) in specs {
            cache.insert(k, v);
        }
    }

    /// Clears the cache.
    pub async fn clear(&self) {
        self.cache.write().await.clear();
    }

    /// The wrapped resolver.
    pub fn inner(&self) -> &R {
        &self.inner
    }
}

#[async_trait]
impl<R> ModelSpecResolver for CachedResolver<R>
where
    R: ModelSpecResolver + Send + Sync,
{
    async fn resolve(&self, provider_id: &str, model_id: &str) -> Option<ModelSpec> {
        let key = format!("{}/{}", provider_id, model_id);
        {
            let cache = self.cache.read().await;
            if let Some(spec) = cache.get(&key).cloned() {
                return Some(spec);
            }
        }
        let spec = self.inner.resolve(provider_id, model_id).await?;
        self.cache.write().await.insert(key, spec.clone());
        Some(spec)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::model_spec::models_dev::{HttpClient, ModelsDevResolver};

    struct CountingMockClient {
        body: String,
        call_count: AtomicUsize,
    }

    #[async_trait]
    impl HttpClient for CountingMockClient {
        async fn get(&self, _url: &str) -> Result<String, String> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            Ok(self.body.clone())
        }
    }

    #[tokio::test]
    async fn cache_hits_avoid_inner_calls() {
        let body =
            r#"{"ollama":{"models":{"llama3":{"limit":{"context":8192,"output":4096}}}}}"#
                .to_string();
        let client = Arc::new(CountingMockClient {
            body,
            call_count: AtomicUsize::new(0),
        });
        let models_dev =
            ModelsDevResolver::with_client("https://x.com/api.json".to_string(), client.clone());
        let cached = CachedResolver::new(models_dev);

        let spec1 = cached.resolve("ollama", "llama3").await.unwrap();
        assert_eq!(spec1.context_limit, 8192);
        assert_eq!(client.call_count.load(Ordering::SeqCst), 1);

        let spec2 = cached.resolve("ollama", "llama3").await.unwrap();
        assert_eq!(spec2.context_limit, 8192);
        assert_eq!(client.call_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refresh_merges_without_dropping_existing_keys() {
        let client = Arc::new(CountingMockClient {
            body: "{}".to_string(),
            call_count: AtomicUsize::new(0),
        });
        let cached = CachedResolver::new(ModelsDevResolver::with_client(
            "https://x.com/api.json".to_string(),
            client,
        ));

        let mut first = HashMap::new();
        first.insert("a/m1".to_string(), ModelSpec::new(100, 10));
        cached.refresh(first).await;

        let mut second = HashMap::new();
        second.insert("a/m2".to_string(), ModelSpec::new(200, 20));
        cached.refresh(second).await;

        assert_eq!(cached.resolve("a", "m1").await.unwrap().context_limit, 100);
        assert_eq!(cached.resolve("a", "m2").await.unwrap().context_limit, 200);
    }
}
