//! Cache Store: named generations of request → response entries.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use hashbrown::HashMap;
use http::{HeaderMap, StatusCode};
use offline_common::{OptionExt, Result};
use offline_net::{Response, ResponseType, Url};
use tokio::sync::RwLock;

/// A cached request/response pair.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Request URL (the entry's identity).
    pub url: Url,

    /// Response status.
    pub status: StatusCode,

    /// Response headers.
    pub headers: HeaderMap,

    pub response_type: ResponseType,

    /// Response body, shared with any response built from this entry.
    pub body: Bytes,
}

impl CacheEntry {
    /// Take ownership of a response copy for storage under `url`.
    pub fn from_response(url: Url, response: Response) -> Self {
        let status = response.status;
        let headers = response.headers.clone();
        let response_type = response.response_type;
        Self {
            url,
            status,
            headers,
            response_type,
            body: response.bytes(),
        }
    }

    /// Build a response handle over the stored body.
    pub fn to_response(&self) -> Response {
        let mut response = Response::new(self.url.clone(), self.status)
            .with_type(self.response_type)
            .with_body(self.body.clone());
        response.headers = self.headers.clone();
        response
    }
}


/// One cache generation.
#[derive(Debug, Default)]
pub struct Cache {
    /// Cache name (version label).
    pub name: String,

    entries: HashMap<String, CacheEntry>,
}

impl Cache {
    /// Create a new cache.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    /// Match a request identity.
    pub fn match_request(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Upsert an entry; last write wins.
    pub fn put(&mut self, key: &str, entry: CacheEntry) {
        self.entries.insert(key.to_string(), entry);
    }

    /// Get all keys.
    pub fn keys(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Durable store of cache generations provided by the host.
///
/// Every operation is a suspension point. Implementations must tolerate
/// concurrent reads and concurrent writes to different keys.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Create the generation if it does not exist yet.
    async fn open(&self, name: &str) -> Result<()>;

    /// Whether a generation exists.
    async fn has(&self, name: &str) -> Result<bool>;

    /// Delete a generation and all its entries. Unknown names return `Ok(false)`.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Names of all generations, in creation order.
    async fn keys(&self) -> Result<Vec<String>>;

    /// Upsert an entry into a generation, creating the generation if needed.
    async fn put(&self, name: &str, key: &str, entry: CacheEntry) -> Result<()>;

    /// Look up an identity in one generation.
    async fn match_in(&self, name: &str, key: &str) -> Result<Option<CacheEntry>>;

    /// Look up an identity across all generations, oldest first.
    async fn match_request(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Identities stored in one generation; unknown names are `NotFound`.
    async fn cache_keys(&self, name: &str) -> Result<Vec<String>>;
}

#[derive(Debug, Default)]
struct Generations {
    caches: HashMap<String, Cache>,
    /// Creation order of `caches`.
    order: Vec<String>,
}

impl Generations {
    fn open(&mut self, name: &str) -> &mut Cache {
        if !self.caches.contains_key(name) {
            self.order.push(name.to_string());
        }
        self.caches
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name))
    }

    fn delete(&mut self, name: &str) -> bool {
        self.order.retain(|n| n != name);
        self.caches.remove(name).is_some()
    }
}

/// In-process cache storage.
#[derive(Debug, Default, Clone)]
pub struct MemoryCacheStorage {
    inner: Arc<RwLock<Generations>>,
}

impl MemoryCacheStorage {
    /// Create new cache storage.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<()> {
        self.inner.write().await.open(name);
        Ok(())
    }

    async fn has(&self, name: &str) -> Result<bool> {
        Ok(self.inner.read().await.caches.contains_key(name))
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        Ok(self.inner.write().await.delete(name))
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.inner.read().await.order.clone())
    }

    async fn put(&self, name: &str, key: &str, entry: CacheEntry) -> Result<()> {
        self.inner.write().await.open(name).put(key, entry);
        Ok(())
    }

    async fn match_in(&self, name: &str, key: &str) -> Result<Option<CacheEntry>> {
        let generations = self.inner.read().await;
        Ok(generations
            .caches
            .get(name)
            .and_then(|c| c.match_request(key))
            .cloned())
    }

    async fn match_request(&self, key: &str) -> Result<Option<CacheEntry>> {
        let generations = self.inner.read().await;
        for name in &generations.order {
            if let Some(entry) = generations
                .caches
                .get(name)
                .and_then(|c| c.match_request(key))
            {
                return Ok(Some(entry.clone()));
            }
        }
        Ok(None)
    }

    async fn cache_keys(&self, name: &str) -> Result<Vec<String>> {
        let generations = self.inner.read().await;
        let cache = generations
            .caches
            .get(name)
            .ok_or_not_found(format!("cache generation {name}"))?;
        Ok(cache.keys().into_iter().map(str::to_string).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(url: &str, body: &'static str) -> CacheEntry {
        let url = Url::parse(url).unwrap();
        let response = Response::new(url.clone(), StatusCode::OK).with_body(body);
        CacheEntry::from_response(url, response)
    }

    #[test]
    fn test_cache_put_and_match() {
        let mut cache = Cache::new("v1");
        cache.put("https://example.com/style.css", entry("https://example.com/style.css", "a{}"));

        assert!(cache.match_request("https://example.com/style.css").is_some());
        assert!(cache.match_request("https://example.com/other.css").is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_last_write_wins() {
        let mut cache = Cache::new("v1");
        cache.put("k", entry("https://example.com/k", "old"));
        cache.put("k", entry("https://example.com/k", "new"));

        assert_eq!(cache.len(), 1);
        assert_eq!(&cache.match_request("k").unwrap().body[..], b"new");
    }

    #[test]
    fn test_entry_round_trips_response_fields() {
        let stored = entry("https://example.com/manifest.json", "{}");
        let response = stored.to_response();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.response_type, ResponseType::Basic);
        assert_eq!(response.bytes().as_ptr(), stored.body.as_ptr());
    }

    #[tokio::test]
    async fn test_storage_open_has_delete() {
        let storage = MemoryCacheStorage::new();

        assert!(!storage.has("v1").await.unwrap());
        storage.open("v1").await.unwrap();
        assert!(storage.has("v1").await.unwrap());

        assert!(storage.delete("v1").await.unwrap());
        assert!(!storage.has("v1").await.unwrap());
        assert!(!storage.delete("v1").await.unwrap());
    }

    #[tokio::test]
    async fn test_storage_keys_in_creation_order() {
        let storage = MemoryCacheStorage::new();
        storage.open("b").await.unwrap();
        storage.open("a").await.unwrap();
        storage.open("b").await.unwrap();

        assert_eq!(storage.keys().await.unwrap(), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_put_creates_generation() {
        let storage = MemoryCacheStorage::new();
        storage
            .put("v1", "https://example.com/", entry("https://example.com/", "shell"))
            .await
            .unwrap();

        assert!(storage.has("v1").await.unwrap());
        assert_eq!(
            storage.cache_keys("v1").await.unwrap(),
            vec!["https://example.com/"]
        );
    }

    #[tokio::test]
    async fn test_match_request_searches_oldest_first() {
        let storage = MemoryCacheStorage::new();
        storage
            .put("old", "k", entry("https://example.com/k", "old"))
            .await
            .unwrap();
        storage
            .put("new", "k", entry("https://example.com/k", "new"))
            .await
            .unwrap();

        let hit = storage.match_request("k").await.unwrap().unwrap();
        assert_eq!(&hit.body[..], b"old");

        let scoped = storage.match_in("new", "k").await.unwrap().unwrap();
        assert_eq!(&scoped.body[..], b"new");
        assert!(storage.match_request("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let storage = MemoryCacheStorage::new();
        let handle = storage.clone();
        handle.open("v1").await.unwrap();
        assert!(storage.has("v1").await.unwrap());
    }

    #[tokio::test]
    async fn test_cache_keys_of_unknown_generation() {
        let storage = MemoryCacheStorage::new();
        assert!(matches!(
            storage.cache_keys("v9").await,
            Err(offline_common::OfflineError::NotFound(_))
        ));
    }
}
