use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

use super::CacheBackend;
use crate::error::AppResult;

struct Entry {
    value: String,
    /// `None` for counters, which never expire
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |expires_at| expires_at > now)
    }
}

/// Process-local cache backend
///
/// Used when no Redis URL is configured and by the test suite. Expired entries
/// are invisible to reads and dropped on the next write.
#[derive(Clone, Default)]
pub struct MemoryCacheBackend {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl MemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries, counters excluded
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|entry| entry.expires_at.is_some() && entry.is_live(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait::async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| entry.is_live(Instant::now()))
            .map(|entry| entry.value.clone()))
    }

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> AppResult<()> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.is_live(now));
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Some(now + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> AppResult<usize> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        Ok(before - entries.len())
    }

    async fn incr(&self, key: &str) -> AppResult<u64> {
        let mut entries = self.entries.write().await;
        let current = entries
            .get(key)
            .filter(|entry| entry.is_live(Instant::now()))
            .and_then(|entry| entry.value.parse::<u64>().ok())
            .unwrap_or(0);
        let next = current + 1;
        entries.insert(
            key.to_string(),
            Entry {
                value: next.to_string(),
                expires_at: None,
            },
        );
        Ok(next)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_then_get() {
        let backend = MemoryCacheBackend::new();
        backend
            .set_ex("a", "1".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(backend.get("a").await.unwrap(), Some("1".to_string()));
        assert_eq!(backend.get("b").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let backend = MemoryCacheBackend::new();
        backend
            .set_ex("a", "1".to_string(), Duration::from_secs(5))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(backend.get("a").await.unwrap(), None);
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_prefix_only_touches_matching_keys() {
        let backend = MemoryCacheBackend::new();
        for key in ["rec:1:hybrid", "rec:1:genre", "rec:10:hybrid", "rec:2:hybrid"] {
            backend
                .set_ex(key, "x".to_string(), Duration::from_secs(60))
                .await
                .unwrap();
        }

        assert_eq!(backend.delete_prefix("rec:1:").await.unwrap(), 2);
        assert_eq!(backend.len().await, 2);
        assert!(backend.get("rec:10:hybrid").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_counters_increment_and_never_expire() {
        let backend = MemoryCacheBackend::new();
        assert_eq!(backend.incr("gen:user:1").await.unwrap(), 1);
        assert_eq!(backend.incr("gen:user:1").await.unwrap(), 2);
        assert_eq!(backend.incr("gen:user:2").await.unwrap(), 1);

        backend
            .set_ex("rec:1:g2", "x".to_string(), Duration::from_secs(5))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(3600)).await;

        assert_eq!(backend.get("gen:user:1").await.unwrap(), Some("2".to_string()));
        assert!(backend.is_empty().await);
    }
}
