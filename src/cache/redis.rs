use std::time::Duration;

use redis::AsyncCommands;
use redis::Client;

use super::CacheBackend;
use crate::error::AppResult;

/// Keys requested per SCAN round trip
const SCAN_BATCH: usize = 100;

/// Creates a Redis client for caching
///
/// Connections are multiplexed, so one client serves every request.
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

#[derive(Clone)]
pub struct RedisCacheBackend {
    client: Client,
}

impl RedisCacheBackend {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl CacheBackend for RedisCacheBackend {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> AppResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        // Redis rejects a zero expiry
        let _: () = conn.set_ex(key, value, ttl.as_secs().max(1)).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = conn.del(key).await?;
        Ok(())
    }

    /// Walks the keyspace with SCAN so large caches never block the server
    async fn delete_prefix(&self, prefix: &str) -> AppResult<usize> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let pattern = format!("{}*", prefix);
        let mut cursor: u64 = 0;
        let mut deleted = 0;

        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let _: () = conn.del(&keys).await?;
                deleted += keys.len();
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        tracing::debug!(pattern = %pattern, deleted, "Cache prefix delete");
        Ok(deleted)
    }

    async fn incr(&self, key: &str) -> AppResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let value: u64 = conn.incr(key, 1_u64).await?;
        Ok(value)
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

// These tests need a running Redis; they are skipped unless REDIS_URL is set.
#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> Option<RedisCacheBackend> {
        let url = std::env::var("REDIS_URL").ok()?;
        Some(RedisCacheBackend::new(create_redis_client(&url).ok()?))
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        assert!(create_redis_client("not a url").is_err());
    }

    #[tokio::test]
    async fn test_round_trip_and_prefix_delete() {
        let Some(backend) = backend() else {
            return;
        };

        let ttl = Duration::from_secs(60);
        backend.set_ex("rec:test-9001:a", "1".into(), ttl).await.unwrap();
        backend.set_ex("rec:test-9001:b", "2".into(), ttl).await.unwrap();
        backend.set_ex("rec:test-90010:a", "3".into(), ttl).await.unwrap();

        assert_eq!(
            backend.get("rec:test-9001:a").await.unwrap(),
            Some("1".to_string())
        );
        assert_eq!(backend.delete_prefix("rec:test-9001:").await.unwrap(), 2);
        assert_eq!(backend.get("rec:test-9001:b").await.unwrap(), None);
        assert!(backend.get("rec:test-90010:a").await.unwrap().is_some());

        backend.delete("rec:test-90010:a").await.unwrap();
    }

    #[tokio::test]
    async fn test_incr_counts_up() {
        let Some(backend) = backend() else {
            return;
        };

        backend.delete("gen:user:test-9001").await.unwrap();
        assert_eq!(backend.incr("gen:user:test-9001").await.unwrap(), 1);
        assert_eq!(backend.incr("gen:user:test-9001").await.unwrap(), 2);
        assert_eq!(
            backend.get("gen:user:test-9001").await.unwrap(),
            Some("2".to_string())
        );

        backend.delete("gen:user:test-9001").await.unwrap();
    }
}
