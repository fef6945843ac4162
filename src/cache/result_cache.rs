use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{CacheBackend, CacheKey};
use crate::{
    error::{AppError, AppResult},
    models::{Algorithm, MovieId, RecommendationParams, RecommendationResult, UserId},
};

/// Message for asynchronous cache writes
struct CacheWriteMessage {
    key: String,
    value: String,
    ttl: Duration,
}

/// Serialized cache in front of a [`CacheBackend`]
///
/// Recommendation entries are read and written inline so that invalidation
/// observes them. Other entries go through a background writer so they never
/// delay a response.
#[derive(Clone)]
pub struct ResultCache {
    backend: Arc<dyn CacheBackend>,
    write_tx: mpsc::UnboundedSender<CacheWriteMessage>,
}

/// Handle for gracefully shutting down the cache writer
pub struct CacheWriterHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl CacheWriterHandle {
    /// Signals the writer and waits until every queued write is flushed
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Cache writer task failed");
        }
        tracing::info!("Cache writer stopped");
    }
}

impl ResultCache {
    /// Creates the cache and spawns its background writer
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(backend: Arc<dyn CacheBackend>) -> (Self, CacheWriterHandle) {
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let task = tokio::spawn(Self::cache_writer_task(
            backend.clone(),
            write_rx,
            shutdown_rx,
        ));

        tracing::info!(backend = backend.name(), "Result cache ready");
        (Self { backend, write_tx }, CacheWriterHandle { shutdown_tx, task })
    }

    /// Background task that applies queued writes
    ///
    /// Runs until shutdown is requested, then drains whatever is still queued.
    /// It also stops once every cache clone and the handle are gone.
    async fn cache_writer_task(
        backend: Arc<dyn CacheBackend>,
        mut write_rx: mpsc::UnboundedReceiver<CacheWriteMessage>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::debug!("Cache writer task started");

        loop {
            tokio::select! {
                Some(msg) = write_rx.recv() => {
                    Self::apply(backend.as_ref(), msg).await;
                }
                Some(()) = shutdown_rx.recv() => {
                    let mut flushed = 0;
                    while let Ok(msg) = write_rx.try_recv() {
                        Self::apply(backend.as_ref(), msg).await;
                        flushed += 1;
                    }
                    tracing::info!(flushed, "Cache writer flushed pending writes");
                    break;
                }
                else => break,
            }
        }
    }

    async fn apply(backend: &dyn CacheBackend, msg: CacheWriteMessage) {
        if let Err(e) = backend.set_ex(&msg.key, msg.value, msg.ttl).await {
            tracing::error!(error = %e, key = %msg.key, "Failed to write cache entry");
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Retrieves and deserializes a value, `None` when absent
    pub async fn get_from_cache<T: serde::de::DeserializeOwned>(
        &self,
        key: &CacheKey,
    ) -> AppResult<Option<T>> {
        match self.backend.get(&key.to_string()).await? {
            Some(json) => {
                let data = serde_json::from_str(&json).map_err(|e| {
                    AppError::Internal(format!("Cache deserialization error: {}", e))
                })?;
                Ok(Some(data))
            }
            None => Ok(None),
        }
    }

    /// Serializes and stores a value, waiting for the backend
    pub async fn set<T: serde::Serialize>(
        &self,
        key: &CacheKey,
        value: &T,
        ttl: Duration,
    ) -> AppResult<()> {
        let json = serde_json::to_string(value)
            .map_err(|e| AppError::Internal(format!("Cache serialization error: {}", e)))?;
        self.backend.set_ex(&key.to_string(), json, ttl).await
    }

    /// Queues a write for the background writer and returns immediately
    pub fn set_in_background<T: serde::Serialize>(&self, key: &CacheKey, value: &T, ttl: Duration) {
        let json = match serde_json::to_string(value) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(error = %e, "Cache serialization error");
                return;
            }
        };

        let msg = CacheWriteMessage {
            key: key.to_string(),
            value: json,
            ttl,
        };

        if let Err(e) = self.write_tx.send(msg) {
            tracing::error!(error = %e, "Failed to send cache write message");
        }
    }

    /// Current generation of a scope, `0` before its first invalidation
    ///
    /// `None` when the generation cannot be read; callers then bypass the
    /// cache, since an entry keyed on a guessed generation could outlive an
    /// invalidation.
    pub async fn generation(&self, scope: &CacheKey) -> Option<u64> {
        match self.backend.get(&scope.to_string()).await {
            Ok(None) => Some(0),
            Ok(Some(raw)) => match raw.parse() {
                Ok(generation) => Some(generation),
                Err(e) => {
                    tracing::warn!(error = %e, key = %scope, "Unreadable cache generation");
                    None
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, key = %scope, "Cache generation read failed");
                None
            }
        }
    }

    /// Key of the cached result for this exact request
    ///
    /// The user's generation is read once here. A request computed while the
    /// user changes preferences is stored under the old generation, which no
    /// later request reads.
    pub async fn recommendation_key(
        &self,
        user_id: UserId,
        algorithm: Algorithm,
        params: &RecommendationParams,
    ) -> Option<CacheKey> {
        let generation = self.generation(&CacheKey::UserGeneration(user_id)).await?;
        Some(CacheKey::Recommendations {
            user_id,
            generation,
            algorithm,
            params: params.cache_fragment(),
        })
    }

    /// Cached recommendations under `key`
    ///
    /// Backend failures and expired or unreadable entries count as misses.
    pub async fn get(&self, key: &CacheKey) -> Option<RecommendationResult> {
        match self.get_from_cache::<RecommendationResult>(key).await {
            Ok(Some(result)) if result.expires_at > chrono::Utc::now() => Some(result),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, key = %key, "Cache read failed, treating as miss");
                None
            }
        }
    }

    /// Stores recommendations; failures are logged and otherwise ignored
    pub async fn put(&self, key: &CacheKey, result: &RecommendationResult, ttl: Duration) {
        if let Err(e) = self.set(key, result, ttl).await {
            tracing::warn!(error = %e, key = %key, "Cache write failed");
        }
    }

    /// Drops every recommendation entry of one user, across all algorithms and
    /// parameter sets
    ///
    /// The generation is bumped before deleting, so a result still being
    /// computed for the old generation can no longer be served.
    pub async fn invalidate(&self, user_id: UserId) -> AppResult<usize> {
        let generation = self
            .backend
            .incr(&CacheKey::UserGeneration(user_id).to_string())
            .await?;
        let removed = self
            .backend
            .delete_prefix(&CacheKey::user_prefix(user_id))
            .await?;
        tracing::debug!(user_id, generation, removed, "Invalidated cached recommendations");
        Ok(removed)
    }

    /// Key of the cached rating statistics of one movie
    pub async fn movie_stats_key(&self, movie_id: MovieId) -> Option<CacheKey> {
        let generation = self.generation(&CacheKey::MovieGeneration(movie_id)).await?;
        Some(CacheKey::MovieStats {
            movie_id,
            generation,
        })
    }

    /// Drops the cached rating statistics of one movie
    pub async fn invalidate_movie_stats(&self, movie_id: MovieId) -> AppResult<usize> {
        self.backend
            .incr(&CacheKey::MovieGeneration(movie_id).to_string())
            .await?;
        self.backend
            .delete_prefix(&CacheKey::movie_stats_prefix(movie_id))
            .await
    }
}
