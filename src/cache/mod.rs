pub mod memory;
pub mod redis;
pub mod result_cache;

mod macros;

use std::fmt::Display;
use std::time::Duration;

use crate::{
    error::AppResult,
    models::{Algorithm, MovieId, UserId},
};

pub use self::memory::MemoryCacheBackend;
pub use self::redis::{create_redis_client, RedisCacheBackend};
pub use self::result_cache::{CacheWriterHandle, ResultCache};

/// Key/value store with expiry behind the result cache
#[async_trait::async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> AppResult<()>;

    async fn delete(&self, key: &str) -> AppResult<()>;

    /// Removes every key starting with `prefix`, returning how many were removed
    async fn delete_prefix(&self, prefix: &str) -> AppResult<usize>;

    /// Atomically increments a counter that never expires, returning the new value
    async fn incr(&self, key: &str) -> AppResult<u64>;

    fn name(&self) -> &'static str;
}

/// Cache keys
///
/// User-scoped and movie-scoped entries embed the generation of their scope.
/// Invalidating a scope bumps its generation, so an entry computed before the
/// invalidation is written under a key no reader asks for anymore.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Recommendations {
        user_id: UserId,
        generation: u64,
        algorithm: Algorithm,
        params: String,
    },
    SimilarMovies {
        movie_id: MovieId,
        limit: usize,
    },
    MovieStats {
        movie_id: MovieId,
        generation: u64,
    },
    UserGeneration(UserId),
    MovieGeneration(MovieId),
}

impl CacheKey {
    /// Prefix shared by every recommendation entry of one user
    pub fn user_prefix(user_id: UserId) -> String {
        format!("rec:{}:", user_id)
    }

    /// Prefix shared by every stats entry of one movie
    pub fn movie_stats_prefix(movie_id: MovieId) -> String {
        format!("stats:movie:{}:", movie_id)
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Recommendations {
                user_id,
                generation,
                algorithm,
                params,
            } => write!(
                f,
                "{}g{}:{}:{}",
                Self::user_prefix(*user_id),
                generation,
                algorithm,
                params
            ),
            CacheKey::SimilarMovies { movie_id, limit } => {
                write!(f, "similar:{}:{}", movie_id, limit)
            }
            CacheKey::MovieStats {
                movie_id,
                generation,
            } => write!(f, "{}g{}", Self::movie_stats_prefix(*movie_id), generation),
            CacheKey::UserGeneration(user_id) => write!(f, "gen:user:{}", user_id),
            CacheKey::MovieGeneration(movie_id) => write!(f, "gen:movie:{}", movie_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_display_recommendations() {
        let key = CacheKey::Recommendations {
            user_id: 42,
            generation: 3,
            algorithm: Algorithm::Hybrid,
            params: "limit=10".to_string(),
        };
        assert_eq!(format!("{}", key), "rec:42:g3:hybrid:limit=10");
        assert!(key.to_string().starts_with(&CacheKey::user_prefix(42)));
    }

    #[test]
    fn test_user_prefix_does_not_match_other_users() {
        let key = CacheKey::Recommendations {
            user_id: 420,
            generation: 0,
            algorithm: Algorithm::Genre,
            params: String::new(),
        };
        assert!(!key.to_string().starts_with(&CacheKey::user_prefix(42)));
    }

    #[test]
    fn test_cache_key_display_similar_movies() {
        let key = CacheKey::SimilarMovies {
            movie_id: 7,
            limit: 10,
        };
        assert_eq!(format!("{}", key), "similar:7:10");
    }

    #[test]
    fn test_cache_key_display_movie_stats() {
        let key = CacheKey::MovieStats {
            movie_id: 3,
            generation: 2,
        };
        assert_eq!(key.to_string(), "stats:movie:3:g2");
        assert!(key
            .to_string()
            .starts_with(&CacheKey::movie_stats_prefix(3)));
        assert!(!CacheKey::MovieStats {
            movie_id: 30,
            generation: 0
        }
        .to_string()
        .starts_with(&CacheKey::movie_stats_prefix(3)));
    }

    #[test]
    fn test_generation_keys_are_outside_entry_prefixes() {
        let user = CacheKey::UserGeneration(1).to_string();
        let movie = CacheKey::MovieGeneration(1).to_string();
        assert_eq!(user, "gen:user:1");
        assert_eq!(movie, "gen:movie:1");
        assert!(!user.starts_with(&CacheKey::user_prefix(1)));
        assert!(!movie.starts_with(&CacheKey::movie_stats_prefix(1)));
    }
}
