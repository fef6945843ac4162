use chrono::{DateTime, Utc};

use crate::{
    error::AppResult,
    models::{
        Favorite, Genre, Movie, MovieActivity, MovieId, MovieOrder, NewRating, NewWatch, Rating,
        SimilarUser, UserId, WatchHistory,
    },
};

/// Filter, order and paging for catalog reads
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MovieQuery {
    /// Case-insensitive substring of the title
    pub search: Option<String>,
    /// Exact genre name
    pub genre: Option<String>,
    pub min_external_rating: Option<f64>,
    pub created_after: Option<DateTime<Utc>>,
    pub exclude: Vec<MovieId>,
    pub order: MovieOrder,
    pub limit: usize,
    pub offset: usize,
}

/// Row counts reported by the health endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct CatalogCounts {
    pub users: i64,
    pub movies: i64,
    pub ratings: i64,
}

/// Typed access to the relational catalog
///
/// Every movie returned by the store has its genres and tags loaded, so callers
/// never issue follow-up lookups while scoring.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CatalogStore: Send + Sync {
    async fn ping(&self) -> AppResult<()>;

    async fn counts(&self) -> AppResult<CatalogCounts>;

    async fn user_exists(&self, user_id: UserId) -> AppResult<bool>;

    async fn find_movies(&self, query: &MovieQuery) -> AppResult<Vec<Movie>>;

    /// Order of the result is unspecified; missing ids are skipped
    async fn find_movies_by_ids(&self, ids: &[MovieId]) -> AppResult<Vec<Movie>>;

    async fn get_movie(&self, movie_id: MovieId) -> AppResult<Option<Movie>>;

    async fn list_genres(&self) -> AppResult<Vec<Genre>>;

    async fn find_ratings_by_user(&self, user_id: UserId) -> AppResult<Vec<Rating>>;

    async fn find_favorites_by_user(&self, user_id: UserId) -> AppResult<Vec<Favorite>>;

    async fn find_watch_history_by_user(&self, user_id: UserId) -> AppResult<Vec<WatchHistory>>;

    async fn find_ratings_by_movie(&self, movie_id: MovieId) -> AppResult<Vec<Rating>>;

    async fn find_ratings_by_users(&self, user_ids: &[UserId]) -> AppResult<Vec<Rating>>;

    /// The `k` users closest to `user_id` by cosine similarity of rating vectors,
    /// most similar first, considering only users sharing at least `min_overlap`
    /// rated movies
    async fn find_similar_users(
        &self,
        user_id: UserId,
        k: usize,
        min_overlap: usize,
    ) -> AppResult<Vec<SimilarUser>>;

    async fn upsert_rating(&self, rating: &NewRating) -> AppResult<Rating>;

    /// Returns whether a rating existed
    async fn delete_rating(&self, user_id: UserId, movie_id: MovieId) -> AppResult<bool>;

    /// Returns the favorite if the movie is now favorited, `None` if it was removed
    async fn toggle_favorite(&self, user_id: UserId, movie_id: MovieId)
        -> AppResult<Option<Favorite>>;

    async fn upsert_watch(&self, watch: &NewWatch) -> AppResult<WatchHistory>;

    async fn delete_watch(&self, user_id: UserId, movie_id: MovieId) -> AppResult<bool>;

    async fn movie_activity(&self) -> AppResult<Vec<MovieActivity>>;

    async fn update_popularity(&self, scores: &[(MovieId, f64)]) -> AppResult<()>;
}
