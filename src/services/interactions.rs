use std::sync::Arc;

use crate::{
    cache::ResultCache,
    db::CatalogStore,
    error::{AppError, AppResult},
    models::{
        Favorite, MovieId, NewRating, NewWatch, Rating, RatingScore, UserId, WatchHistory,
    },
};

/// Write side of user activity
///
/// Every rating or favorite change drops the user's cached recommendations
/// before returning. Watch-history writes leave the cache alone.
#[derive(Clone)]
pub struct InteractionService {
    store: Arc<dyn CatalogStore>,
    cache: ResultCache,
}

impl InteractionService {
    pub fn new(store: Arc<dyn CatalogStore>, cache: ResultCache) -> Self {
        Self { store, cache }
    }

    async fn ensure_user(&self, user_id: UserId) -> AppResult<()> {
        if !self.store.user_exists(user_id).await? {
            return Err(AppError::NotFound(format!("User {} does not exist", user_id)));
        }
        Ok(())
    }

    async fn ensure_movie(&self, movie_id: MovieId) -> AppResult<()> {
        if self.store.get_movie(movie_id).await?.is_none() {
            return Err(AppError::NotFound(format!("Movie {} does not exist", movie_id)));
        }
        Ok(())
    }

    /// Cache failures here are logged; the write itself already succeeded
    async fn preferences_changed(&self, user_id: UserId, movie_id: MovieId) {
        if let Err(e) = self.cache.invalidate(user_id).await {
            tracing::warn!(user_id, error = %e, "Failed to invalidate cached recommendations");
        }
        if let Err(e) = self.cache.invalidate_movie_stats(movie_id).await {
            tracing::warn!(movie_id, error = %e, "Failed to drop cached movie stats");
        }
    }

    pub async fn rate(
        &self,
        user_id: UserId,
        movie_id: MovieId,
        score: f64,
        review: Option<String>,
    ) -> AppResult<Rating> {
        let score = RatingScore::new(score)?;
        self.ensure_user(user_id).await?;
        self.ensure_movie(movie_id).await?;

        let rating = self
            .store
            .upsert_rating(&NewRating {
                user_id,
                movie_id,
                score,
                review: review.filter(|r| !r.trim().is_empty()),
            })
            .await?;
        self.preferences_changed(user_id, movie_id).await;

        tracing::info!(user_id, movie_id, score = rating.score, "Rating saved");
        Ok(rating)
    }

    pub async fn delete_rating(&self, user_id: UserId, movie_id: MovieId) -> AppResult<()> {
        if !self.store.delete_rating(user_id, movie_id).await? {
            return Err(AppError::NotFound(format!(
                "No rating for movie {} by user {}",
                movie_id, user_id
            )));
        }
        self.preferences_changed(user_id, movie_id).await;

        tracing::info!(user_id, movie_id, "Rating deleted");
        Ok(())
    }

    /// Returns whether the movie is a favorite after the toggle
    pub async fn toggle_favorite(&self, user_id: UserId, movie_id: MovieId) -> AppResult<bool> {
        self.ensure_user(user_id).await?;
        self.ensure_movie(movie_id).await?;

        let favorited = self
            .store
            .toggle_favorite(user_id, movie_id)
            .await?
            .is_some();
        self.preferences_changed(user_id, movie_id).await;

        tracing::info!(user_id, movie_id, favorited, "Favorite toggled");
        Ok(favorited)
    }

    pub async fn record_watch(
        &self,
        user_id: UserId,
        movie_id: MovieId,
        progress_minutes: Option<i32>,
        completed: bool,
    ) -> AppResult<WatchHistory> {
        let watch = NewWatch::new(user_id, movie_id, progress_minutes, completed)?;
        self.ensure_user(user_id).await?;
        self.ensure_movie(movie_id).await?;

        let stored = self.store.upsert_watch(&watch).await?;
        tracing::info!(user_id, movie_id, completed, "Watch recorded");
        Ok(stored)
    }

    pub async fn delete_watch(&self, user_id: UserId, movie_id: MovieId) -> AppResult<()> {
        if !self.store.delete_watch(user_id, movie_id).await? {
            return Err(AppError::NotFound(format!(
                "No watch history for movie {} by user {}",
                movie_id, user_id
            )));
        }
        Ok(())
    }

    pub async fn ratings(&self, user_id: UserId) -> AppResult<Vec<Rating>> {
        self.store.find_ratings_by_user(user_id).await
    }

    pub async fn favorites(&self, user_id: UserId) -> AppResult<Vec<Favorite>> {
        self.store.find_favorites_by_user(user_id).await
    }

    pub async fn watchlist(&self, user_id: UserId) -> AppResult<Vec<WatchHistory>> {
        self.store.find_watch_history_by_user(user_id).await
    }
}
