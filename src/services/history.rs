use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use crate::{
    db::CatalogStore,
    error::{AppError, AppResult},
    models::{Favorite, Movie, MovieId, Rating, UserId, WatchHistory},
};

/// Ratings at or above this count as "liked" for content similarity
pub const LIKED_RATING_THRESHOLD: f64 = 4.0;

/// Signal weight of a favorited movie the user never rated
pub const FAVORITE_SIGNAL: f64 = 5.0;

/// Everything a user has done, with the referenced movies fully loaded
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserHistory {
    pub user_id: UserId,
    pub ratings: Vec<Rating>,
    pub favorites: Vec<Favorite>,
    pub watched: Vec<WatchHistory>,
    pub movies: HashMap<MovieId, Movie>,
}

impl UserHistory {
    pub fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ratings.is_empty() && self.favorites.is_empty() && self.watched.is_empty()
    }

    pub fn rated_ids(&self) -> HashSet<MovieId> {
        self.ratings.iter().map(|r| r.movie_id).collect()
    }

    pub fn favorited_ids(&self) -> HashSet<MovieId> {
        self.favorites.iter().map(|f| f.movie_id).collect()
    }

    pub fn watched_ids(&self) -> HashSet<MovieId> {
        self.watched.iter().map(|w| w.movie_id).collect()
    }

    /// Weight per rated or favorited movie, ordered by movie id
    ///
    /// A rating wins over a favorite for the same movie.
    pub fn preference_signals(&self) -> Vec<(&Movie, f64)> {
        let mut signals: BTreeMap<MovieId, f64> = self
            .favorites
            .iter()
            .map(|f| (f.movie_id, FAVORITE_SIGNAL))
            .collect();
        for rating in &self.ratings {
            signals.insert(rating.movie_id, rating.score);
        }

        signals
            .into_iter()
            .filter_map(|(id, weight)| self.movies.get(&id).map(|m| (m, weight)))
            .collect()
    }

    /// Highly rated or favorited movies, ordered by movie id
    pub fn liked_movies(&self) -> Vec<&Movie> {
        let mut ids: Vec<MovieId> = self
            .ratings
            .iter()
            .filter(|r| r.score >= LIKED_RATING_THRESHOLD)
            .map(|r| r.movie_id)
            .chain(self.favorites.iter().map(|f| f.movie_id))
            .collect();
        ids.sort_unstable();
        ids.dedup();

        ids.iter().filter_map(|id| self.movies.get(id)).collect()
    }
}

/// Loads a user's interaction history from the catalog
#[derive(Clone)]
pub struct InteractionHistoryReader {
    store: Arc<dyn CatalogStore>,
}

impl InteractionHistoryReader {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    /// Fails with `NotFound` for unknown users; a known user without activity
    /// yields an empty history
    pub async fn load(&self, user_id: UserId) -> AppResult<UserHistory> {
        if !self.store.user_exists(user_id).await? {
            return Err(AppError::NotFound(format!("User {} does not exist", user_id)));
        }

        let (ratings, favorites, watched) = tokio::try_join!(
            self.store.find_ratings_by_user(user_id),
            self.store.find_favorites_by_user(user_id),
            self.store.find_watch_history_by_user(user_id),
        )?;

        let mut ids: Vec<MovieId> = ratings
            .iter()
            .map(|r| r.movie_id)
            .chain(favorites.iter().map(|f| f.movie_id))
            .chain(watched.iter().map(|w| w.movie_id))
            .collect();
        ids.sort_unstable();
        ids.dedup();

        let movies = self
            .store
            .find_movies_by_ids(&ids)
            .await?
            .into_iter()
            .map(|m| (m.id, m))
            .collect();

        tracing::debug!(
            user_id,
            ratings = ratings.len(),
            favorites = favorites.len(),
            watched = watched.len(),
            "Loaded interaction history"
        );

        Ok(UserHistory {
            user_id,
            ratings,
            favorites,
            watched,
            movies,
        })
    }
}
