use chrono::Utc;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;

use super::store::{CatalogCounts, CatalogStore, MovieQuery};
use crate::{
    error::AppResult,
    models::{
        Favorite, Genre, Movie, MovieActivity, MovieId, MovieOrder, NewRating, NewWatch, Rating,
        SimilarUser, UserId, WatchHistory,
    },
    services::strategies::collaborative::cosine_similarity,
};

/// Catalog store held entirely in process memory
///
/// Used by the test suite and for local runs without PostgreSQL.
#[derive(Clone, Default)]
pub struct MemoryCatalogStore {
    inner: Arc<RwLock<MemoryCatalogInner>>,
}

/// Inner state that can be modified
#[derive(Default)]
struct MemoryCatalogInner {
    users: HashSet<UserId>,
    movies: BTreeMap<MovieId, Movie>,
    ratings: BTreeMap<(UserId, MovieId), Rating>,
    favorites: BTreeMap<(UserId, MovieId), Favorite>,
    watch_history: BTreeMap<(UserId, MovieId), WatchHistory>,
}

impl MemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user_id: UserId) {
        self.inner.write().await.users.insert(user_id);
    }

    /// Inserts or replaces a movie, keeping genres and tags sorted by name
    pub async fn insert_movie(&self, mut movie: Movie) {
        movie.genres.sort_by(|a, b| a.name.cmp(&b.name));
        movie.tags.sort_by(|a, b| a.name.cmp(&b.name));
        self.inner.write().await.movies.insert(movie.id, movie);
    }
}

fn compare_movies(order: MovieOrder, a: &Movie, b: &Movie) -> Ordering {
    let by_rating = |a: &Movie, b: &Movie| {
        let left = a.external_rating.unwrap_or(f64::NEG_INFINITY);
        let right = b.external_rating.unwrap_or(f64::NEG_INFINITY);
        right.total_cmp(&left)
    };

    match order {
        MovieOrder::Popularity => b
            .popularity
            .total_cmp(&a.popularity)
            .then_with(|| by_rating(a, b))
            .then_with(|| b.release_date.cmp(&a.release_date)),
        MovieOrder::Rating => by_rating(a, b).then_with(|| b.popularity.total_cmp(&a.popularity)),
        MovieOrder::ReleaseDate => b.release_date.cmp(&a.release_date),
        MovieOrder::Title => a.title.cmp(&b.title),
    }
    .then_with(|| a.id.cmp(&b.id))
}

fn matches(query: &MovieQuery, movie: &Movie) -> bool {
    if let Some(search) = &query.search {
        if !movie
            .title
            .to_lowercase()
            .contains(&search.to_lowercase())
        {
            return false;
        }
    }
    if let Some(genre) = &query.genre {
        if !movie.genres.iter().any(|g| &g.name == genre) {
            return false;
        }
    }
    if let Some(min_rating) = query.min_external_rating {
        if movie.external_rating.map_or(true, |r| r < min_rating) {
            return false;
        }
    }
    if let Some(created_after) = query.created_after {
        if movie.created_at < created_after {
            return false;
        }
    }
    !query.exclude.contains(&movie.id)
}

#[async_trait::async_trait]
impl CatalogStore for MemoryCatalogStore {
    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn counts(&self) -> AppResult<CatalogCounts> {
        let inner = self.inner.read().await;
        Ok(CatalogCounts {
            users: inner.users.len() as i64,
            movies: inner.movies.len() as i64,
            ratings: inner.ratings.len() as i64,
        })
    }

    async fn user_exists(&self, user_id: UserId) -> AppResult<bool> {
        Ok(self.inner.read().await.users.contains(&user_id))
    }

    async fn find_movies(&self, query: &MovieQuery) -> AppResult<Vec<Movie>> {
        let inner = self.inner.read().await;
        let mut movies: Vec<&Movie> = inner.movies.values().filter(|m| matches(query, m)).collect();
        movies.sort_by(|a, b| compare_movies(query.order, a, b));

        Ok(movies
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .cloned()
            .collect())
    }

    async fn find_movies_by_ids(&self, ids: &[MovieId]) -> AppResult<Vec<Movie>> {
        let inner = self.inner.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| inner.movies.get(id))
            .cloned()
            .collect())
    }

    async fn get_movie(&self, movie_id: MovieId) -> AppResult<Option<Movie>> {
        Ok(self.inner.read().await.movies.get(&movie_id).cloned())
    }

    async fn list_genres(&self) -> AppResult<Vec<Genre>> {
        let inner = self.inner.read().await;
        let mut genres: Vec<Genre> = inner
            .movies
            .values()
            .flat_map(|m| m.genres.iter().cloned())
            .collect();
        genres.sort_by(|a, b| a.name.cmp(&b.name));
        genres.dedup_by(|a, b| a.id == b.id);
        Ok(genres)
    }

    async fn find_ratings_by_user(&self, user_id: UserId) -> AppResult<Vec<Rating>> {
        let inner = self.inner.read().await;
        let mut ratings: Vec<Rating> = inner
            .ratings
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        ratings.sort_by(|a, b| b.rated_at.cmp(&a.rated_at).then(a.movie_id.cmp(&b.movie_id)));
        Ok(ratings)
    }

    async fn find_favorites_by_user(&self, user_id: UserId) -> AppResult<Vec<Favorite>> {
        let inner = self.inner.read().await;
        let mut favorites: Vec<Favorite> = inner
            .favorites
            .values()
            .filter(|f| f.user_id == user_id)
            .cloned()
            .collect();
        favorites.sort_by(|a, b| {
            b.favorited_at
                .cmp(&a.favorited_at)
                .then(a.movie_id.cmp(&b.movie_id))
        });
        Ok(favorites)
    }

    async fn find_watch_history_by_user(&self, user_id: UserId) -> AppResult<Vec<WatchHistory>> {
        let inner = self.inner.read().await;
        let mut history: Vec<WatchHistory> = inner
            .watch_history
            .values()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect();
        history.sort_by(|a, b| b.watched_at.cmp(&a.watched_at).then(a.movie_id.cmp(&b.movie_id)));
        Ok(history)
    }

    async fn find_ratings_by_movie(&self, movie_id: MovieId) -> AppResult<Vec<Rating>> {
        let inner = self.inner.read().await;
        Ok(inner
            .ratings
            .values()
            .filter(|r| r.movie_id == movie_id)
            .cloned()
            .collect())
    }

    async fn find_ratings_by_users(&self, user_ids: &[UserId]) -> AppResult<Vec<Rating>> {
        let inner = self.inner.read().await;
        Ok(inner
            .ratings
            .values()
            .filter(|r| user_ids.contains(&r.user_id))
            .cloned()
            .collect())
    }

    async fn find_similar_users(
        &self,
        user_id: UserId,
        k: usize,
        min_overlap: usize,
    ) -> AppResult<Vec<SimilarUser>> {
        let inner = self.inner.read().await;

        let mut vectors: BTreeMap<UserId, HashMap<MovieId, f64>> = BTreeMap::new();
        for rating in inner.ratings.values() {
            vectors
                .entry(rating.user_id)
                .or_default()
                .insert(rating.movie_id, rating.score);
        }

        let Some(mine) = vectors.get(&user_id) else {
            return Ok(Vec::new());
        };

        let mut similar: Vec<SimilarUser> = vectors
            .iter()
            .filter(|(other, _)| **other != user_id)
            .filter_map(|(other, theirs)| {
                let (similarity, overlap) = cosine_similarity(mine, theirs);
                (overlap >= min_overlap.max(1) && similarity > 0.0).then_some(SimilarUser {
                    user_id: *other,
                    similarity,
                    overlap: overlap as i64,
                })
            })
            .collect();

        similar.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then(a.user_id.cmp(&b.user_id))
        });
        similar.truncate(k);
        Ok(similar)
    }

    async fn upsert_rating(&self, rating: &NewRating) -> AppResult<Rating> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let key = (rating.user_id, rating.movie_id);

        let stored = match inner.ratings.get(&key) {
            Some(existing) => Rating {
                score: rating.score.value(),
                review: rating.review.clone(),
                updated_at: now,
                ..existing.clone()
            },
            None => Rating {
                user_id: rating.user_id,
                movie_id: rating.movie_id,
                score: rating.score.value(),
                review: rating.review.clone(),
                rated_at: now,
                updated_at: now,
            },
        };

        inner.ratings.insert(key, stored.clone());
        Ok(stored)
    }

    async fn delete_rating(&self, user_id: UserId, movie_id: MovieId) -> AppResult<bool> {
        let mut inner = self.inner.write().await;
        Ok(inner.ratings.remove(&(user_id, movie_id)).is_some())
    }

    async fn toggle_favorite(
        &self,
        user_id: UserId,
        movie_id: MovieId,
    ) -> AppResult<Option<Favorite>> {
        let mut inner = self.inner.write().await;
        let key = (user_id, movie_id);

        if inner.favorites.remove(&key).is_some() {
            return Ok(None);
        }

        let favorite = Favorite {
            user_id,
            movie_id,
            favorited_at: Utc::now(),
        };
        inner.favorites.insert(key, favorite.clone());
        Ok(Some(favorite))
    }

    async fn upsert_watch(&self, watch: &NewWatch) -> AppResult<WatchHistory> {
        let mut inner = self.inner.write().await;
        let stored = WatchHistory {
            user_id: watch.user_id,
            movie_id: watch.movie_id,
            progress_minutes: watch.progress_minutes,
            completed: watch.completed,
            watched_at: Utc::now(),
        };
        inner
            .watch_history
            .insert((watch.user_id, watch.movie_id), stored.clone());
        Ok(stored)
    }

    async fn delete_watch(&self, user_id: UserId, movie_id: MovieId) -> AppResult<bool> {
        let mut inner = self.inner.write().await;
        Ok(inner.watch_history.remove(&(user_id, movie_id)).is_some())
    }

    async fn movie_activity(&self) -> AppResult<Vec<MovieActivity>> {
        let inner = self.inner.read().await;

        Ok(inner
            .movies
            .keys()
            .map(|movie_id| {
                let scores: Vec<f64> = inner
                    .ratings
                    .values()
                    .filter(|r| r.movie_id == *movie_id)
                    .map(|r| r.score)
                    .collect();
                let average_rating = (!scores.is_empty())
                    .then(|| scores.iter().sum::<f64>() / scores.len() as f64);

                MovieActivity {
                    movie_id: *movie_id,
                    rating_count: scores.len() as i64,
                    average_rating,
                    favorite_count: inner
                        .favorites
                        .values()
                        .filter(|f| f.movie_id == *movie_id)
                        .count() as i64,
                    completed_watches: inner
                        .watch_history
                        .values()
                        .filter(|w| w.movie_id == *movie_id && w.completed)
                        .count() as i64,
                }
            })
            .collect())
    }

    async fn update_popularity(&self, scores: &[(MovieId, f64)]) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        for (movie_id, popularity) in scores {
            if let Some(movie) = inner.movies.get_mut(movie_id) {
                movie.popularity = *popularity;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RatingScore;
    use crate::test_support::movie;

    async fn seeded() -> MemoryCatalogStore {
        let store = MemoryCatalogStore::new();
        for user in [1, 2, 3] {
            store.insert_user(user).await;
        }
        store.insert_movie(movie(1, 90.0, &["Action"], &[])).await;
        store.insert_movie(movie(2, 70.0, &["Drama"], &[])).await;
        store.insert_movie(movie(3, 70.0, &["Action", "Drama"], &[])).await;
        store
    }

    async fn rate(store: &MemoryCatalogStore, user_id: UserId, movie_id: MovieId, score: f64) {
        store
            .upsert_rating(&NewRating {
                user_id,
                movie_id,
                score: RatingScore::new(score).unwrap(),
                review: None,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_find_movies_orders_by_popularity_then_id() {
        let store = seeded().await;
        let query = MovieQuery {
            limit: 10,
            ..Default::default()
        };
        let ids: Vec<MovieId> = store
            .find_movies(&query)
            .await
            .unwrap()
            .iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_find_movies_filters_genre_and_exclusions() {
        let store = seeded().await;
        let query = MovieQuery {
            genre: Some("Action".to_string()),
            exclude: vec![1],
            limit: 10,
            ..Default::default()
        };
        let ids: Vec<MovieId> = store
            .find_movies(&query)
            .await
            .unwrap()
            .iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec![3]);
    }

    #[tokio::test]
    async fn test_upsert_rating_overwrites() {
        let store = seeded().await;
        rate(&store, 1, 1, 2.0).await;
        rate(&store, 1, 1, 4.0).await;

        let ratings = store.find_ratings_by_user(1).await.unwrap();
        assert_eq!(ratings.len(), 1);
        assert_eq!(ratings[0].score, 4.0);
    }

    #[tokio::test]
    async fn test_toggle_favorite() {
        let store = seeded().await;
        assert!(store.toggle_favorite(1, 2).await.unwrap().is_some());
        assert!(store.toggle_favorite(1, 2).await.unwrap().is_none());
        assert!(store.find_favorites_by_user(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_similar_users_ranked_by_cosine() {
        let store = seeded().await;
        rate(&store, 1, 1, 5.0).await;
        rate(&store, 1, 2, 1.0).await;
        // user 2 agrees with user 1, user 3 disagrees
        rate(&store, 2, 1, 5.0).await;
        rate(&store, 2, 2, 1.0).await;
        rate(&store, 3, 1, 1.0).await;
        rate(&store, 3, 2, 5.0).await;

        let similar = store.find_similar_users(1, 10, 1).await.unwrap();
        assert_eq!(similar.len(), 2);
        assert_eq!(similar[0].user_id, 2);
        assert!((similar[0].similarity - 1.0).abs() < 1e-9);
        assert_eq!(similar[1].user_id, 3);
        assert!(similar[1].similarity < similar[0].similarity);
    }
}
