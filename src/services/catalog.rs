use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;

use crate::{
    cache::ResultCache,
    cached,
    db::{CatalogCounts, CatalogStore, MovieQuery},
    error::{AppError, AppResult},
    models::{
        Genre, Movie, MovieId, MovieOrder, MovieRatingStats, MovieSummary, TrendingPeriod,
        UserId, UserStats, MAX_RECOMMENDATIONS,
    },
    services::{history::InteractionHistoryReader, strategies::genre},
};

pub const MAX_PAGE_SIZE: usize = 100;
pub const MAX_TRENDING: usize = 100;
pub const MOVIE_STATS_TTL: Duration = Duration::from_secs(300);
/// Genres listed in a user's statistics
const FAVORITE_GENRES: usize = 3;

/// Query parameters of the movie listing
#[derive(Debug, Clone, Deserialize)]
pub struct MovieListParams {
    pub search: Option<String>,
    pub genre: Option<String>,
    pub min_rating: Option<f64>,
    #[serde(default)]
    pub ordering: MovieOrder,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    20
}

impl Default for MovieListParams {
    fn default() -> Self {
        Self {
            search: None,
            genre: None,
            min_rating: None,
            ordering: MovieOrder::default(),
            page: default_page(),
            page_size: default_page_size(),
        }
    }
}

fn check_limit(field: &str, value: usize, max: usize) -> AppResult<()> {
    if value == 0 || value > max {
        return Err(AppError::validation(
            field,
            format!("Must be between 1 and {}.", max),
        ));
    }
    Ok(())
}

/// Read side of the catalog: listings, details and statistics
#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn CatalogStore>,
    cache: ResultCache,
    history: InteractionHistoryReader,
}

impl CatalogService {
    pub fn new(store: Arc<dyn CatalogStore>, cache: ResultCache) -> Self {
        Self {
            history: InteractionHistoryReader::new(store.clone()),
            store,
            cache,
        }
    }

    pub async fn health(&self) -> AppResult<CatalogCounts> {
        self.store.ping().await?;
        self.store.counts().await
    }

    pub async fn list_movies(&self, params: &MovieListParams) -> AppResult<Vec<MovieSummary>> {
        check_limit("page_size", params.page_size, MAX_PAGE_SIZE)?;
        if params.page == 0 {
            return Err(AppError::validation("page", "Pages start at 1."));
        }

        // the store binds the offset as a signed 64-bit value
        let offset = (params.page - 1)
            .checked_mul(params.page_size)
            .filter(|offset| i64::try_from(*offset).is_ok())
            .ok_or_else(|| AppError::validation("page", "Page is out of range."))?;

        let query = MovieQuery {
            search: params.search.clone().filter(|s| !s.trim().is_empty()),
            genre: params.genre.clone().filter(|g| !g.trim().is_empty()),
            min_external_rating: params.min_rating,
            order: params.ordering,
            limit: params.page_size,
            offset,
            ..Default::default()
        };
        let movies = self.store.find_movies(&query).await?;
        Ok(movies.iter().map(MovieSummary::from).collect())
    }

    pub async fn get_movie(&self, movie_id: MovieId) -> AppResult<Movie> {
        self.store
            .get_movie(movie_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Movie {} does not exist", movie_id)))
    }

    pub async fn list_genres(&self) -> AppResult<Vec<Genre>> {
        self.store.list_genres().await
    }

    pub async fn popular(
        &self,
        limit: usize,
        min_rating: Option<f64>,
    ) -> AppResult<Vec<MovieSummary>> {
        check_limit("limit", limit, MAX_RECOMMENDATIONS)?;
        let query = MovieQuery {
            min_external_rating: min_rating,
            order: MovieOrder::Popularity,
            limit,
            ..Default::default()
        };
        let movies = self.store.find_movies(&query).await?;
        Ok(movies.iter().map(MovieSummary::from).collect())
    }

    /// Most popular movies added within the period
    pub async fn trending(
        &self,
        period: TrendingPeriod,
        limit: usize,
    ) -> AppResult<Vec<MovieSummary>> {
        check_limit("limit", limit, MAX_TRENDING)?;
        let query = MovieQuery {
            created_after: Some(Utc::now() - period.window()),
            order: MovieOrder::Popularity,
            limit,
            ..Default::default()
        };
        let movies = self.store.find_movies(&query).await?;
        Ok(movies.iter().map(MovieSummary::from).collect())
    }

    pub async fn movie_stats(&self, movie_id: MovieId) -> AppResult<MovieRatingStats> {
        let key = self.cache.movie_stats_key(movie_id).await;
        let movie = self.get_movie(movie_id).await?;
        let compute = async {
            let ratings = self.store.find_ratings_by_movie(movie_id).await?;
            let scores: Vec<f64> = ratings.iter().map(|r| r.score).collect();
            AppResult::Ok(rating_stats(&movie, &scores))
        };

        match key {
            Some(key) => cached!(self.cache, key, MOVIE_STATS_TTL, compute),
            None => compute.await,
        }
    }

    pub async fn user_stats(&self, user_id: UserId) -> AppResult<UserStats> {
        let history = self.history.load(user_id).await?;

        let total_ratings = history.ratings.len();
        let average_rating_given = if total_ratings == 0 {
            0.0
        } else {
            round2(history.ratings.iter().map(|r| r.score).sum::<f64>() / total_ratings as f64)
        };

        let total_watch_time_minutes = history
            .watched
            .iter()
            .map(|w| match (w.progress_minutes, w.completed) {
                (Some(progress), _) => i64::from(progress),
                (None, true) => history
                    .movies
                    .get(&w.movie_id)
                    .and_then(|m| m.duration)
                    .map_or(0, i64::from),
                (None, false) => 0,
            })
            .sum();

        let mut genres: Vec<(String, f64)> = genre::affinity_table(&history).into_iter().collect();
        genres.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        Ok(UserStats {
            total_ratings,
            average_rating_given,
            total_favorites: history.favorites.len(),
            total_watch_time_minutes,
            movies_completed: history.watched.iter().filter(|w| w.completed).count(),
            favorite_genres: genres
                .into_iter()
                .take(FAVORITE_GENRES)
                .map(|(name, _)| name)
                .collect(),
        })
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn rating_stats(movie: &Movie, scores: &[f64]) -> MovieRatingStats {
    let mut distribution: BTreeMap<String, usize> =
        (1..=5).map(|star| (star.to_string(), 0)).collect();
    for score in scores {
        let star = score.round().clamp(1.0, 5.0) as u8;
        *distribution.entry(star.to_string()).or_insert(0) += 1;
    }

    let average_rating = if scores.is_empty() {
        0.0
    } else {
        round2(scores.iter().sum::<f64>() / scores.len() as f64)
    };

    MovieRatingStats {
        movie_id: movie.id,
        movie_title: movie.title.clone(),
        total_ratings: scores.len(),
        average_rating,
        rating_distribution: distribution,
    }
}
