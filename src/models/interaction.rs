use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{MovieId, UserId};
use crate::error::{AppError, AppResult};

pub const MIN_RATING_SCORE: f64 = 1.0;
pub const MAX_RATING_SCORE: f64 = 5.0;

/// A rating score that has been checked against the 1-5 bounds
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct RatingScore(f64);

impl RatingScore {
    pub fn new(value: f64) -> AppResult<Self> {
        if !value.is_finite() || !(MIN_RATING_SCORE..=MAX_RATING_SCORE).contains(&value) {
            return Err(AppError::validation(
                "score",
                format!(
                    "Rating must be between {} and {}.",
                    MIN_RATING_SCORE, MAX_RATING_SCORE
                ),
            ));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

/// A user's rating of a movie; at most one per (user, movie)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Rating {
    pub user_id: UserId,
    pub movie_id: MovieId,
    pub score: f64,
    pub review: Option<String>,
    pub rated_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Favorite {
    pub user_id: UserId,
    pub movie_id: MovieId,
    pub favorited_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct WatchHistory {
    pub user_id: UserId,
    pub movie_id: MovieId,
    /// Minutes watched so far
    pub progress_minutes: Option<i32>,
    pub completed: bool,
    pub watched_at: DateTime<Utc>,
}

/// Validated rating write
#[derive(Debug, Clone, PartialEq)]
pub struct NewRating {
    pub user_id: UserId,
    pub movie_id: MovieId,
    pub score: RatingScore,
    pub review: Option<String>,
}

/// Validated watch-history write
#[derive(Debug, Clone, PartialEq)]
pub struct NewWatch {
    pub user_id: UserId,
    pub movie_id: MovieId,
    pub progress_minutes: Option<i32>,
    pub completed: bool,
}

impl NewWatch {
    pub fn new(
        user_id: UserId,
        movie_id: MovieId,
        progress_minutes: Option<i32>,
        completed: bool,
    ) -> AppResult<Self> {
        if progress_minutes.is_some_and(|p| p < 0) {
            return Err(AppError::validation(
                "progress_minutes",
                "Progress cannot be negative.",
            ));
        }
        Ok(Self {
            user_id,
            movie_id,
            progress_minutes,
            completed,
        })
    }
}

/// Another user whose ratings resemble the target user's
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct SimilarUser {
    pub user_id: UserId,
    pub similarity: f64,
    /// Number of movies both users rated
    pub overlap: i64,
}

/// Aggregate activity used to recompute popularity scores
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct MovieActivity {
    pub movie_id: MovieId,
    pub rating_count: i64,
    pub average_rating: Option<f64>,
    pub favorite_count: i64,
    pub completed_watches: i64,
}

impl MovieActivity {
    /// Popularity formula: rating quality damped by volume, plus engagement counts
    pub fn popularity(&self) -> f64 {
        let rating_component = match self.average_rating {
            Some(avg) if self.rating_count > 0 => {
                avg * (1.0 + self.rating_count as f64).ln() * 10.0
            }
            _ => 0.0,
        };
        let score =
            rating_component + 2.0 * self.favorite_count as f64 + self.completed_watches as f64;
        (score * 100.0).round() / 100.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MovieRatingStats {
    pub movie_id: MovieId,
    pub movie_title: String,
    pub total_ratings: usize,
    pub average_rating: f64,
    /// Count of ratings per rounded star value, keyed "1" through "5"
    pub rating_distribution: std::collections::BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserStats {
    pub total_ratings: usize,
    pub average_rating_given: f64,
    pub total_favorites: usize,
    pub total_watch_time_minutes: i64,
    pub movies_completed: usize,
    pub favorite_genres: Vec<String>,
}
