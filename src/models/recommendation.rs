use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

use super::{MovieId, MovieSummary};
use crate::error::{AppError, AppResult};

pub const MAX_RECOMMENDATIONS: usize = 50;
pub const MAX_EXTERNAL_RATING: f64 = 10.0;

/// A single scoring algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Popularity,
    Genre,
    Collaborative,
    Content,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::Popularity,
        Strategy::Genre,
        Strategy::Collaborative,
        Strategy::Content,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Popularity => "popularity",
            Strategy::Genre => "genre",
            Strategy::Collaborative => "collaborative",
            Strategy::Content => "content",
        }
    }
}

impl Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Algorithm requested by the caller: one strategy, or all of them combined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    Popularity,
    Genre,
    Collaborative,
    Content,
    #[default]
    Hybrid,
}

impl Algorithm {
    pub fn strategies(self) -> &'static [Strategy] {
        match self {
            Algorithm::Popularity => &[Strategy::Popularity],
            Algorithm::Genre => &[Strategy::Genre],
            Algorithm::Collaborative => &[Strategy::Collaborative],
            Algorithm::Content => &[Strategy::Content],
            Algorithm::Hybrid => &Strategy::ALL,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Algorithm::Popularity => "popularity",
            Algorithm::Genre => "genre",
            Algorithm::Collaborative => "collaborative",
            Algorithm::Content => "content",
            Algorithm::Hybrid => "hybrid",
        }
    }
}

impl Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Query parameters of a recommendation request
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecommendationParams {
    #[serde(default)]
    pub algorithm: Algorithm,
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Minimum external rating of recommended movies
    #[serde(default)]
    pub min_rating: f64,
    #[serde(default = "default_true")]
    pub exclude_rated: bool,
    #[serde(default)]
    pub exclude_watched: bool,
}

fn default_limit() -> usize {
    10
}

fn default_true() -> bool {
    true
}

impl Default for RecommendationParams {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::default(),
            limit: default_limit(),
            min_rating: 0.0,
            exclude_rated: true,
            exclude_watched: false,
        }
    }
}

impl RecommendationParams {
    pub fn validate(&self) -> AppResult<()> {
        if self.limit == 0 || self.limit > MAX_RECOMMENDATIONS {
            return Err(AppError::validation(
                "limit",
                format!("Limit must be between 1 and {}.", MAX_RECOMMENDATIONS),
            ));
        }
        if !self.min_rating.is_finite() || !(0.0..=MAX_EXTERNAL_RATING).contains(&self.min_rating)
        {
            return Err(AppError::validation(
                "min_rating",
                format!("Minimum rating must be between 0 and {}.", MAX_EXTERNAL_RATING),
            ));
        }
        Ok(())
    }

    /// Canonical rendering of everything but the algorithm, sorted by name
    pub fn cache_fragment(&self) -> String {
        format!(
            "exclude_rated={}:exclude_watched={}:limit={}:min_rating={}",
            self.exclude_rated, self.exclude_watched, self.limit, self.min_rating
        )
    }
}

/// One strategy's verdict on one candidate
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMovie {
    pub movie_id: MovieId,
    /// Normalized to [0, 1]
    pub score: f64,
    /// Carried along for deterministic tie-breaking
    pub popularity: f64,
    pub reason: String,
}

/// A ranked movie as returned to the client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    pub movie: MovieSummary,
    pub score: f64,
    pub reason: String,
    pub algorithm: Algorithm,
}

/// Cached ranking for one (user, algorithm, params) key
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendationResult {
    pub entries: Vec<Recommendation>,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
