use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub type MovieId = i64;
pub type UserId = i64;

/// Movie genre
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::FromRow)]
pub struct Genre {
    pub id: i64,
    pub name: String,
}

/// Free-form tag used for additional categorization
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::FromRow)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

/// A catalog movie with its genres and tags fully loaded
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Movie {
    pub id: MovieId,
    pub title: String,
    pub description: String,
    pub release_date: NaiveDate,
    /// Duration in minutes
    pub duration: Option<i32>,
    /// External (IMDB-style) rating on a 0.0-10.0 scale
    pub external_rating: Option<f64>,
    /// Periodically recomputed from rating, favorite and watch activity
    pub popularity: f64,
    pub created_at: DateTime<Utc>,
    pub genres: Vec<Genre>,
    pub tags: Vec<Tag>,
}

impl Movie {
    pub fn genre_names(&self) -> Vec<String> {
        self.genres.iter().map(|g| g.name.clone()).collect()
    }
}

/// Compact movie representation embedded in list and recommendation responses
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MovieSummary {
    pub id: MovieId,
    pub title: String,
    pub release_date: NaiveDate,
    pub duration: Option<i32>,
    pub external_rating: Option<f64>,
    pub popularity: f64,
    pub genres: Vec<String>,
    pub tags: Vec<String>,
}

impl From<&Movie> for MovieSummary {
    fn from(movie: &Movie) -> Self {
        Self {
            id: movie.id,
            title: movie.title.clone(),
            release_date: movie.release_date,
            duration: movie.duration,
            external_rating: movie.external_rating,
            popularity: movie.popularity,
            genres: movie.genre_names(),
            tags: movie.tags.iter().map(|t| t.name.clone()).collect(),
        }
    }
}

/// Sort order for catalog listings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovieOrder {
    #[default]
    Popularity,
    Rating,
    ReleaseDate,
    Title,
}

/// Window used by the trending listing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendingPeriod {
    Daily,
    #[default]
    Weekly,
    Monthly,
}

impl TrendingPeriod {
    pub fn window(self) -> Duration {
        match self {
            TrendingPeriod::Daily => Duration::days(1),
            TrendingPeriod::Weekly => Duration::weeks(1),
            TrendingPeriod::Monthly => Duration::days(30),
        }
    }
}
