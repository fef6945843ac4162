//! Fixture builders shared by unit tests.

use chrono::{NaiveDate, TimeZone, Utc};

use crate::models::{Genre, Movie, MovieId, Tag};

/// Stable id for a genre or tag name so fixtures agree across movies
pub fn label_id(name: &str) -> i64 {
    name.bytes()
        .fold(7_i64, |acc, b| acc.wrapping_mul(31).wrapping_add(i64::from(b)))
        .abs()
}

/// A movie released 2020-01-01 with no external rating
pub fn movie(id: MovieId, popularity: f64, genres: &[&str], tags: &[&str]) -> Movie {
    Movie {
        id,
        title: format!("Movie {}", id),
        description: String::new(),
        release_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
        duration: Some(120),
        external_rating: None,
        popularity,
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        genres: genres
            .iter()
            .map(|name| Genre {
                id: label_id(name),
                name: (*name).to_string(),
            })
            .collect(),
        tags: tags
            .iter()
            .map(|name| Tag {
                id: label_id(name),
                name: (*name).to_string(),
            })
            .collect(),
    }
}
