use chrono::{NaiveDate, TimeZone, Utc};

use cinerec_api::models::{Genre, Movie, MovieId, Tag};

/// A movie released 2020-01-01; genres and tags get ids from their position
/// in `LABELS` so movies sharing a name share an id.
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

const LABELS: [&str; 4] = ["Action", "Drama", "Comedy", "heist"];

fn label_id(name: &str) -> i64 {
    LABELS
        .iter()
        .position(|label| *label == name)
        .map_or(0, |index| index as i64 + 1)
}
