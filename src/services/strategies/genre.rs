use std::collections::BTreeMap;

use super::rank;
use crate::{
    models::{Movie, ScoredMovie},
    services::history::UserHistory,
};

/// Genres named in a recommendation reason
const REASON_GENRES: usize = 2;

/// Accumulated preference weight per genre name
///
/// Each rated movie adds its rating score to every one of its genres; a
/// favorited movie without a rating adds the maximum score.
pub fn affinity_table(history: &UserHistory) -> BTreeMap<String, f64> {
    let mut table = BTreeMap::new();
    for (movie, weight) in history.preference_signals() {
        for genre in &movie.genres {
            *table.entry(genre.name.clone()).or_insert(0.0) += weight;
        }
    }
    table
}

/// Scores candidates by how well their genres match the user's taste
///
/// Candidates sharing no genre with the table are left out.
pub fn score(history: &UserHistory, candidates: &[Movie]) -> Vec<ScoredMovie> {
    let table = affinity_table(history);
    let max_weight = table.values().copied().fold(0.0_f64, f64::max);
    if max_weight <= 0.0 {
        return Vec::new();
    }

    let mut scored: Vec<ScoredMovie> = candidates
        .iter()
        .filter(|movie| !movie.genres.is_empty())
        .filter_map(|movie| {
            let mut matched: Vec<(&str, f64)> = movie
                .genres
                .iter()
                .filter_map(|g| table.get(&g.name).map(|w| (g.name.as_str(), *w)))
                .filter(|(_, w)| *w > 0.0)
                .collect();
            if matched.is_empty() {
                return None;
            }

            let raw = matched.iter().map(|(_, w)| w).sum::<f64>() / movie.genres.len() as f64;
            matched.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
            let names: Vec<&str> = matched
                .iter()
                .take(REASON_GENRES)
                .map(|(name, _)| *name)
                .collect();

            Some(ScoredMovie {
                movie_id: movie.id,
                score: (raw / max_weight).clamp(0.0, 1.0),
                popularity: movie.popularity,
                reason: format!("Matches your interest in {}", names.join(", ")),
            })
        })
        .collect();

    rank(&mut scored);
    scored
}
