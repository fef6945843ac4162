use std::collections::HashMap;

use super::rank;
use crate::models::{Movie, MovieId, ScoredMovie, UserId, MAX_RATING_SCORE};

/// A similar user together with their full rating vector
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbour {
    pub user_id: UserId,
    pub similarity: f64,
    pub ratings: HashMap<MovieId, f64>,
}

/// Cosine similarity of two sparse rating vectors and the number of movies
/// both rated
///
/// Norms are taken over each full vector, so users who rated many unrelated
/// movies score lower than users whose ratings overlap almost entirely.
pub fn cosine_similarity(a: &HashMap<MovieId, f64>, b: &HashMap<MovieId, f64>) -> (f64, usize) {
    let (dot, overlap) = a
        .iter()
        .filter_map(|(movie_id, x)| b.get(movie_id).map(|y| x * y))
        .fold((0.0, 0), |(dot, n), product| (dot + product, n + 1));

    if overlap == 0 {
        return (0.0, 0);
    }

    let norm = |v: &HashMap<MovieId, f64>| v.values().map(|x| x * x).sum::<f64>().sqrt();
    let (norm_a, norm_b) = (norm(a), norm(b));
    if norm_a == 0.0 || norm_b == 0.0 {
        return (0.0, overlap);
    }

    (dot / (norm_a * norm_b), overlap)
}

/// Similarity-weighted average of neighbour ratings, scaled to `[0, 1]`
///
/// Candidates no neighbour has rated are left out.
pub fn score(neighbours: &[Neighbour], candidates: &[Movie]) -> Vec<ScoredMovie> {
    if neighbours.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<ScoredMovie> = candidates
        .iter()
        .filter_map(|movie| {
            let (weighted, total_similarity, raters) = neighbours
                .iter()
                .filter(|n| n.similarity > 0.0)
                .filter_map(|n| n.ratings.get(&movie.id).map(|r| (n.similarity, *r)))
                .fold((0.0, 0.0, 0_usize), |(w, s, c), (sim, rating)| {
                    (w + sim * rating, s + sim, c + 1)
                });

            if raters == 0 || total_similarity <= 0.0 {
                return None;
            }

            let predicted = weighted / total_similarity;
            Some(ScoredMovie {
                movie_id: movie.id,
                score: (predicted / MAX_RATING_SCORE).clamp(0.0, 1.0),
                popularity: movie.popularity,
                reason: format!(
                    "Rated {:.1}/5 by {} {} with similar taste",
                    predicted,
                    raters,
                    if raters == 1 { "user" } else { "users" }
                ),
            })
        })
        .collect();

    rank(&mut scored);
    scored
}
