//! Scoring strategies
//!
//! Each strategy turns a candidate pool into normalized scores in `[0, 1]`.
//! Strategies are pure functions over data the recommendation service has
//! already loaded; they never touch the store or the cache.

pub mod collaborative;
pub mod content;
pub mod genre;
pub mod popularity;

use std::cmp::Ordering;

use crate::{
    models::{Movie, ScoredMovie, Strategy},
    services::history::UserHistory,
};

pub use collaborative::Neighbour;

/// Everything a strategy may look at
#[derive(Debug, Clone, Copy)]
pub struct StrategyInput<'a> {
    pub history: &'a UserHistory,
    pub candidates: &'a [Movie],
    /// Only populated for the collaborative strategy
    pub neighbours: &'a [Neighbour],
}

impl Strategy {
    /// Scores the candidates, best first
    ///
    /// An empty result means the strategy abstains for this request.
    pub fn score(self, input: &StrategyInput<'_>) -> Vec<ScoredMovie> {
        match self {
            Strategy::Popularity => popularity::score(input.candidates),
            Strategy::Genre => genre::score(input.history, input.candidates),
            Strategy::Collaborative => collaborative::score(input.neighbours, input.candidates),
            Strategy::Content => {
                content::score_against(&input.history.liked_movies(), input.candidates)
            }
        }
    }

    /// Whether the strategy needs similar users loaded before scoring
    pub fn needs_neighbours(self) -> bool {
        matches!(self, Strategy::Collaborative)
    }
}

/// Score descending, then popularity descending, then movie id ascending
pub fn compare_scored(a: &ScoredMovie, b: &ScoredMovie) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.popularity.total_cmp(&a.popularity))
        .then_with(|| a.movie_id.cmp(&b.movie_id))
}

pub fn rank(scored: &mut [ScoredMovie]) {
    scored.sort_by(compare_scored);
}
