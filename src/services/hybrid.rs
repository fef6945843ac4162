use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, AppResult},
    models::{MovieId, ScoredMovie, Strategy},
    services::strategies::rank,
};

/// Per-strategy weight applied by the hybrid combiner
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyWeights {
    pub popularity: f64,
    pub genre: f64,
    pub collaborative: f64,
    pub content: f64,
}

impl Default for StrategyWeights {
    fn default() -> Self {
        Self {
            popularity: 0.2,
            genre: 0.3,
            collaborative: 0.3,
            content: 0.2,
        }
    }
}

impl StrategyWeights {
    pub fn weight(&self, strategy: Strategy) -> f64 {
        match strategy {
            Strategy::Popularity => self.popularity,
            Strategy::Genre => self.genre,
            Strategy::Collaborative => self.collaborative,
            Strategy::Content => self.content,
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        for strategy in Strategy::ALL {
            let weight = self.weight(strategy);
            if !weight.is_finite() || weight < 0.0 {
                return Err(AppError::validation(
                    format!("weight_{}", strategy),
                    "Strategy weights must be finite and non-negative.",
                ));
            }
        }
        Ok(())
    }
}

struct Merged {
    score: f64,
    popularity: f64,
    contribution: f64,
    reason: String,
}

/// Merges per-strategy rankings into one
///
/// Every movie any strategy returned is kept; a strategy that did not score a
/// movie contributes nothing to it. The list is only cut to `limit` once all
/// strategies are merged. Each entry keeps the reason of the strategy that
/// contributed most to its score.
pub fn combine(
    outputs: &[(Strategy, Vec<ScoredMovie>)],
    weights: &StrategyWeights,
    limit: usize,
) -> Vec<ScoredMovie> {
    let mut ordered: Vec<&(Strategy, Vec<ScoredMovie>)> = outputs.iter().collect();
    ordered.sort_by_key(|(strategy, _)| *strategy);

    let mut merged: BTreeMap<MovieId, Merged> = BTreeMap::new();
    for (strategy, scored) in ordered {
        let weight = weights.weight(*strategy);
        for item in scored {
            let contribution = weight * item.score;
            match merged.get_mut(&item.movie_id) {
                Some(entry) => {
                    entry.score += contribution;
                    if contribution > entry.contribution {
                        entry.contribution = contribution;
                        entry.reason.clone_from(&item.reason);
                    }
                }
                None => {
                    merged.insert(
                        item.movie_id,
                        Merged {
                            score: contribution,
                            popularity: item.popularity,
                            contribution,
                            reason: item.reason.clone(),
                        },
                    );
                }
            }
        }
    }

    let mut combined: Vec<ScoredMovie> = merged
        .into_iter()
        .map(|(movie_id, m)| ScoredMovie {
            movie_id,
            score: m.score,
            popularity: m.popularity,
            reason: m.reason,
        })
        .collect();

    rank(&mut combined);
    combined.truncate(limit);
    combined
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn scored(movie_id: MovieId, score: f64, popularity: f64, reason: &str) -> ScoredMovie {
        ScoredMovie {
            movie_id,
            score,
            popularity,
            reason: reason.to_string(),
        }
    }

    fn weights(popularity: f64, genre: f64) -> StrategyWeights {
        StrategyWeights {
            popularity,
            genre,
            collaborative: 0.0,
            content: 0.0,
        }
    }

    #[test]
    fn test_weighted_sum() {
        let outputs = vec![
            (Strategy::Popularity, vec![scored(7, 0.5, 10.0, "popular")]),
            (Strategy::Genre, vec![scored(7, 0.8, 10.0, "genre")]),
        ];

        let combined = combine(&outputs, &weights(0.3, 0.7), 10);
        assert_eq!(combined.len(), 1);
        assert!((combined[0].score - 0.71).abs() < 1e-9);
        assert_eq!(combined[0].reason, "genre");
    }

    #[test]
    fn test_missing_strategy_contributes_zero() {
        let outputs = vec![
            (Strategy::Popularity, vec![scored(1, 1.0, 50.0, "p"), scored(2, 0.5, 25.0, "p")]),
            (Strategy::Genre, vec![scored(2, 1.0, 25.0, "g")]),
        ];

        let combined = combine(&outputs, &weights(0.3, 0.7), 10);
        let ids: Vec<MovieId> = combined.iter().map(|s| s.movie_id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert!((combined[1].score - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_output_is_truncated_union() {
        let outputs = vec![
            (
                Strategy::Popularity,
                (1..=6).map(|id| scored(id, 1.0 / id as f64, 10.0, "p")).collect(),
            ),
            (
                Strategy::Content,
                (4..=9).map(|id| scored(id, 0.5, 10.0, "c")).collect(),
            ),
        ];
        let union: BTreeSet<MovieId> = (1..=9).collect();

        for limit in [1, 4, 9, 20] {
            let combined = combine(&outputs, &StrategyWeights::default(), limit);
            let ids: BTreeSet<MovieId> = combined.iter().map(|s| s.movie_id).collect();
            assert_eq!(combined.len(), limit.min(union.len()));
            assert_eq!(ids.len(), combined.len());
            assert!(ids.is_subset(&union));
        }
    }

    #[test]
    fn test_deterministic_regardless_of_output_order() {
        let popularity = (
            Strategy::Popularity,
            vec![scored(1, 0.5, 5.0, "p"), scored(2, 0.5, 5.0, "p")],
        );
        let genre = (
            Strategy::Genre,
            vec![scored(2, 0.5, 5.0, "g"), scored(3, 1.0, 1.0, "g")],
        );

        let first = combine(&[popularity.clone(), genre.clone()], &StrategyWeights::default(), 10);
        let second = combine(&[genre, popularity], &StrategyWeights::default(), 10);
        assert_eq!(first, second);
    }

    #[test]
    fn test_ties_use_popularity_then_id() {
        let outputs = vec![(
            Strategy::Popularity,
            vec![scored(3, 0.5, 1.0, "p"), scored(2, 0.5, 9.0, "p"), scored(1, 0.5, 1.0, "p")],
        )];
        let ids: Vec<MovieId> = combine(&outputs, &StrategyWeights::default(), 10)
            .iter()
            .map(|s| s.movie_id)
            .collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }

    #[test]
    fn test_negative_weight_rejected() {
        let weights = StrategyWeights {
            content: -0.1,
            ..Default::default()
        };
        assert!(weights.validate().is_err());
        assert!(StrategyWeights::default().validate().is_ok());
    }
}
