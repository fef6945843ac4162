use std::collections::HashSet;

use super::rank;
use crate::models::{Movie, MovieId, ScoredMovie};

pub const GENRE_WEIGHT: f64 = 0.6;
pub const TAG_WEIGHT: f64 = 0.4;

fn jaccard<'a>(a: impl Iterator<Item = &'a str>, b: impl Iterator<Item = &'a str>) -> f64 {
    let a: HashSet<&str> = a.collect();
    let b: HashSet<&str> = b.collect();
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}

/// Weighted Jaccard overlap of genres and tags, in `[0, 1]`
pub fn similarity(reference: &Movie, candidate: &Movie) -> f64 {
    let genres = jaccard(
        reference.genres.iter().map(|g| g.name.as_str()),
        candidate.genres.iter().map(|g| g.name.as_str()),
    );
    let tags = jaccard(
        reference.tags.iter().map(|t| t.name.as_str()),
        candidate.tags.iter().map(|t| t.name.as_str()),
    );
    GENRE_WEIGHT * genres + TAG_WEIGHT * tags
}

/// Movies most similar to a single reference movie
pub fn score(reference: &Movie, candidates: &[Movie]) -> Vec<ScoredMovie> {
    score_against(&[reference], candidates)
}

/// Scores each candidate by its best similarity to any reference
///
/// References themselves and candidates with no overlap are left out. Ties
/// between references go to the first one given.
pub fn score_against(references: &[&Movie], candidates: &[Movie]) -> Vec<ScoredMovie> {
    if references.is_empty() {
        return Vec::new();
    }
    let reference_ids: HashSet<MovieId> = references.iter().map(|m| m.id).collect();

    let mut scored: Vec<ScoredMovie> = candidates
        .iter()
        .filter(|movie| !reference_ids.contains(&movie.id))
        .filter_map(|movie| {
            let (best, closest) = references
                .iter()
                .map(|reference| (similarity(reference, movie), *reference))
                .fold((0.0_f64, None::<&Movie>), |(best, closest), (sim, reference)| {
                    if sim > best {
                        (sim, Some(reference))
                    } else {
                        (best, closest)
                    }
                });

            closest.map(|reference| ScoredMovie {
                movie_id: movie.id,
                score: best.clamp(0.0, 1.0),
                popularity: movie.popularity,
                reason: format!("Because you liked {}", reference.title),
            })
        })
        .collect();

    rank(&mut scored);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::movie;

    #[test]
    fn test_identical_labels_score_one() {
        let a = movie(1, 1.0, &["Action"], &["heist"]);
        let b = movie(2, 1.0, &["Action"], &["heist"]);
        assert!((similarity(&a, &b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_genre_and_tag_weights() {
        let reference = movie(1, 1.0, &["Action", "Drama"], &["heist"]);
        let candidate = movie(2, 1.0, &["Action"], &["space"]);
        // genres 1/2, tags 0/2
        assert!((similarity(&reference, &candidate) - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_excludes_reference_and_unrelated() {
        let reference = movie(1, 1.0, &["Action"], &[]);
        let candidates = vec![
            movie(1, 1.0, &["Action"], &[]),
            movie(2, 1.0, &["Comedy"], &[]),
            movie(3, 1.0, &["Action"], &[]),
        ];

        let scored = score(&reference, &candidates);
        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].movie_id, 3);
        assert_eq!(scored[0].reason, "Because you liked Movie 1");
    }

    #[test]
    fn test_best_reference_wins() {
        let action = movie(1, 1.0, &["Action"], &[]);
        let drama = movie(2, 1.0, &["Drama"], &["slow"]);
        let candidates = vec![movie(3, 1.0, &["Drama"], &["slow"])];

        let scored = score_against(&[&action, &drama], &candidates);
        assert_eq!(scored.len(), 1);
        assert!((scored[0].score - 1.0).abs() < 1e-9);
        assert_eq!(scored[0].reason, "Because you liked Movie 2");
    }

    #[test]
    fn test_no_references_abstains() {
        assert!(score_against(&[], &[movie(1, 1.0, &["Action"], &[])]).is_empty());
    }
}
