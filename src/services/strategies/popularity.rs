use std::cmp::Ordering;

use crate::models::{Movie, ScoredMovie};

/// Popularity descending, external rating descending, newest first, id ascending
pub fn compare(a: &Movie, b: &Movie) -> Ordering {
    let rating = |m: &Movie| m.external_rating.unwrap_or(f64::NEG_INFINITY);

    b.popularity
        .total_cmp(&a.popularity)
        .then_with(|| rating(b).total_cmp(&rating(a)))
        .then_with(|| b.release_date.cmp(&a.release_date))
        .then_with(|| a.id.cmp(&b.id))
}

/// Ranks every candidate by catalog popularity
///
/// Scores are relative to the most popular candidate. Works for users with no
/// history at all.
pub fn score(candidates: &[Movie]) -> Vec<ScoredMovie> {
    let max = candidates
        .iter()
        .map(|m| m.popularity)
        .fold(0.0_f64, f64::max);

    let mut ranked: Vec<&Movie> = candidates.iter().collect();
    ranked.sort_by(|a, b| compare(a, b));

    ranked
        .into_iter()
        .map(|movie| ScoredMovie {
            movie_id: movie.id,
            score: if max > 0.0 {
                (movie.popularity / max).clamp(0.0, 1.0)
            } else {
                0.0
            },
            popularity: movie.popularity,
            reason: match movie.external_rating {
                Some(rating) => format!("Popular with viewers, rated {:.1}/10", rating),
                None => "Popular with viewers".to_string(),
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::movie;
    use chrono::NaiveDate;

    #[test]
    fn test_orders_by_popularity() {
        let candidates = vec![
            movie(1, 10.0, &[], &[]),
            movie(2, 50.0, &[], &[]),
            movie(3, 25.0, &[], &[]),
        ];
        let scored = score(&candidates);

        let ids: Vec<i64> = scored.iter().map(|s| s.movie_id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
        assert_eq!(scored[0].score, 1.0);
        assert_eq!(scored[1].score, 0.5);
    }

    #[test]
    fn test_ties_fall_back_to_rating_then_release_date_then_id() {
        let mut rated = movie(4, 10.0, &[], &[]);
        rated.external_rating = Some(8.0);
        let mut newer = movie(3, 10.0, &[], &[]);
        newer.release_date = NaiveDate::from_ymd_opt(2023, 5, 1).unwrap();
        let candidates = vec![movie(2, 10.0, &[], &[]), newer, rated, movie(1, 10.0, &[], &[])];

        let ids: Vec<i64> = score(&candidates).iter().map(|s| s.movie_id).collect();
        assert_eq!(ids, vec![4, 3, 1, 2]);
    }

    #[test]
    fn test_zero_popularity_scores_zero() {
        let scored = score(&[movie(1, 0.0, &[], &[])]);
        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].score, 0.0);
    }

    #[test]
    fn test_empty_pool() {
        assert!(score(&[]).is_empty());
    }
}
