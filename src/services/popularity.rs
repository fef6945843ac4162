use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::{db::CatalogStore, error::AppResult, models::MovieId};

/// Recomputes every movie's popularity from current activity
///
/// Returns the number of movies updated.
pub async fn refresh_popularity(store: &dyn CatalogStore) -> AppResult<usize> {
    let scores: Vec<(MovieId, f64)> = store
        .movie_activity()
        .await?
        .iter()
        .map(|activity| (activity.movie_id, activity.popularity()))
        .collect();

    store.update_popularity(&scores).await?;
    Ok(scores.len())
}

/// Runs [`refresh_popularity`] on a fixed interval until the task is aborted
///
/// The first refresh happens immediately. Failures are logged and retried on
/// the next tick.
pub fn spawn_popularity_refresher(store: Arc<dyn CatalogStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            match refresh_popularity(store.as_ref()).await {
                Ok(updated) => tracing::info!(updated, "Popularity scores refreshed"),
                Err(e) => tracing::warn!(error = %e, "Popularity refresh failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryCatalogStore, MockCatalogStore};
    use crate::error::AppError;
    use crate::models::{NewRating, NewWatch, RatingScore};
    use crate::test_support::movie;

    #[tokio::test]
    async fn test_refresh_applies_formula() {
        let store = MemoryCatalogStore::new();
        store.insert_user(1).await;
        store.insert_movie(movie(1, 0.0, &[], &[])).await;
        store.insert_movie(movie(2, 55.0, &[], &[])).await;
        store
            .upsert_rating(&NewRating {
                user_id: 1,
                movie_id: 1,
                score: RatingScore::new(4.0).unwrap(),
                review: None,
            })
            .await
            .unwrap();
        store.toggle_favorite(1, 1).await.unwrap();
        store
            .upsert_watch(&NewWatch::new(1, 1, None, true).unwrap())
            .await
            .unwrap();

        assert_eq!(refresh_popularity(&store).await.unwrap(), 2);

        // 4 * ln(2) * 10 + 2 * 1 + 1
        let refreshed = store.get_movie(1).await.unwrap().unwrap();
        assert_eq!(refreshed.popularity, 30.73);
        let idle = store.get_movie(2).await.unwrap().unwrap();
        assert_eq!(idle.popularity, 0.0);
    }

    #[tokio::test]
    async fn test_refresh_propagates_store_errors() {
        let mut store = MockCatalogStore::new();
        store
            .expect_movie_activity()
            .returning(|| Err(AppError::StoreUnavailable(sqlx::Error::PoolTimedOut)));
        store.expect_update_popularity().never();

        assert!(refresh_popularity(&store).await.is_err());
    }

    #[tokio::test]
    async fn test_refresher_runs_immediately() {
        let store = MemoryCatalogStore::new();
        store.insert_movie(movie(1, 12.0, &[], &[])).await;

        let handle = spawn_popularity_refresher(Arc::new(store.clone()), Duration::from_secs(3600));
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();

        assert_eq!(store.get_movie(1).await.unwrap().unwrap().popularity, 0.0);
    }
}
