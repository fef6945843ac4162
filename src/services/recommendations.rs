use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;

use crate::{
    cache::{CacheKey, ResultCache},
    cached,
    db::{CatalogStore, MovieQuery},
    error::{AppError, AppResult},
    models::{
        Algorithm, Movie, MovieId, MovieOrder, MovieSummary, Recommendation,
        RecommendationParams, RecommendationResult, ScoredMovie, Strategy, UserId,
    },
    services::{
        history::{InteractionHistoryReader, UserHistory},
        hybrid::{self, StrategyWeights},
        strategies::{content, Neighbour, StrategyInput},
    },
};

pub const MAX_SIMILAR_MOVIES: usize = 30;

/// How long each algorithm's results stay cached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    pub popularity: Duration,
    pub genre: Duration,
    pub collaborative: Duration,
    pub content: Duration,
    pub hybrid: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            popularity: Duration::from_secs(900),
            genre: Duration::from_secs(600),
            collaborative: Duration::from_secs(300),
            content: Duration::from_secs(900),
            hybrid: Duration::from_secs(300),
        }
    }
}

impl CacheTtls {
    pub fn for_algorithm(&self, algorithm: Algorithm) -> Duration {
        match algorithm {
            Algorithm::Popularity => self.popularity,
            Algorithm::Genre => self.genre,
            Algorithm::Collaborative => self.collaborative,
            Algorithm::Content => self.content,
            Algorithm::Hybrid => self.hybrid,
        }
    }
}

/// Tuning knobs of the recommendation pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct RecommenderSettings {
    pub strategy_timeout: Duration,
    /// Upper bound on movies scored per request
    pub candidate_pool_size: usize,
    pub neighbours: usize,
    pub min_overlap: usize,
    pub weights: StrategyWeights,
    pub ttls: CacheTtls,
}

impl Default for RecommenderSettings {
    fn default() -> Self {
        Self {
            strategy_timeout: Duration::from_millis(2000),
            candidate_pool_size: 500,
            neighbours: 20,
            min_overlap: 1,
            weights: StrategyWeights::default(),
            ttls: CacheTtls::default(),
        }
    }
}

/// Ranked recommendations and whether they came from the cache
#[derive(Debug, Clone, PartialEq)]
pub struct RecommendationOutcome {
    pub entries: Vec<Recommendation>,
    pub cache_hit: bool,
}

type StrategyTask = JoinHandle<AppResult<Vec<ScoredMovie>>>;

/// Produces personalized rankings
///
/// Strategies run as separate tasks against a shared candidate pool and are
/// merged by the hybrid combiner. Results are cached per user, algorithm and
/// request parameters.
#[derive(Clone)]
pub struct RecommendationService {
    store: Arc<dyn CatalogStore>,
    cache: ResultCache,
    history: InteractionHistoryReader,
    settings: RecommenderSettings,
}

impl RecommendationService {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        cache: ResultCache,
        settings: RecommenderSettings,
    ) -> Self {
        Self {
            history: InteractionHistoryReader::new(store.clone()),
            store,
            cache,
            settings,
        }
    }

    pub fn settings(&self) -> &RecommenderSettings {
        &self.settings
    }

    pub async fn recommend(
        &self,
        user_id: UserId,
        params: &RecommendationParams,
    ) -> AppResult<RecommendationOutcome> {
        params.validate()?;
        let algorithm = params.algorithm;

        // Fixed before any input is read; an invalidation while this request
        // runs moves the user to a key this result is never stored under.
        let cache_key = self
            .cache
            .recommendation_key(user_id, algorithm, params)
            .await;
        if let Some(key) = &cache_key {
            if let Some(cached) = self.cache.get(key).await {
                tracing::debug!(user_id, %algorithm, "Serving cached recommendations");
                return Ok(RecommendationOutcome {
                    entries: cached.entries,
                    cache_hit: true,
                });
            }
        }

        let history = Arc::new(self.history.load(user_id).await?);
        let candidates = Arc::new(self.candidates(&history, params).await?);

        let tasks = algorithm
            .strategies()
            .iter()
            .map(|&strategy| (strategy, self.spawn_strategy(strategy, &history, &candidates)))
            .collect();
        let outputs = gather(tasks, self.settings.strategy_timeout).await?;

        let ranked = match algorithm {
            Algorithm::Hybrid => hybrid::combine(&outputs, &self.settings.weights, params.limit),
            _ => {
                let mut scored: Vec<ScoredMovie> = outputs
                    .into_iter()
                    .flat_map(|(_, scored)| scored)
                    .collect();
                scored.truncate(params.limit);
                scored
            }
        };

        let entries = hydrate(ranked, &candidates, algorithm);
        let ttl = self.settings.ttls.for_algorithm(algorithm);
        let generated_at = Utc::now();
        let result = RecommendationResult {
            entries,
            generated_at,
            expires_at: generated_at
                + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::zero()),
        };
        if let Some(key) = &cache_key {
            self.cache.put(key, &result, ttl).await;
        }

        tracing::info!(
            user_id,
            %algorithm,
            candidates = candidates.len(),
            returned = result.entries.len(),
            "Generated recommendations"
        );

        Ok(RecommendationOutcome {
            entries: result.entries,
            cache_hit: false,
        })
    }

    /// Movies sharing the most genres and tags with `movie_id`
    pub async fn similar_movies(
        &self,
        movie_id: MovieId,
        limit: usize,
    ) -> AppResult<Vec<Recommendation>> {
        if limit == 0 || limit > MAX_SIMILAR_MOVIES {
            return Err(AppError::validation(
                "limit",
                format!("Limit must be between 1 and {}.", MAX_SIMILAR_MOVIES),
            ));
        }

        let reference = self
            .store
            .get_movie(movie_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Movie {} does not exist", movie_id)))?;

        let key = CacheKey::SimilarMovies { movie_id, limit };
        cached!(self.cache, key, self.settings.ttls.content, async {
            let query = MovieQuery {
                exclude: vec![movie_id],
                order: MovieOrder::Popularity,
                limit: self.settings.candidate_pool_size,
                ..Default::default()
            };
            let candidates = self.store.find_movies(&query).await?;
            let mut scored = content::score(&reference, &candidates);
            scored.truncate(limit);
            AppResult::Ok(hydrate(scored, &candidates, Algorithm::Content))
        })
    }

    /// Catalog slice every strategy scores
    async fn candidates(
        &self,
        history: &UserHistory,
        params: &RecommendationParams,
    ) -> AppResult<Vec<Movie>> {
        let mut exclude: BTreeSet<MovieId> = BTreeSet::new();
        if params.exclude_rated {
            exclude.extend(history.rated_ids());
            exclude.extend(history.favorited_ids());
        }
        if params.exclude_watched {
            exclude.extend(history.watched_ids());
        }

        let query = MovieQuery {
            min_external_rating: (params.min_rating > 0.0).then_some(params.min_rating),
            exclude: exclude.into_iter().collect(),
            order: MovieOrder::Popularity,
            limit: self.settings.candidate_pool_size,
            ..Default::default()
        };
        self.store.find_movies(&query).await
    }

    fn spawn_strategy(
        &self,
        strategy: Strategy,
        history: &Arc<UserHistory>,
        candidates: &Arc<Vec<Movie>>,
    ) -> StrategyTask {
        let store = self.store.clone();
        let history = history.clone();
        let candidates = candidates.clone();
        let (k, min_overlap) = (self.settings.neighbours, self.settings.min_overlap);

        tokio::spawn(async move {
            let neighbours = if strategy.needs_neighbours() {
                load_neighbours(store.as_ref(), &history, k, min_overlap).await?
            } else {
                Vec::new()
            };

            let input = StrategyInput {
                history: &history,
                candidates: &candidates,
                neighbours: &neighbours,
            };
            Ok(strategy.score(&input))
        })
    }
}

/// Similar users with their rating vectors; empty when the user rated nothing
async fn load_neighbours(
    store: &dyn CatalogStore,
    history: &UserHistory,
    k: usize,
    min_overlap: usize,
) -> AppResult<Vec<Neighbour>> {
    if history.ratings.is_empty() || k == 0 {
        return Ok(Vec::new());
    }

    let similar = store
        .find_similar_users(history.user_id, k, min_overlap)
        .await?;
    if similar.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<UserId> = similar.iter().map(|s| s.user_id).collect();
    let mut vectors: HashMap<UserId, HashMap<MovieId, f64>> = HashMap::new();
    for rating in store.find_ratings_by_users(&ids).await? {
        vectors
            .entry(rating.user_id)
            .or_default()
            .insert(rating.movie_id, rating.score);
    }

    Ok(similar
        .into_iter()
        .map(|s| Neighbour {
            ratings: vectors.remove(&s.user_id).unwrap_or_default(),
            user_id: s.user_id,
            similarity: s.similarity,
        })
        .collect())
}

/// Joins strategy tasks against one shared deadline
///
/// A strategy that misses the deadline is aborted and abstains. The request
/// only fails when every strategy failed; a store outage wins over other
/// errors.
pub(crate) async fn gather(
    tasks: Vec<(Strategy, StrategyTask)>,
    timeout: Duration,
) -> AppResult<Vec<(Strategy, Vec<ScoredMovie>)>> {
    let deadline = tokio::time::Instant::now() + timeout;
    let total = tasks.len();
    let mut outputs = Vec::with_capacity(total);
    let mut failures = Vec::new();

    for (strategy, mut handle) in tasks {
        match tokio::time::timeout_at(deadline, &mut handle).await {
            Ok(Ok(Ok(scored))) => outputs.push((strategy, scored)),
            Ok(Ok(Err(e))) => {
                tracing::warn!(%strategy, error = %e, "Strategy failed");
                failures.push(e);
            }
            Ok(Err(e)) => {
                tracing::error!(%strategy, error = %e, "Strategy task panicked");
                failures.push(AppError::Internal(format!("Strategy {} aborted", strategy)));
            }
            Err(_) => {
                handle.abort();
                let e = AppError::StrategyTimeout(strategy);
                tracing::warn!(error = %e, "Strategy abstained");
                outputs.push((strategy, Vec::new()));
            }
        }
    }

    if total > 0 && failures.len() == total {
        let index = failures
            .iter()
            .position(|e| matches!(e, AppError::StoreUnavailable(_)))
            .unwrap_or(0);
        return Err(failures.swap_remove(index));
    }

    Ok(outputs)
}

/// Attaches movie summaries, keeping the ranking order
fn hydrate(
    ranked: Vec<ScoredMovie>,
    movies: &[Movie],
    algorithm: Algorithm,
) -> Vec<Recommendation> {
    let by_id: HashMap<MovieId, &Movie> = movies.iter().map(|m| (m.id, m)).collect();

    ranked
        .into_iter()
        .filter_map(|scored| {
            by_id.get(&scored.movie_id).map(|movie| Recommendation {
                movie: MovieSummary::from(*movie),
                score: scored.score,
                reason: scored.reason,
                algorithm,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheBackend;
    use crate::db::{MemoryCatalogStore, MockCatalogStore};
    use crate::models::{NewRating, Rating, RatingScore};
    use crate::services::interactions::InteractionService;
    use crate::test_support::movie;

    async fn catalog() -> MemoryCatalogStore {
        let store = MemoryCatalogStore::new();
        for user in [1, 2, 3] {
            store.insert_user(user).await;
        }
        store.insert_movie(movie(1, 90.0, &["Action"], &["heist"])).await;
        store.insert_movie(movie(2, 70.0, &["Drama"], &[])).await;
        store.insert_movie(movie(3, 50.0, &["Action"], &["heist"])).await;
        store.insert_movie(movie(4, 30.0, &["Comedy"], &[])).await;
        store
    }

    async fn rate(store: &MemoryCatalogStore, user_id: UserId, movie_id: MovieId, score: f64) {
        store
            .upsert_rating(&NewRating {
                user_id,
                movie_id,
                score: RatingScore::new(score).unwrap(),
                review: None,
            })
            .await
            .unwrap();
    }

    fn service(store: impl CatalogStore + 'static) -> RecommendationService {
        let (cache, _handle) = ResultCache::new(Arc::new(MemoryCacheBackend::new()));
        RecommendationService::new(Arc::new(store), cache, RecommenderSettings::default())
    }

    fn params(algorithm: Algorithm) -> RecommendationParams {
        RecommendationParams {
            algorithm,
            ..Default::default()
        }
    }

    fn ids(entries: &[Recommendation]) -> Vec<MovieId> {
        entries.iter().map(|r| r.movie.id).collect()
    }

    #[tokio::test]
    async fn test_new_user_gets_popular_movies() {
        let service = service(catalog().await);

        let popular = service.recommend(1, &params(Algorithm::Popularity)).await.unwrap();
        assert_eq!(ids(&popular.entries), vec![1, 2, 3, 4]);
        assert!(!popular.cache_hit);

        for algorithm in [Algorithm::Genre, Algorithm::Collaborative, Algorithm::Content] {
            let outcome = service.recommend(1, &params(algorithm)).await.unwrap();
            assert!(outcome.entries.is_empty(), "{algorithm} should abstain");
        }

        let hybrid = service.recommend(1, &params(Algorithm::Hybrid)).await.unwrap();
        assert_eq!(ids(&hybrid.entries), vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_second_request_is_a_cache_hit() {
        let service = service(catalog().await);
        let params = params(Algorithm::Hybrid);

        let first = service.recommend(1, &params).await.unwrap();
        let second = service.recommend(1, &params).await.unwrap();
        assert!(!first.cache_hit);
        assert!(second.cache_hit);
        assert_eq!(first.entries, second.entries);
    }

    // One worker stays parked inside the store while the rating goes through.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_rating_during_computation_is_not_served_from_cache() {
        let (entered_tx, entered_rx) = std::sync::mpsc::channel::<()>();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

        let mut store = MockCatalogStore::new();
        store.expect_user_exists().returning(|_| Ok(true));
        store.expect_find_ratings_by_user().returning(|_| Ok(vec![]));
        store.expect_find_favorites_by_user().returning(|_| Ok(vec![]));
        store.expect_find_watch_history_by_user().returning(|_| Ok(vec![]));
        store.expect_find_movies_by_ids().returning(|_| Ok(vec![]));
        store
            .expect_get_movie()
            .returning(|id| Ok(Some(movie(id, 90.0, &["Action"], &[]))));
        store.expect_upsert_rating().returning(|rating| {
            Ok(Rating {
                user_id: rating.user_id,
                movie_id: rating.movie_id,
                score: rating.score.value(),
                review: None,
                rated_at: Utc::now(),
                updated_at: Utc::now(),
            })
        });
        store.expect_find_movies().times(1).returning(move |_| {
            let _ = entered_tx.send(());
            let _ = release_rx.recv();
            Ok(vec![movie(1, 90.0, &["Action"], &[])])
        });
        let store: Arc<dyn CatalogStore> = Arc::new(store);

        let (cache, _handle) = ResultCache::new(Arc::new(MemoryCacheBackend::new()));
        let service = RecommendationService::new(
            store.clone(),
            cache.clone(),
            RecommenderSettings::default(),
        );
        let interactions = InteractionService::new(store, cache.clone());
        let params = params(Algorithm::Popularity);

        let running = tokio::spawn({
            let service = service.clone();
            let params = params.clone();
            async move { service.recommend(1, &params).await }
        });
        tokio::task::spawn_blocking(move || entered_rx.recv())
            .await
            .unwrap()
            .unwrap();

        interactions.rate(1, 1, 5.0, None).await.unwrap();
        release_tx.send(()).unwrap();

        let computed = running.await.unwrap().unwrap();
        assert_eq!(ids(&computed.entries), vec![1]);

        let key = cache
            .recommendation_key(1, Algorithm::Popularity, &params)
            .await
            .unwrap();
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_rated_movies_are_excluded_by_default() {
        let store = catalog().await;
        rate(&store, 1, 1, 5.0).await;
        let service = service(store);

        let genre = service.recommend(1, &params(Algorithm::Genre)).await.unwrap();
        assert_eq!(ids(&genre.entries), vec![3]);
        assert_eq!(genre.entries[0].algorithm, Algorithm::Genre);

        let content = service.recommend(1, &params(Algorithm::Content)).await.unwrap();
        assert_eq!(ids(&content.entries), vec![3]);
        assert!((content.entries[0].score - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_favorited_movies_are_excluded_with_rated_ones() {
        let store = catalog().await;
        store.toggle_favorite(1, 1).await.unwrap();
        let service = service(store);

        let genre = service.recommend(1, &params(Algorithm::Genre)).await.unwrap();
        assert_eq!(ids(&genre.entries), vec![3]);

        let keep = RecommendationParams {
            exclude_rated: false,
            ..params(Algorithm::Genre)
        };
        let genre = service.recommend(1, &keep).await.unwrap();
        assert_eq!(ids(&genre.entries), vec![1, 3]);
    }

    #[tokio::test]
    async fn test_collaborative_uses_similar_users() {
        let store = catalog().await;
        rate(&store, 1, 1, 5.0).await;
        rate(&store, 2, 1, 5.0).await;
        rate(&store, 2, 4, 4.0).await;
        let service = service(store);

        let outcome = service
            .recommend(1, &params(Algorithm::Collaborative))
            .await
            .unwrap();
        assert_eq!(ids(&outcome.entries), vec![4]);
        assert!((outcome.entries[0].score - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_limit_applies_after_merge() {
        let store = catalog().await;
        rate(&store, 1, 2, 5.0).await;
        let service = service(store);

        let outcome = service
            .recommend(
                1,
                &RecommendationParams {
                    limit: 2,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome.entries.len(), 2);
        assert!(outcome.entries[0].score >= outcome.entries[1].score);
    }

    #[tokio::test]
    async fn test_min_rating_filters_candidates() {
        let store = catalog().await;
        let mut rated = movie(5, 1.0, &["Drama"], &[]);
        rated.external_rating = Some(8.5);
        store.insert_movie(rated).await;
        let service = service(store);

        let outcome = service
            .recommend(
                1,
                &RecommendationParams {
                    algorithm: Algorithm::Popularity,
                    min_rating: 8.0,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(ids(&outcome.entries), vec![5]);
    }

    #[tokio::test]
    async fn test_invalid_params_are_rejected() {
        let service = service(catalog().await);
        let result = service
            .recommend(
                1,
                &RecommendationParams {
                    limit: 0,
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(AppError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_unknown_user_is_not_found() {
        let service = service(catalog().await);
        let result = service.recommend(99, &params(Algorithm::Hybrid)).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_store_outage_surfaces() {
        let mut store = MockCatalogStore::new();
        store.expect_user_exists().returning(|_| Ok(true));
        store.expect_find_ratings_by_user().returning(|_| Ok(vec![]));
        store.expect_find_favorites_by_user().returning(|_| Ok(vec![]));
        store.expect_find_watch_history_by_user().returning(|_| Ok(vec![]));
        store.expect_find_movies_by_ids().returning(|_| Ok(vec![]));
        store
            .expect_find_movies()
            .returning(|_| Err(AppError::StoreUnavailable(sqlx::Error::PoolTimedOut)));

        let result = service(store).recommend(1, &params(Algorithm::Hybrid)).await;
        assert!(matches!(result, Err(AppError::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn test_similar_movies() {
        let service = service(catalog().await);

        let similar = service.similar_movies(1, 10).await.unwrap();
        assert_eq!(ids(&similar), vec![3]);
        assert!(matches!(
            service.similar_movies(99, 10).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            service.similar_movies(1, 31).await,
            Err(AppError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_slow_strategy_abstains() {
        let fast: StrategyTask = tokio::spawn(async {
            Ok(vec![ScoredMovie {
                movie_id: 1,
                score: 1.0,
                popularity: 1.0,
                reason: String::new(),
            }])
        });
        let slow: StrategyTask = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Vec::new())
        });

        let outputs = gather(
            vec![(Strategy::Popularity, fast), (Strategy::Genre, slow)],
            Duration::from_millis(50),
        )
        .await
        .unwrap();

        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0].1.len(), 1);
        assert_eq!(outputs[1], (Strategy::Genre, Vec::new()));
    }

    #[tokio::test]
    async fn test_partial_failure_is_tolerated() {
        let ok: StrategyTask = tokio::spawn(async { Ok(Vec::new()) });
        let failing: StrategyTask = tokio::spawn(async {
            Err(AppError::StoreUnavailable(sqlx::Error::PoolTimedOut))
        });

        let outputs = gather(
            vec![(Strategy::Popularity, ok), (Strategy::Collaborative, failing)],
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        assert_eq!(outputs.len(), 1);
    }

    #[tokio::test]
    async fn test_total_failure_prefers_store_outage() {
        let internal: StrategyTask =
            tokio::spawn(async { Err(AppError::Internal("boom".into())) });
        let outage: StrategyTask = tokio::spawn(async {
            Err(AppError::StoreUnavailable(sqlx::Error::PoolTimedOut))
        });

        let result = gather(
            vec![(Strategy::Genre, internal), (Strategy::Collaborative, outage)],
            Duration::from_secs(1),
        )
        .await;
        assert!(matches!(result, Err(AppError::StoreUnavailable(_))));
    }
}
