use axum::{
    extract::State,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::{
    error::AppResult,
    middleware::{ValidatedPath, ValidatedQuery},
    models::{
        Genre, Movie, MovieId, MovieRatingStats, MovieSummary, Recommendation, TrendingPeriod,
    },
    routes::AppState,
    services::catalog::MovieListParams,
};

fn default_limit() -> usize {
    10
}

#[derive(Debug, Deserialize)]
pub struct PopularQuery {
    #[serde(default = "default_limit")]
    limit: usize,
    min_rating: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct TrendingQuery {
    #[serde(default)]
    period: TrendingPeriod,
    #[serde(default = "default_limit")]
    limit: usize,
}

#[derive(Debug, Deserialize)]
pub struct SimilarQuery {
    #[serde(default = "default_limit")]
    limit: usize,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    ValidatedQuery(params): ValidatedQuery<MovieListParams>,
) -> AppResult<Json<Vec<MovieSummary>>> {
    Ok(Json(state.catalog.list_movies(&params).await?))
}

pub async fn popular(
    State(state): State<Arc<AppState>>,
    ValidatedQuery(query): ValidatedQuery<PopularQuery>,
) -> AppResult<Json<Vec<MovieSummary>>> {
    Ok(Json(state.catalog.popular(query.limit, query.min_rating).await?))
}

pub async fn trending(
    State(state): State<Arc<AppState>>,
    ValidatedQuery(query): ValidatedQuery<TrendingQuery>,
) -> AppResult<Json<Vec<MovieSummary>>> {
    Ok(Json(state.catalog.trending(query.period, query.limit).await?))
}

pub async fn detail(
    State(state): State<Arc<AppState>>,
    ValidatedPath(movie_id): ValidatedPath<MovieId>,
) -> AppResult<Json<Movie>> {
    Ok(Json(state.catalog.get_movie(movie_id).await?))
}

pub async fn similar(
    State(state): State<Arc<AppState>>,
    ValidatedPath(movie_id): ValidatedPath<MovieId>,
    ValidatedQuery(query): ValidatedQuery<SimilarQuery>,
) -> AppResult<Json<Vec<Recommendation>>> {
    let similar = state
        .recommendations
        .similar_movies(movie_id, query.limit)
        .await?;
    Ok(Json(similar))
}

pub async fn stats(
    State(state): State<Arc<AppState>>,
    ValidatedPath(movie_id): ValidatedPath<MovieId>,
) -> AppResult<Json<MovieRatingStats>> {
    Ok(Json(state.catalog.movie_stats(movie_id).await?))
}

pub async fn genres(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<Genre>>> {
    Ok(Json(state.catalog.list_genres().await?))
}
