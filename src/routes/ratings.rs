use axum::{
    extract::State,
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::{
    error::AppResult,
    middleware::{AuthUser, OptionalJson, RequestId, ValidatedJson, ValidatedPath},
    models::{Favorite, MovieId, Rating, UserStats, WatchHistory},
    routes::AppState,
};

#[derive(Debug, Deserialize)]
pub struct RateRequest {
    pub score: f64,
    pub review: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WatchRequest {
    pub progress_minutes: Option<i32>,
    #[serde(default)]
    pub completed: bool,
}

pub async fn rate(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    user: AuthUser,
    ValidatedPath(movie_id): ValidatedPath<MovieId>,
    ValidatedJson(request): ValidatedJson<RateRequest>,
) -> AppResult<Json<Rating>> {
    tracing::info!(
        request_id = %request_id,
        user_id = user.id(),
        movie_id,
        "Rating movie"
    );
    let rating = state
        .interactions
        .rate(user.id(), movie_id, request.score, request.review)
        .await?;
    Ok(Json(rating))
}

pub async fn unrate(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ValidatedPath(movie_id): ValidatedPath<MovieId>,
) -> AppResult<StatusCode> {
    state.interactions.delete_rating(user.id(), movie_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn favorite(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ValidatedPath(movie_id): ValidatedPath<MovieId>,
) -> AppResult<Json<Value>> {
    let favorited = state
        .interactions
        .toggle_favorite(user.id(), movie_id)
        .await?;
    Ok(Json(json!({ "favorited": favorited })))
}

pub async fn watch(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ValidatedPath(movie_id): ValidatedPath<MovieId>,
    OptionalJson(request): OptionalJson<WatchRequest>,
) -> AppResult<Json<WatchHistory>> {
    let request = request.unwrap_or_default();
    let watch = state
        .interactions
        .record_watch(user.id(), movie_id, request.progress_minutes, request.completed)
        .await?;
    Ok(Json(watch))
}

pub async fn unwatch(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ValidatedPath(movie_id): ValidatedPath<MovieId>,
) -> AppResult<StatusCode> {
    state.interactions.delete_watch(user.id(), movie_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn my_ratings(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> AppResult<Json<Vec<Rating>>> {
    Ok(Json(state.interactions.ratings(user.id()).await?))
}

pub async fn my_favorites(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> AppResult<Json<Vec<Favorite>>> {
    Ok(Json(state.interactions.favorites(user.id()).await?))
}

pub async fn my_watchlist(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> AppResult<Json<Vec<WatchHistory>>> {
    Ok(Json(state.interactions.watchlist(user.id()).await?))
}

pub async fn my_stats(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> AppResult<Json<UserStats>> {
    Ok(Json(state.catalog.user_stats(user.id()).await?))
}
