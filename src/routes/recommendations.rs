use axum::{
    extract::State,
    http::{HeaderName, HeaderValue},
    Extension, Json,
};
use std::sync::Arc;

use crate::{
    error::AppResult,
    middleware::{AuthUser, RequestId, ValidatedQuery},
    models::{Recommendation, RecommendationParams},
    routes::AppState,
};

pub const CACHE_STATUS_HEADER: HeaderName = HeaderName::from_static("x-cache");

/// Handler for recommendations endpoint
///
/// The `x-cache` response header reports whether the ranking was served from
/// the result cache.
pub async fn recommend(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    user: AuthUser,
    ValidatedQuery(params): ValidatedQuery<RecommendationParams>,
) -> AppResult<([(HeaderName, HeaderValue); 1], Json<Vec<Recommendation>>)> {
    tracing::info!(
        request_id = %request_id,
        user_id = user.id(),
        algorithm = %params.algorithm,
        limit = params.limit,
        "Processing recommendation request"
    );

    let outcome = state.recommendations.recommend(user.id(), &params).await?;
    let status = HeaderValue::from_static(if outcome.cache_hit { "hit" } else { "miss" });

    tracing::info!(
        request_id = %request_id,
        cache_hit = outcome.cache_hit,
        returned = outcome.entries.len(),
        "Recommendations served"
    );

    Ok(([(CACHE_STATUS_HEADER, status)], Json(outcome.entries)))
}
