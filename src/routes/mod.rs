use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    cache::ResultCache,
    db::CatalogStore,
    middleware::{make_span_with_request_id, request_id_middleware},
    services::{CatalogService, InteractionService, RecommendationService, RecommenderSettings},
};

pub mod movies;
pub mod ratings;
pub mod recommendations;

/// Shared application state
pub struct AppState {
    pub catalog: CatalogService,
    pub interactions: InteractionService,
    pub recommendations: RecommendationService,
}

impl AppState {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        cache: ResultCache,
        settings: RecommenderSettings,
    ) -> Self {
        Self {
            catalog: CatalogService::new(store.clone(), cache.clone()),
            interactions: InteractionService::new(store.clone(), cache.clone()),
            recommendations: RecommendationService::new(store, cache, settings),
        }
    }
}

/// Creates the application router with all routes
///
/// Layers run top to bottom: the request id is assigned before the trace span
/// that records it is opened.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(CorsLayer::permissive())
                .layer(axum::middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id)),
        )
        .with_state(state)
}

/// API routes under /api/v1
fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/movies", get(movies::list))
        .route("/movies/popular", get(movies::popular))
        .route("/movies/trending", get(movies::trending))
        .route("/movies/:id", get(movies::detail))
        .route("/movies/:id/similar", get(movies::similar))
        .route("/movies/:id/stats", get(movies::stats))
        .route("/genres", get(movies::genres))
        .route(
            "/ratings/movies/:id/rate",
            post(ratings::rate).delete(ratings::unrate),
        )
        .route("/ratings/movies/:id/favorite", post(ratings::favorite))
        .route(
            "/ratings/movies/:id/watch",
            post(ratings::watch).delete(ratings::unwatch),
        )
        .route("/ratings/my-ratings", get(ratings::my_ratings))
        .route("/ratings/my-favorites", get(ratings::my_favorites))
        .route("/ratings/my-watchlist", get(ratings::my_watchlist))
        .route("/ratings/my-stats", get(ratings::my_stats))
        .route("/recommendations", get(recommendations::recommend))
}

/// Store connectivity and catalog size; 503 when the store is unreachable
async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    match state.catalog.health().await {
        Ok(counts) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "database": "connected",
                "counts": counts,
            })),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "database": "disconnected",
                })),
            )
        }
    }
}
