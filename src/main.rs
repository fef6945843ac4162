use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cinerec_api::{
    cache::{create_redis_client, CacheBackend, MemoryCacheBackend, RedisCacheBackend, ResultCache},
    config::Config,
    db::{create_pool, run_migrations, CatalogStore, PgCatalogStore},
    routes::{create_router, AppState},
    services::popularity::spawn_popularity_refresher,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let pool = create_pool(&config.database_url, config.db_max_connections).await?;
    run_migrations(&pool).await?;
    let store: Arc<dyn CatalogStore> = Arc::new(PgCatalogStore::new(pool));

    let backend: Arc<dyn CacheBackend> = match config.redis_url() {
        Some(url) => Arc::new(RedisCacheBackend::new(create_redis_client(url)?)),
        None => {
            tracing::warn!("REDIS_URL is empty, caching in process memory");
            Arc::new(MemoryCacheBackend::new())
        }
    };
    let (cache, cache_writer) = ResultCache::new(backend);

    let refresher = config
        .popularity_refresh_interval()
        .map(|every| spawn_popularity_refresher(store.clone(), every));

    let state = Arc::new(AppState::new(store, cache, config.recommender_settings()));
    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(refresher) = refresher {
        refresher.abort();
    }
    cache_writer.shutdown().await;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
