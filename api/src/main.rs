use anyhow::Result;
use api::logging::init_logging;
use api::{create_router, AppState};
use migration::{Migrator, MigratorTrait};
use shared::{
    get_db_connection, BacktestCache, Config, MemoryCache, RedisCache, RedisJobQueue, RedisLogBus,
    ResponseCache,
};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_logging(&config.environment);

    info!(
        "Starting Freqtrade dashboard API (git {} on {}, built {})",
        env!("GIT_HASH"),
        env!("GIT_BRANCH"),
        env!("BUILD_TIME")
    );

    let db = get_db_connection(&config.database_url).await?;
    info!("Connected to database");

    if config.run_migrations {
        Migrator::up(&db, None).await?;
        info!("Database migrations applied");
    }

    let queue = RedisJobQueue::connect(&config.redis_url).await?;

    let cache: Arc<dyn ResponseCache> = match RedisCache::connect(&config.redis_url).await {
        Ok(cache) => Arc::new(cache),
        Err(e) => {
            warn!("Response cache unavailable, falling back to in-process cache: {:#}", e);
            Arc::new(MemoryCache::new())
        }
    };
    let log_bus = RedisLogBus::new(&config.redis_url)?;

    if let Err(e) = tokio::fs::create_dir_all(&config.user_data_path).await {
        warn!(path = ?config.user_data_path, "Failed to create user_data directory: {}", e);
    }
    if config.api_secret_key.is_none() && !config.is_development() {
        warn!("API_SECRET_KEY is not set; protected endpoints will answer 500");
    }

    let addr = format!("{}:{}", config.api_host, config.api_port);
    let state = AppState::new(
        config,
        db,
        Arc::new(queue),
        BacktestCache::new(cache),
        Arc::new(log_bus),
    );
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("API server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
