use sea_orm::DatabaseConnection;
use shared::{BacktestCache, Config, JobQueue, LogBus, UserData};
use std::sync::Arc;
use std::time::Instant;

use crate::middleware::RateLimiter;
use crate::repositories::{
    BacktestRepository, ConfigRepository, HyperoptRepository, MarketDataRepository,
    StrategyRepository,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Arc<DatabaseConnection>,
    pub user_data: Arc<UserData>,
    pub queue: Arc<dyn JobQueue>,
    pub cache: BacktestCache,
    pub log_bus: Arc<dyn LogBus>,
    pub rate_limiter: Arc<RateLimiter>,
    pub start_time: Arc<Instant>,
}

impl AppState {
    pub fn new(
        config: Config,
        db: DatabaseConnection,
        queue: Arc<dyn JobQueue>,
        cache: BacktestCache,
        log_bus: Arc<dyn LogBus>,
    ) -> Self {
        Self {
            user_data: Arc::new(UserData::new(config.user_data_path.clone())),
            config: Arc::new(config),
            db: Arc::new(db),
            queue,
            cache,
            log_bus,
            rate_limiter: Arc::new(RateLimiter::default()),
            start_time: Arc::new(Instant::now()),
        }
    }

    pub fn backtests(&self) -> BacktestRepository {
        BacktestRepository::new(self.db.clone())
    }

    pub fn hyperopts(&self) -> HyperoptRepository {
        HyperoptRepository::new(self.db.clone())
    }

    pub fn strategies(&self) -> StrategyRepository {
        StrategyRepository::new(self.db.clone())
    }

    pub fn configs(&self) -> ConfigRepository {
        ConfigRepository::new(self.db.clone())
    }

    pub fn market_data(&self) -> MarketDataRepository {
        MarketDataRepository::new(self.db.clone())
    }
}
