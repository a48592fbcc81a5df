mod backtest_repository;
mod config_repository;
mod hyperopt_repository;
mod market_data_repository;
mod strategy_repository;

pub use backtest_repository::{BacktestRepository, BacktestWithRelations, NewBacktest, StatusCounts};
pub use config_repository::{ConfigChanges, ConfigRepository, NewConfig};
pub use hyperopt_repository::{
    GeneratedBacktest, HyperoptRepository, HyperoptWithRelations, NewHyperopt,
};
pub use market_data_repository::{series_key, MarketDataRepository, NewDataDownloadJob, NewMarketData};
pub use strategy_repository::{StrategyCounts, StrategyRepository, StrategyWithCounts};
