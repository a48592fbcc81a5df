pub use super::backtest_tasks::Entity as BacktestTasks;
pub use super::backtest_trades::Entity as BacktestTrades;
pub use super::configs::Entity as Configs;
pub use super::data_download_jobs::Entity as DataDownloadJobs;
pub use super::hyperopt_tasks::Entity as HyperoptTasks;
pub use super::market_data::Entity as MarketData;
pub use super::strategies::Entity as Strategies;
