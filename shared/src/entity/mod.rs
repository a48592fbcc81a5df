//! `SeaORM` entities for the dashboard schema

pub mod prelude;

pub mod backtest_tasks;
pub mod backtest_trades;
pub mod configs;
pub mod data_download_jobs;
pub mod hyperopt_tasks;
pub mod market_data;
pub mod strategies;
