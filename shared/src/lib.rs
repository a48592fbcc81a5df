pub mod cache;
pub mod config;
pub mod database;
pub mod entity;
pub mod freqtrade;
pub mod log_stream;
pub mod models;
pub mod queue;
pub mod redis;

pub use cache::{BacktestCache, CacheStats, MemoryCache, RedisCache, ResponseCache};
pub use config::Config;
pub use database::{get_db_connection, Db};
pub use freqtrade::UserData;
pub use log_stream::{LogBus, LogFrame, MemoryLogBus, RedisLogBus};
pub use models::*;
pub use queue::{JobQueue, QueueJob, RecordingJobQueue, RedisJobQueue};
pub use self::redis::{get_redis_client, get_redis_connection, Redis};
