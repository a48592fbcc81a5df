//! Test harness for the API integration tests

use api::{create_router, AppState};
use axum_test::TestServer;
use chrono::{Duration, TimeZone, Utc};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ConnectOptions, Database, IntoActiveModel};
use serde_json::{json, Value};
use shared::entity::{backtest_tasks, backtest_trades, configs, hyperopt_tasks, strategies};
use shared::{BacktestCache, Config, MemoryCache, MemoryLogBus, RecordingJobQueue, TaskStatus};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use api::repositories::{NewBacktest, NewConfig, NewHyperopt};

pub const SAMPLE_STRATEGY: &str = r#"from freqtrade.strategy import IStrategy

class SampleStrategy(IStrategy):
    minimal_roi = {
        "0": 0.1,
        "30": 0.05
    }
    stoploss = -0.10
    buy_rsi = 30
    sell_rsi = 70
"#;

#[allow(dead_code)]
pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    pub queue: Arc<RecordingJobQueue>,
    pub log_bus: Arc<MemoryLogBus>,
    pub user_data: TempDir,
}

#[allow(dead_code)]
impl TestApp {
    pub async fn new() -> Self {
        Self::with_environment("development", None).await
    }

    pub async fn with_environment(environment: &str, api_secret_key: Option<&str>) -> Self {
        let user_data = tempfile::tempdir().expect("create user_data dir");

        let mut options = ConnectOptions::new("sqlite::memory:");
        options.max_connections(1).min_connections(1).sqlx_logging(false);
        let db = Database::connect(options).await.expect("open sqlite");
        Migrator::up(&db, None).await.expect("run migrations");

        let config = Config {
            database_url: "sqlite::memory:".to_string(),
            redis_url: "redis://localhost:6379".to_string(),
            user_data_path: user_data.path().to_path_buf(),
            api_host: "127.0.0.1".to_string(),
            api_port: 0,
            api_secret_key: api_secret_key.map(str::to_string),
            environment: environment.to_string(),
            run_migrations: true,
        };

        let queue = Arc::new(RecordingJobQueue::new());
        let log_bus = Arc::new(MemoryLogBus::new());
        let state = AppState::new(
            config,
            db,
            queue.clone(),
            BacktestCache::new(Arc::new(MemoryCache::new())),
            log_bus.clone(),
        );

        let server = TestServer::new(create_router(state.clone())).expect("start test server");

        Self {
            server,
            state,
            queue,
            log_bus,
            user_data,
        }
    }

    pub fn path(&self) -> &Path {
        self.user_data.path()
    }

    pub fn write_file(&self, relative: &str, content: &str) {
        let path = self.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent dir");
        }
        std::fs::write(path, content).expect("write fixture file");
    }

    pub async fn seed_strategy(&self, filename: &str) -> strategies::Model {
        self.write_file(&format!("strategies/{}", filename), SAMPLE_STRATEGY);
        self.state
            .strategies()
            .create(filename, "SampleStrategy", None)
            .await
            .expect("insert strategy")
    }

    pub async fn seed_config(&self, filename: &str, data: Value) -> configs::Model {
        self.state
            .configs()
            .create(NewConfig {
                name: Some(filename.trim_end_matches(".json").to_string()),
                filename: filename.to_string(),
                description: None,
                data,
            })
            .await
            .expect("insert config")
    }

    /// A strategy, a `5m` config and a pending backtest referencing both.
    pub async fn seed_backtest(&self) -> backtest_tasks::Model {
        let strategy = self.seed_strategy("sample_strategy.py").await;
        let config = self
            .seed_config("config.json", json!({ "timeframe": "5m", "exchange": { "name": "binance" } }))
            .await;
        self.state
            .backtests()
            .create(NewBacktest {
                name: "Sample run".to_string(),
                strategy_id: strategy.id,
                config_id: config.id,
                timeframe: "5m".to_string(),
                timerange_start: None,
                timerange_end: None,
            })
            .await
            .expect("insert backtest")
    }

    /// Marks the backtest COMPLETED and records one trade per pair.
    pub async fn set_backtest_logs(&self, task: backtest_tasks::Model, logs: &str) -> backtest_tasks::Model {
        let mut active = task.into_active_model();
        active.logs = Set(logs.to_string());
        active.update(self.state.db.as_ref()).await.expect("update backtest logs")
    }

    pub async fn complete_backtest(&self, task: backtest_tasks::Model, pairs: &[&str]) -> backtest_tasks::Model {
        let mut active = task.clone().into_active_model();
        active.status = Set(TaskStatus::Completed);
        active.completed_at = Set(Some(Utc::now()));
        active.raw_output_path = Set(Some("backtest_results/result.json".to_string()));
        active.results_summary = Set(Some(json!({ "totalTrades": pairs.len() })));
        let task = active.update(self.state.db.as_ref()).await.expect("update backtest");

        let open = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        for (i, pair) in pairs.iter().enumerate() {
            backtest_trades::ActiveModel {
                backtest_task_id: Set(task.id.clone()),
                pair: Set(pair.to_string()),
                open_date: Set(open + Duration::minutes(5 * i as i64)),
                close_date: Set(open + Duration::minutes(5 * i as i64 + 10)),
                open_rate: Set(100.0),
                close_rate: Set(101.0),
                amount: Set(1.0),
                stake_amount: Set(100.0),
                profit_abs: Set(1.0),
                profit_pct: Set(0.01),
                trade_duration: Set(Some(10)),
                exit_reason: Set(Some("roi".to_string())),
                ..Default::default()
            }
            .insert(self.state.db.as_ref())
            .await
            .expect("insert trade");
        }
        task
    }

    pub async fn seed_hyperopt(&self) -> hyperopt_tasks::Model {
        let strategy = self.seed_strategy("sample_strategy.py").await;
        let config = self.seed_config("config.json", json!({ "timeframe": "5m" })).await;
        self.state
            .hyperopts()
            .create(NewHyperopt {
                strategy_id: strategy.id,
                config_id: config.id,
                epochs: 10,
                spaces: "buy sell".to_string(),
                loss_function: "SharpeHyperOptLoss".to_string(),
                timerange: None,
                job_workers: None,
            })
            .await
            .expect("insert hyperopt")
    }
}
