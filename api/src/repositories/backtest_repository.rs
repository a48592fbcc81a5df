use anyhow::Result;
use chrono::Utc;
use sea_orm::{prelude::*, ActiveValue::Set, QueryOrder, QuerySelect};
use serde::Serialize;
use shared::entity::{backtest_tasks, backtest_trades, configs, strategies};
use shared::TaskStatus;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct BacktestWithRelations {
    #[serde(flatten)]
    pub task: backtest_tasks::Model,
    pub strategy: Option<strategies::Model>,
    pub config: Option<configs::Model>,
}

#[derive(Debug, Clone)]
pub struct NewBacktest {
    pub name: String,
    pub strategy_id: i32,
    pub config_id: i32,
    pub timeframe: String,
    pub timerange_start: Option<DateTimeUtc>,
    pub timerange_end: Option<DateTimeUtc>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub pending: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
}

impl StatusCounts {
    pub fn total(&self) -> u64 {
        self.pending + self.running + self.completed + self.failed
    }
}

pub struct BacktestRepository {
    db: Arc<DatabaseConnection>,
}

impl BacktestRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<backtest_tasks::Model>> {
        let task = backtest_tasks::Entity::find_by_id(id.to_string())
            .one(self.db.as_ref())
            .await?;
        Ok(task)
    }

    pub async fn find_with_relations(&self, id: &str) -> Result<Option<BacktestWithRelations>> {
        match self.find_by_id(id).await? {
            Some(task) => Ok(self.attach_relations(vec![task]).await?.pop()),
            None => Ok(None),
        }
    }

    /// Newest first, optionally limited to one strategy.
    pub async fn list(&self, strategy_id: Option<i32>) -> Result<Vec<BacktestWithRelations>> {
        let mut query = backtest_tasks::Entity::find().order_by_desc(backtest_tasks::Column::CreatedAt);
        if let Some(strategy_id) = strategy_id {
            query = query.filter(backtest_tasks::Column::StrategyId.eq(strategy_id));
        }
        let tasks = query.all(self.db.as_ref()).await?;
        self.attach_relations(tasks).await
    }

    async fn attach_relations(
        &self,
        tasks: Vec<backtest_tasks::Model>,
    ) -> Result<Vec<BacktestWithRelations>> {
        let strategy_ids: Vec<i32> = tasks.iter().map(|t| t.strategy_id).collect();
        let config_ids: Vec<i32> = tasks.iter().map(|t| t.config_id).collect();

        let strategies: HashMap<i32, strategies::Model> = strategies::Entity::find()
            .filter(strategies::Column::Id.is_in(strategy_ids))
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .map(|s| (s.id, s))
            .collect();
        let configs: HashMap<i32, configs::Model> = configs::Entity::find()
            .filter(configs::Column::Id.is_in(config_ids))
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();

        Ok(tasks
            .into_iter()
            .map(|task| BacktestWithRelations {
                strategy: strategies.get(&task.strategy_id).cloned(),
                config: configs.get(&task.config_id).cloned(),
                task,
            })
            .collect())
    }

    pub async fn create(&self, new: NewBacktest) -> Result<backtest_tasks::Model> {
        let now = Utc::now();
        let task = backtest_tasks::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            name: Set(new.name),
            status: Set(TaskStatus::Pending),
            strategy_id: Set(new.strategy_id),
            config_id: Set(new.config_id),
            timeframe: Set(new.timeframe),
            timerange_start: Set(new.timerange_start),
            timerange_end: Set(new.timerange_end),
            results_summary: Set(None),
            raw_output_path: Set(None),
            candle_data_file: Set(None),
            plot_profit_url: Set(None),
            logs: Set(String::new()),
            source_hyperopt_task_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            completed_at: Set(None),
        }
        .insert(self.db.as_ref())
        .await?;
        Ok(task)
    }

    /// Puts a task back to PENDING and forgets the previous run's output.
    pub async fn reset_for_retry(&self, task: backtest_tasks::Model) -> Result<backtest_tasks::Model> {
        let mut active: backtest_tasks::ActiveModel = task.into();
        active.status = Set(TaskStatus::Pending);
        active.completed_at = Set(None);
        active.results_summary = Set(None);
        active.raw_output_path = Set(None);
        active.logs = Set(String::new());
        active.updated_at = Set(Utc::now());
        let task = active.update(self.db.as_ref()).await?;
        Ok(task)
    }

    /// Distinct pairs traded in a backtest, unsorted.
    pub async fn traded_pairs(&self, id: &str) -> Result<Vec<String>> {
        let pairs = backtest_trades::Entity::find()
            .select_only()
            .column(backtest_trades::Column::Pair)
            .distinct()
            .filter(backtest_trades::Column::BacktestTaskId.eq(id))
            .into_tuple::<String>()
            .all(self.db.as_ref())
            .await?;
        Ok(pairs)
    }

    pub async fn trades(&self, id: &str, pair: Option<&str>) -> Result<Vec<backtest_trades::Model>> {
        let mut query = backtest_trades::Entity::find()
            .filter(backtest_trades::Column::BacktestTaskId.eq(id))
            .order_by_asc(backtest_trades::Column::OpenDate);
        if let Some(pair) = pair {
            query = query.filter(backtest_trades::Column::Pair.eq(pair));
        }
        let trades = query.all(self.db.as_ref()).await?;
        Ok(trades)
    }

    pub async fn status_counts(&self) -> Result<StatusCounts> {
        let count = |status: TaskStatus| {
            backtest_tasks::Entity::find()
                .filter(backtest_tasks::Column::Status.eq(status))
                .count(self.db.as_ref())
        };
        Ok(StatusCounts {
            pending: count(TaskStatus::Pending).await?,
            running: count(TaskStatus::Running).await?,
            completed: count(TaskStatus::Completed).await?,
            failed: count(TaskStatus::Failed).await?,
        })
    }

    pub async fn count_for_config(&self, config_id: i32) -> Result<u64> {
        let count = backtest_tasks::Entity::find()
            .filter(backtest_tasks::Column::ConfigId.eq(config_id))
            .count(self.db.as_ref())
            .await?;
        Ok(count)
    }
}
