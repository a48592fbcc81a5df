use anyhow::Result;
use chrono::Utc;
use sea_orm::{prelude::*, ActiveValue::Set, QueryOrder, QuerySelect, TransactionTrait};
use serde::Serialize;
use shared::entity::{backtest_tasks, backtest_trades, configs, hyperopt_tasks, strategies};
use shared::TaskStatus;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// A backtest that was started from a hyperopt run's best parameters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedBacktest {
    pub id: String,
    pub name: String,
    pub status: TaskStatus,
    pub created_at: DateTimeUtc,
    pub completed_at: Option<DateTimeUtc>,
}

impl From<backtest_tasks::Model> for GeneratedBacktest {
    fn from(task: backtest_tasks::Model) -> Self {
        Self {
            id: task.id,
            name: task.name,
            status: task.status,
            created_at: task.created_at,
            completed_at: task.completed_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HyperoptWithRelations {
    #[serde(flatten)]
    pub task: hyperopt_tasks::Model,
    pub strategy: Option<strategies::Model>,
    pub config: Option<configs::Model>,
    pub generated_backtests: Vec<GeneratedBacktest>,
}

#[derive(Debug, Clone)]
pub struct NewHyperopt {
    pub strategy_id: i32,
    pub config_id: i32,
    pub epochs: i32,
    pub spaces: String,
    pub loss_function: String,
    pub timerange: Option<String>,
    pub job_workers: Option<i32>,
}

pub struct HyperoptRepository {
    db: Arc<DatabaseConnection>,
}

impl HyperoptRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<hyperopt_tasks::Model>> {
        let task = hyperopt_tasks::Entity::find_by_id(id.to_string())
            .one(self.db.as_ref())
            .await?;
        Ok(task)
    }

    pub async fn find_with_relations(&self, id: &str) -> Result<Option<HyperoptWithRelations>> {
        match self.find_by_id(id).await? {
            Some(task) => Ok(self.attach_relations(vec![task]).await?.pop()),
            None => Ok(None),
        }
    }

    pub async fn list(&self, strategy_id: Option<i32>) -> Result<Vec<HyperoptWithRelations>> {
        let mut query = hyperopt_tasks::Entity::find().order_by_desc(hyperopt_tasks::Column::CreatedAt);
        if let Some(strategy_id) = strategy_id {
            query = query.filter(hyperopt_tasks::Column::StrategyId.eq(strategy_id));
        }
        let tasks = query.all(self.db.as_ref()).await?;
        self.attach_relations(tasks).await
    }

    async fn attach_relations(
        &self,
        tasks: Vec<hyperopt_tasks::Model>,
    ) -> Result<Vec<HyperoptWithRelations>> {
        let ids: Vec<String> = tasks.iter().map(|t| t.id.clone()).collect();
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

        let mut generated: HashMap<String, Vec<GeneratedBacktest>> = HashMap::new();
        let backtests = backtest_tasks::Entity::find()
            .filter(backtest_tasks::Column::SourceHyperoptTaskId.is_in(ids))
            .order_by_desc(backtest_tasks::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        for backtest in backtests {
            if let Some(source) = backtest.source_hyperopt_task_id.clone() {
                generated.entry(source).or_default().push(backtest.into());
            }
        }

        Ok(tasks
            .into_iter()
            .map(|task| HyperoptWithRelations {
                strategy: strategies.get(&task.strategy_id).cloned(),
                config: configs.get(&task.config_id).cloned(),
                generated_backtests: generated.remove(&task.id).unwrap_or_default(),
                task,
            })
            .collect())
    }

    pub async fn create(&self, new: NewHyperopt) -> Result<hyperopt_tasks::Model> {
        let now = Utc::now();
        let task = hyperopt_tasks::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            strategy_id: Set(new.strategy_id),
            config_id: Set(new.config_id),
            epochs: Set(new.epochs),
            spaces: Set(new.spaces),
            loss_function: Set(new.loss_function),
            timerange: Set(new.timerange),
            job_workers: Set(new.job_workers),
            status: Set(TaskStatus::Pending),
            best_result: Set(None),
            results_path: Set(None),
            log_path: Set(None),
            logs: Set(String::new()),
            created_at: Set(now),
            updated_at: Set(now),
            completed_at: Set(None),
        }
        .insert(self.db.as_ref())
        .await?;
        Ok(task)
    }

    pub async fn reset_for_retry(&self, task: hyperopt_tasks::Model) -> Result<hyperopt_tasks::Model> {
        let mut active: hyperopt_tasks::ActiveModel = task.into();
        active.status = Set(TaskStatus::Pending);
        active.best_result = Set(None);
        active.results_path = Set(None);
        active.log_path = Set(None);
        active.logs = Set(String::new());
        active.completed_at = Set(None);
        active.updated_at = Set(Utc::now());
        let task = active.update(self.db.as_ref()).await?;
        Ok(task)
    }

    /// Removes the run together with the backtests it generated and their
    /// trades. Returns the ids of the removed backtests.
    pub async fn delete_with_generated(&self, id: &str) -> Result<Vec<String>> {
        let txn = self.db.begin().await?;

        let backtest_ids: Vec<String> = backtest_tasks::Entity::find()
            .select_only()
            .column(backtest_tasks::Column::Id)
            .filter(backtest_tasks::Column::SourceHyperoptTaskId.eq(id))
            .into_tuple::<String>()
            .all(&txn)
            .await?;

        if !backtest_ids.is_empty() {
            backtest_trades::Entity::delete_many()
                .filter(backtest_trades::Column::BacktestTaskId.is_in(backtest_ids.clone()))
                .exec(&txn)
                .await?;
            backtest_tasks::Entity::delete_many()
                .filter(backtest_tasks::Column::Id.is_in(backtest_ids.clone()))
                .exec(&txn)
                .await?;
        }

        hyperopt_tasks::Entity::delete_by_id(id.to_string())
            .exec(&txn)
            .await?;
        txn.commit().await?;

        info!(hyperopt_id = id, generated = backtest_ids.len(), "Deleted hyperopt task");
        Ok(backtest_ids)
    }

    pub async fn count_for_config(&self, config_id: i32) -> Result<u64> {
        let count = hyperopt_tasks::Entity::find()
            .filter(hyperopt_tasks::Column::ConfigId.eq(config_id))
            .count(self.db.as_ref())
            .await?;
        Ok(count)
    }
}
