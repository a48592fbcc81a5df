use anyhow::Result;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{prelude::*, ActiveValue::Set, QueryOrder, QuerySelect, TransactionTrait};
use serde::Serialize;
use shared::entity::{backtest_tasks, hyperopt_tasks, strategies};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyCounts {
    pub backtest_tasks: u64,
    pub hyperopt_tasks: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StrategyWithCounts {
    #[serde(flatten)]
    pub strategy: strategies::Model,
    #[serde(rename = "_count")]
    pub count: StrategyCounts,
}

pub struct StrategyRepository {
    db: Arc<DatabaseConnection>,
}

impl StrategyRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, id: i32) -> Result<Option<strategies::Model>> {
        let strategy = strategies::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?;
        Ok(strategy)
    }

    pub async fn find_by_filename(&self, filename: &str) -> Result<Option<strategies::Model>> {
        let strategy = strategies::Entity::find()
            .filter(strategies::Column::Filename.eq(filename))
            .one(self.db.as_ref())
            .await?;
        Ok(strategy)
    }

    /// All strategies, newest first, with how many tasks use each one.
    pub async fn list_with_counts(&self) -> Result<Vec<StrategyWithCounts>> {
        let strategies = strategies::Entity::find()
            .order_by_desc(strategies::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;

        let backtests: HashMap<i32, i64> = backtest_tasks::Entity::find()
            .select_only()
            .column(backtest_tasks::Column::StrategyId)
            .column_as(Expr::col(backtest_tasks::Column::Id).count(), "task_count")
            .group_by(backtest_tasks::Column::StrategyId)
            .into_tuple::<(i32, i64)>()
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .collect();

        let hyperopts: HashMap<i32, i64> = hyperopt_tasks::Entity::find()
            .select_only()
            .column(hyperopt_tasks::Column::StrategyId)
            .column_as(Expr::col(hyperopt_tasks::Column::Id).count(), "task_count")
            .group_by(hyperopt_tasks::Column::StrategyId)
            .into_tuple::<(i32, i64)>()
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .collect();

        Ok(strategies
            .into_iter()
            .map(|strategy| {
                let count = StrategyCounts {
                    backtest_tasks: backtests.get(&strategy.id).copied().unwrap_or(0) as u64,
                    hyperopt_tasks: hyperopts.get(&strategy.id).copied().unwrap_or(0) as u64,
                };
                StrategyWithCounts { strategy, count }
            })
            .collect())
    }

    pub async fn counts(&self, id: i32) -> Result<StrategyCounts> {
        let backtest_tasks = backtest_tasks::Entity::find()
            .filter(backtest_tasks::Column::StrategyId.eq(id))
            .count(self.db.as_ref())
            .await?;
        let hyperopt_tasks = hyperopt_tasks::Entity::find()
            .filter(hyperopt_tasks::Column::StrategyId.eq(id))
            .count(self.db.as_ref())
            .await?;
        Ok(StrategyCounts {
            backtest_tasks,
            hyperopt_tasks,
        })
    }

    pub async fn registered_filenames(&self) -> Result<HashSet<String>> {
        let filenames = strategies::Entity::find()
            .select_only()
            .column(strategies::Column::Filename)
            .into_tuple::<String>()
            .all(self.db.as_ref())
            .await?;
        Ok(filenames.into_iter().collect())
    }

    pub async fn create(
        &self,
        filename: &str,
        class_name: &str,
        description: Option<String>,
    ) -> Result<strategies::Model> {
        let now = Utc::now();
        let strategy = strategies::ActiveModel {
            filename: Set(filename.to_string()),
            class_name: Set(class_name.to_string()),
            description: Set(description),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await?;
        Ok(strategy)
    }

    pub async fn update_class_name(
        &self,
        strategy: strategies::Model,
        class_name: &str,
    ) -> Result<strategies::Model> {
        let mut active: strategies::ActiveModel = strategy.into();
        active.class_name = Set(class_name.to_string());
        active.updated_at = Set(Utc::now());
        let strategy = active.update(self.db.as_ref()).await?;
        Ok(strategy)
    }

    pub async fn delete(&self, id: i32) -> Result<()> {
        strategies::Entity::delete_by_id(id)
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    /// Registers scanned files in one transaction. Files already present are
    /// reported back as errors instead of failing the batch.
    pub async fn import(
        &self,
        files: Vec<(String, String)>,
        description: &str,
    ) -> Result<(Vec<strategies::Model>, Vec<(String, String)>)> {
        let txn = self.db.begin().await?;
        let mut imported = Vec::new();
        let mut errors = Vec::new();

        for (filename, class_name) in files {
            let existing = strategies::Entity::find()
                .filter(strategies::Column::Filename.eq(filename.as_str()))
                .one(&txn)
                .await?;
            if existing.is_some() {
                errors.push((filename, "Strategy already exists in database".to_string()));
                continue;
            }

            let now = Utc::now();
            let strategy = strategies::ActiveModel {
                filename: Set(filename.clone()),
                class_name: Set(class_name),
                description: Set(Some(description.to_string())),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            }
            .insert(&txn)
            .await;

            match strategy {
                Ok(strategy) => imported.push(strategy),
                Err(e) => errors.push((filename, e.to_string())),
            }
        }

        txn.commit().await?;
        Ok((imported, errors))
    }
}
