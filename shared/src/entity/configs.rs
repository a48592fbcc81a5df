//! `SeaORM` Entity, @generated manually

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "configs")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique, nullable)]
    pub name: Option<String>,
    #[sea_orm(unique)]
    pub filename: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    /// The Freqtrade configuration object
    pub data: Json,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl Model {
    /// `timeframe` from the stored Freqtrade config, when present and non-empty.
    pub fn timeframe(&self) -> Option<&str> {
        self.data
            .get("timeframe")
            .and_then(|v| v.as_str())
            .filter(|tf| !tf.trim().is_empty())
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::backtest_tasks::Entity")]
    BacktestTasks,
    #[sea_orm(has_many = "super::hyperopt_tasks::Entity")]
    HyperoptTasks,
}

impl Related<super::backtest_tasks::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BacktestTasks.def()
    }
}

impl Related<super::hyperopt_tasks::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::HyperoptTasks.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
