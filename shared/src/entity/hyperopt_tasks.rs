//! `SeaORM` Entity, @generated manually

use crate::models::TaskStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "hyperopt_tasks")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub strategy_id: i32,
    pub config_id: i32,
    pub epochs: i32,
    pub spaces: String,
    pub loss_function: String,
    pub timerange: Option<String>,
    pub job_workers: Option<i32>,
    pub status: TaskStatus,
    pub best_result: Option<Json>,
    #[sea_orm(column_type = "Text", nullable)]
    pub results_path: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub log_path: Option<String>,
    #[sea_orm(column_type = "Text")]
    pub logs: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub completed_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::strategies::Entity",
        from = "Column::StrategyId",
        to = "super::strategies::Column::Id",
        on_update = "NoAction",
        on_delete = "Restrict"
    )]
    Strategies,
    #[sea_orm(
        belongs_to = "super::configs::Entity",
        from = "Column::ConfigId",
        to = "super::configs::Column::Id",
        on_update = "NoAction",
        on_delete = "Restrict"
    )]
    Configs,
    #[sea_orm(has_many = "super::backtest_tasks::Entity")]
    GeneratedBacktests,
}

impl Related<super::strategies::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Strategies.def()
    }
}

impl Related<super::configs::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Configs.def()
    }
}

impl Related<super::backtest_tasks::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::GeneratedBacktests.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
