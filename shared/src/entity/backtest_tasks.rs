//! `SeaORM` Entity, @generated manually

use crate::models::TaskStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "backtest_tasks")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub name: String,
    pub status: TaskStatus,
    pub strategy_id: i32,
    pub config_id: i32,
    pub timeframe: String,
    pub timerange_start: Option<DateTimeUtc>,
    pub timerange_end: Option<DateTimeUtc>,
    pub results_summary: Option<Json>,
    #[sea_orm(column_type = "Text", nullable)]
    pub raw_output_path: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub candle_data_file: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub plot_profit_url: Option<String>,
    #[sea_orm(column_type = "Text")]
    pub logs: String,
    pub source_hyperopt_task_id: Option<String>,
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
    #[sea_orm(
        belongs_to = "super::hyperopt_tasks::Entity",
        from = "Column::SourceHyperoptTaskId",
        to = "super::hyperopt_tasks::Column::Id",
        on_update = "NoAction",
        on_delete = "SetNull"
    )]
    HyperoptTasks,
    #[sea_orm(has_many = "super::backtest_trades::Entity")]
    BacktestTrades,
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

impl Related<super::hyperopt_tasks::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::HyperoptTasks.def()
    }
}

impl Related<super::backtest_trades::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BacktestTrades.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
