//! `SeaORM` Entity, @generated manually
//!
//! Rows are written by the backtest worker from Freqtrade's result file, so
//! field names keep Freqtrade's snake_case in JSON.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "backtest_trades")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub backtest_task_id: String,
    pub pair: String,
    pub open_date: DateTimeUtc,
    pub close_date: DateTimeUtc,
    pub open_rate: f64,
    pub close_rate: f64,
    pub amount: f64,
    pub stake_amount: f64,
    pub profit_abs: f64,
    pub profit_pct: f64,
    pub trade_duration: Option<i64>, // minutes
    pub exit_reason: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::backtest_tasks::Entity",
        from = "Column::BacktestTaskId",
        to = "super::backtest_tasks::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    BacktestTasks,
}

impl Related<super::backtest_tasks::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BacktestTasks.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
