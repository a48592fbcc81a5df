//! `SeaORM` Entity, @generated manually

use crate::models::TaskStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "data_download_jobs")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub exchange: String,
    /// JSON array of pairs, e.g. `["BTC/USDT", "ETH/USDT"]`
    pub pairs: Json,
    /// JSON array of timeframes, e.g. `["5m", "1h"]`
    pub timeframes: Json,
    pub market_type: String,
    pub timerange_start: Option<DateTimeUtc>,
    pub timerange_end: Option<DateTimeUtc>,
    pub status: TaskStatus,
    #[sea_orm(column_type = "Text")]
    pub logs: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
