use anyhow::Result;
use chrono::Utc;
use sea_orm::sea_query::{Expr, Func, LikeExpr};
use sea_orm::{prelude::*, ActiveValue::Set, Condition, QueryOrder};
use shared::entity::{data_download_jobs, market_data};
use shared::TaskStatus;
use std::collections::HashSet;
use std::sync::Arc;

const LIKE_ESCAPE: char = '!';

/// Search terms are literal; LIKE wildcards in them match only themselves.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | LIKE_ESCAPE) {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}

#[derive(Debug, Clone)]
pub struct NewMarketData {
    pub exchange: String,
    pub pair: String,
    pub timeframe: String,
    pub market_type: String,
    pub file_path: Option<String>,
    pub start_time: Option<DateTimeUtc>,
    pub end_time: Option<DateTimeUtc>,
}

#[derive(Debug, Clone)]
pub struct NewDataDownloadJob {
    pub exchange: String,
    pub pairs: Vec<String>,
    pub timeframes: Vec<String>,
    pub market_type: String,
    pub timerange_start: Option<DateTimeUtc>,
    pub timerange_end: Option<DateTimeUtc>,
}

/// Identity of one candle series: exchange, pair, timeframe and market type.
pub fn series_key(exchange: &str, pair: &str, timeframe: &str, market_type: &str) -> String {
    format!("{}:{}:{}:{}", exchange, pair, timeframe, market_type)
}

pub struct MarketDataRepository {
    db: Arc<DatabaseConnection>,
}

impl MarketDataRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Case-insensitive substring match on pair or exchange, most recently updated first.
    pub async fn search(&self, term: Option<&str>) -> Result<Vec<market_data::Model>> {
        let mut query = market_data::Entity::find().order_by_desc(market_data::Column::UpdatedAt);
        if let Some(term) = term.map(str::trim).filter(|t| !t.is_empty()) {
            let pattern = format!("%{}%", escape_like(&term.to_lowercase()));
            query = query.filter(
                Condition::any()
                    .add(
                        Expr::expr(Func::lower(Expr::col(market_data::Column::Pair)))
                            .like(LikeExpr::new(pattern.as_str()).escape(LIKE_ESCAPE)),
                    )
                    .add(
                        Expr::expr(Func::lower(Expr::col(market_data::Column::Exchange)))
                            .like(LikeExpr::new(pattern.as_str()).escape(LIKE_ESCAPE)),
                    ),
            );
        }
        let rows = query.all(self.db.as_ref()).await?;
        Ok(rows)
    }

    pub async fn find_by_id(&self, id: i32) -> Result<Option<market_data::Model>> {
        let row = market_data::Entity::find_by_id(id).one(self.db.as_ref()).await?;
        Ok(row)
    }

    pub async fn delete(&self, id: i32) -> Result<()> {
        market_data::Entity::delete_by_id(id).exec(self.db.as_ref()).await?;
        Ok(())
    }

    pub async fn registered_series(&self) -> Result<HashSet<String>> {
        let rows = market_data::Entity::find().all(self.db.as_ref()).await?;
        Ok(rows
            .iter()
            .map(|r| series_key(&r.exchange, &r.pair, &r.timeframe, &r.market_type))
            .collect())
    }

    pub async fn series_exists(
        &self,
        exchange: &str,
        pair: &str,
        timeframe: &str,
        market_type: &str,
    ) -> Result<bool> {
        let count = market_data::Entity::find()
            .filter(market_data::Column::Exchange.eq(exchange))
            .filter(market_data::Column::Pair.eq(pair))
            .filter(market_data::Column::Timeframe.eq(timeframe))
            .filter(market_data::Column::MarketType.eq(market_type))
            .count(self.db.as_ref())
            .await?;
        Ok(count > 0)
    }

    pub async fn create(&self, new: NewMarketData) -> Result<market_data::Model> {
        let now = Utc::now();
        let row = market_data::ActiveModel {
            exchange: Set(new.exchange),
            pair: Set(new.pair),
            timeframe: Set(new.timeframe),
            market_type: Set(new.market_type),
            status: Set("available".to_string()),
            file_path: Set(new.file_path),
            start_time: Set(new.start_time),
            end_time: Set(new.end_time),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await?;
        Ok(row)
    }

    pub async fn create_download_job(&self, new: NewDataDownloadJob) -> Result<data_download_jobs::Model> {
        let now = Utc::now();
        let job = data_download_jobs::ActiveModel {
            exchange: Set(new.exchange),
            pairs: Set(serde_json::json!(new.pairs)),
            timeframes: Set(serde_json::json!(new.timeframes)),
            market_type: Set(new.market_type),
            timerange_start: Set(new.timerange_start),
            timerange_end: Set(new.timerange_end),
            status: Set(TaskStatus::Pending),
            logs: Set(String::new()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await?;
        Ok(job)
    }

    pub async fn find_download_job(&self, id: i32) -> Result<Option<data_download_jobs::Model>> {
        let job = data_download_jobs::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?;
        Ok(job)
    }
}
