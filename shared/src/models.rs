use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of backtest, hyperopt and data-download work. Only `Pending` is
/// written by this service; the external workers move tasks forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "RUNNING")]
    Running,
    #[sea_orm(string_value = "COMPLETED")]
    Completed,
    #[sea_orm(string_value = "FAILED")]
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Form ids arrive either as JSON numbers or as numeric strings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FlexibleId {
    Number(i64),
    Text(String),
}

impl FlexibleId {
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            FlexibleId::Number(n) => i32::try_from(*n).ok(),
            FlexibleId::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// Unique trading pairs that appear in a backtest's trades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailablePairs {
    pub pairs: Vec<String>,
    pub total_pairs: usize,
    pub default_pair: Option<String>,
}

impl AvailablePairs {
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut pairs: Vec<String> = pairs.into_iter().map(Into::into).collect();
        pairs.sort();
        pairs.dedup();
        Self {
            total_pairs: pairs.len(),
            default_pair: pairs.first().cloned(),
            pairs,
        }
    }
}

/// One OHLCV bar in the shape the chart widget consumes (time in seconds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartCandle {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}
