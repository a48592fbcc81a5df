//! Server-rendered pages
//!
//! A small HTML front end over the same repositories the JSON API uses. The
//! backtest detail page draws its chart client-side from `chart-data`.

use askama::Template;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use chrono::{DateTime, Utc};
use shared::entity::backtest_trades;
use shared::AvailablePairs;

use crate::error::{ApiResult, OrInternal};
use crate::repositories::{BacktestWithRelations, StatusCounts};
use crate::state::AppState;

const RECENT_LIMIT: usize = 10;

fn format_time(value: Option<DateTime<Utc>>) -> String {
    value
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// One row of a backtest table, pre-formatted for display.
pub struct BacktestRow {
    pub id: String,
    pub name: String,
    pub status: String,
    pub strategy: String,
    pub config: String,
    pub timeframe: String,
    pub created_at: String,
}

impl From<&BacktestWithRelations> for BacktestRow {
    fn from(item: &BacktestWithRelations) -> Self {
        Self {
            id: item.task.id.clone(),
            name: item.task.name.clone(),
            status: item.task.status.to_string(),
            strategy: item
                .strategy
                .as_ref()
                .map(|s| s.class_name.clone())
                .unwrap_or_else(|| "-".to_string()),
            config: item
                .config
                .as_ref()
                .map(|c| c.name.clone().unwrap_or_else(|| c.filename.clone()))
                .unwrap_or_else(|| "-".to_string()),
            timeframe: item.task.timeframe.clone(),
            created_at: format_time(Some(item.task.created_at)),
        }
    }
}

pub struct TradeRow {
    pub pair: String,
    pub open_date: String,
    pub close_date: String,
    pub open_rate: String,
    pub close_rate: String,
    pub profit_abs: String,
    pub profit_pct: String,
    pub exit_reason: String,
    pub winning: bool,
}

impl From<&backtest_trades::Model> for TradeRow {
    fn from(trade: &backtest_trades::Model) -> Self {
        Self {
            pair: trade.pair.clone(),
            open_date: format_time(Some(trade.open_date)),
            close_date: format_time(Some(trade.close_date)),
            open_rate: format!("{:.6}", trade.open_rate),
            close_rate: format!("{:.6}", trade.close_rate),
            profit_abs: format!("{:.4}", trade.profit_abs),
            profit_pct: format!("{:.2}%", trade.profit_pct * 100.0),
            exit_reason: trade.exit_reason.clone().unwrap_or_else(|| "-".to_string()),
            winning: trade.profit_abs >= 0.0,
        }
    }
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub counts: StatusCounts,
    pub total: u64,
    pub recent: Vec<BacktestRow>,
}

#[derive(Template)]
#[template(path = "backtests.html")]
pub struct BacktestsTemplate {
    pub backtests: Vec<BacktestRow>,
}

#[derive(Template)]
#[template(path = "backtest_detail.html")]
pub struct BacktestDetailTemplate {
    pub backtest: BacktestRow,
    pub timerange: String,
    pub completed_at: String,
    pub summary: String,
    pub logs: String,
    pub trades: Vec<TradeRow>,
    pub pairs: Vec<String>,
    pub default_pair: String,
}

#[derive(Template)]
#[template(path = "not_found.html")]
pub struct NotFoundTemplate {
    pub message: String,
}

fn render<T: Template>(template: &T) -> ApiResult<Html<String>> {
    Ok(Html(template.render().or_internal("Failed to render page")?))
}

pub async fn index(State(state): State<AppState>) -> ApiResult<Html<String>> {
    let counts = state.backtests().status_counts().await?;
    let backtests = state.backtests().list(None).await?;
    render(&IndexTemplate {
        total: counts.total(),
        counts,
        recent: backtests.iter().take(RECENT_LIMIT).map(BacktestRow::from).collect(),
    })
}

pub async fn backtests(State(state): State<AppState>) -> ApiResult<Html<String>> {
    let backtests = state.backtests().list(None).await?;
    render(&BacktestsTemplate {
        backtests: backtests.iter().map(BacktestRow::from).collect(),
    })
}

pub async fn backtest_detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let Some(item) = state.backtests().find_with_relations(&id).await? else {
        let page = render(&NotFoundTemplate {
            message: format!("Backtest {} does not exist.", id),
        })?;
        return Ok((StatusCode::NOT_FOUND, page).into_response());
    };

    let trades = state.backtests().trades(&id, None).await?;
    let pairs = AvailablePairs::from_pairs(trades.iter().map(|t| t.pair.clone()));
    let summary = item
        .task
        .results_summary
        .as_ref()
        .and_then(|s| serde_json::to_string_pretty(s).ok())
        .unwrap_or_default();

    let page = render(&BacktestDetailTemplate {
        backtest: BacktestRow::from(&item),
        timerange: format!(
            "{} → {}",
            format_time(item.task.timerange_start),
            format_time(item.task.timerange_end)
        ),
        completed_at: format_time(item.task.completed_at),
        summary,
        logs: item.task.logs.clone(),
        trades: trades.iter().map(TradeRow::from).collect(),
        default_pair: pairs.default_pair.clone().unwrap_or_default(),
        pairs: pairs.pairs,
    })?;
    Ok(page.into_response())
}

pub async fn not_found() -> impl IntoResponse {
    match (NotFoundTemplate {
        message: "The page you are looking for does not exist.".to_string(),
    })
    .render()
    {
        Ok(html) => (StatusCode::NOT_FOUND, Html(html)).into_response(),
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}
