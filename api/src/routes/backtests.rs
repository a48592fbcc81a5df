use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use shared::entity::backtest_tasks;
use shared::freqtrade::{parse_date_input, read_candles};
use shared::log_stream::{backtest_channel, plot_channel};
use shared::{AvailablePairs, FlexibleId, QueueJob, TaskStatus};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult, OrInternal};
use crate::extract::{parse_optional_id, ApiJson};
use crate::repositories::{BacktestWithRelations, NewBacktest};
use crate::sse::{self, BACKTEST_GREETING};
use crate::state::AppState;

const DEFAULT_CHART_TIMEFRAME: &str = "5m";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    strategy_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBacktestRequest {
    name: Option<String>,
    strategy_id: Option<FlexibleId>,
    config_id: Option<FlexibleId>,
    timerange_start: Option<String>,
    timerange_end: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChartQuery {
    pair: Option<String>,
    timeframe: Option<String>,
}

pub async fn list_backtests(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<BacktestWithRelations>>> {
    let strategy_id = parse_optional_id(query.strategy_id.as_deref())?;
    let backtests = state
        .backtests()
        .list(strategy_id)
        .await
        .or_internal("Failed to fetch backtests")?;
    Ok(Json(backtests))
}

/// Optional date field from a form: blank means unset, garbage is rejected.
pub(crate) fn optional_date(
    raw: Option<&str>,
    field: &str,
) -> ApiResult<Option<chrono::DateTime<chrono::Utc>>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => parse_date_input(raw)
            .map(Some)
            .ok_or_else(|| ApiError::bad_request(format!("Invalid date for {}", field))),
        None => Ok(None),
    }
}

pub async fn create_backtest(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CreateBacktestRequest>,
) -> ApiResult<Json<BacktestWithRelations>> {
    let name = body.name.as_deref().map(str::trim).unwrap_or_default();
    let (Some(strategy_id), Some(config_id)) = (body.strategy_id, body.config_id) else {
        return Err(ApiError::bad_request("Missing required fields"));
    };
    if name.is_empty() {
        return Err(ApiError::bad_request("Missing required fields"));
    }
    let strategy_id = strategy_id
        .as_i32()
        .ok_or_else(|| ApiError::bad_request("Invalid ID format"))?;
    let config_id = config_id
        .as_i32()
        .ok_or_else(|| ApiError::bad_request("Invalid ID format"))?;

    let config = state
        .configs()
        .find_by_id(config_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Configuration not found"))?;
    let timeframe = config.timeframe().map(str::to_string).ok_or_else(|| {
        ApiError::bad_request(r#"Configuration is missing the required "timeframe" field."#)
    })?;
    if state.strategies().find_by_id(strategy_id).await?.is_none() {
        return Err(ApiError::not_found("Strategy not found"));
    }

    let task = state
        .backtests()
        .create(NewBacktest {
            name: name.to_string(),
            strategy_id,
            config_id,
            timeframe,
            timerange_start: optional_date(body.timerange_start.as_deref(), "timerangeStart")?,
            timerange_end: optional_date(body.timerange_end.as_deref(), "timerangeEnd")?,
        })
        .await
        .or_internal("Failed to create backtest")?;

    state
        .queue
        .enqueue(QueueJob::backtest(task.id.as_str()))
        .await
        .or_internal("Failed to create backtest")?;
    info!(backtest_id = %task.id, "Backtest queued");

    let created = state
        .backtests()
        .find_with_relations(&task.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Backtest not found"))?;
    Ok(Json(created))
}

pub async fn get_backtest(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<BacktestWithRelations>> {
    state
        .backtests()
        .find_with_relations(&id)
        .await
        .or_internal("Failed to fetch backtest")?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Backtest not found"))
}

pub async fn retry_backtest(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<backtest_tasks::Model>> {
    let task = state
        .backtests()
        .find_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Backtest not found"))?;

    let task = state
        .backtests()
        .reset_for_retry(task)
        .await
        .or_internal("Failed to retry backtest")?;
    state.cache.on_backtest_update(&task.id).await;

    state
        .queue
        .enqueue(QueueJob::backtest(task.id.as_str()))
        .await
        .or_internal("Failed to retry backtest")?;
    info!(backtest_id = %task.id, "Backtest re-queued");

    Ok(Json(task))
}

pub async fn stream_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let Some(task) = state.backtests().find_by_id(&id).await? else {
        return Ok((StatusCode::NOT_FOUND, "Backtest task not found").into_response());
    };
    let greeting = task.logs.trim().is_empty().then_some(BACKTEST_GREETING);
    let stream = sse::relay(state.log_bus.as_ref(), backtest_channel(&id), greeting).await?;
    Ok(stream.into_response())
}

pub async fn queue_plot(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let task = state
        .backtests()
        .find_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Backtest task not found"))?;
    if task.raw_output_path.as_deref().map_or(true, str::is_empty) {
        return Err(ApiError::bad_request("Backtest result file not found"));
    }

    state
        .queue
        .enqueue(QueueJob::plot(task.id.as_str()))
        .await
        .or_internal("Failed to queue plot generation")?;
    info!(backtest_id = %task.id, "Plot generation queued");

    Ok(Json(json!({ "message": "Plot generation task queued" })))
}

pub async fn stream_plot_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    if state.backtests().find_by_id(&id).await?.is_none() {
        return Ok((StatusCode::NOT_FOUND, "Backtest task not found").into_response());
    }
    let stream = sse::relay(state.log_bus.as_ref(), plot_channel(&id), None).await?;
    Ok(stream.into_response())
}

fn pairs_failure(status: StatusCode, error: &str) -> Response {
    (status, Json(json!({ "success": false, "error": error }))).into_response()
}

pub async fn available_pairs(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    if Uuid::parse_str(&id).is_err() {
        return Ok(pairs_failure(StatusCode::BAD_REQUEST, "Invalid request parameters"));
    }

    if let Some(cached) = state.cache.available_pairs(&id).await {
        debug!(backtest_id = %id, "Available pairs served from cache");
        return Ok(Json(json!({ "success": true, "data": cached, "cached": true })).into_response());
    }

    if state.backtests().find_by_id(&id).await?.is_none() {
        return Ok(pairs_failure(StatusCode::NOT_FOUND, "Backtest not found"));
    }

    let pairs = AvailablePairs::from_pairs(
        state
            .backtests()
            .traded_pairs(&id)
            .await
            .or_internal("Failed to fetch available trading pairs")?,
    );
    state.cache.store_available_pairs(&id, &pairs).await;

    Ok(Json(json!({ "success": true, "data": pairs, "cached": false })).into_response())
}

pub async fn chart_data(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ChartQuery>,
) -> ApiResult<Json<Value>> {
    let pair = query
        .pair
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Pair parameter is required"))?;
    let timeframe = query
        .timeframe
        .filter(|tf| !tf.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CHART_TIMEFRAME.to_string());

    let task = state
        .backtests()
        .find_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Backtest not found"))?;

    let cacheable = task.status == TaskStatus::Completed;
    if cacheable {
        if let Some(cached) = state.cache.chart_data(&id, &pair, &timeframe).await {
            return Ok(Json(cached));
        }
    }

    let from_task_file = task
        .candle_data_file
        .as_deref()
        .filter(|f| !f.is_empty())
        .and_then(|f| read_candles(&state.user_data.resolve(f), task.timerange_start, task.timerange_end));
    let candles = from_task_file
        .or_else(|| {
            read_candles(
                &state.user_data.candle_file_for_pair(&pair, &timeframe),
                task.timerange_start,
                task.timerange_end,
            )
        })
        .unwrap_or_default();

    let trades = state
        .backtests()
        .trades(&id, Some(&pair))
        .await
        .or_internal("Failed to fetch chart data")?;

    let data = json!({
        "candles": candles,
        "trades": trades,
        "timeframe": timeframe,
        "pair": pair,
    });
    if cacheable {
        state.cache.store_chart_data(&id, &pair, &timeframe, &data).await;
    }
    Ok(Json(data))
}
