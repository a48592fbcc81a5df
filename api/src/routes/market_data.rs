use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared::entity::{data_download_jobs, market_data};
use shared::freqtrade::{data_file_time_range, is_plain_filename, parse_data_filename};
use shared::log_stream::data_download_channel;
use shared::QueueJob;
use tracing::{info, warn};

use crate::error::{is_unique_violation, ApiError, ApiResult, OrInternal};
use crate::extract::{parse_id, ApiJson};
use crate::repositories::{series_key, NewDataDownloadJob, NewMarketData};
use crate::routes::backtests::optional_date;
use crate::sse;
use crate::state::AppState;

const DEFAULT_MARKET_TYPE: &str = "spot";

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    search: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    exchange: Option<String>,
    pairs: Option<Value>,
    timeframes: Option<Value>,
    market_type: Option<String>,
    timerange_start: Option<String>,
    timerange_end: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    files: Option<Vec<ImportFile>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportFile {
    #[serde(default)]
    filename: String,
    exchange: Option<String>,
    pair: Option<String>,
    timeframe: Option<String>,
    format: Option<String>,
    market_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScannedDataFile {
    filename: String,
    exchange: String,
    pair: String,
    timeframe: String,
    format: String,
    market_type: String,
    size: u64,
    last_modified: Option<DateTime<Utc>>,
}

pub async fn list_market_data(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Vec<market_data::Model>>> {
    let rows = state
        .market_data()
        .search(query.search.as_deref())
        .await
        .or_internal("Failed to fetch market data")?;
    Ok(Json(rows))
}

pub async fn delete_market_data(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let id = parse_id(&id)?;
    let row = state
        .market_data()
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Market data not found"))?;

    if let Some(file_path) = row.file_path.as_deref().filter(|p| !p.is_empty()) {
        let path = state.user_data.resolve(file_path);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            warn!("Failed to delete data file {}: {}", path.display(), e);
        }
    }

    state
        .market_data()
        .delete(id)
        .await
        .or_internal("Failed to delete market data")?;
    info!(pair = %row.pair, timeframe = %row.timeframe, "Market data deleted");

    Ok(Json(json!({ "message": "Market data deleted successfully" })))
}

/// Accepts a JSON array of strings or a comma separated string.
fn string_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::String(s) => Some(
            s.split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect(),
        ),
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_str().map(|s| s.trim().to_string()))
            .collect(),
        _ => None,
    }
}

pub async fn create_download_job(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<DownloadRequest>,
) -> ApiResult<Json<data_download_jobs::Model>> {
    let exchange = body.exchange.as_deref().map(str::trim).unwrap_or_default();
    let (Some(pairs), Some(timeframes)) = (body.pairs.as_ref(), body.timeframes.as_ref()) else {
        return Err(ApiError::bad_request("Missing required parameters"));
    };
    if exchange.is_empty() || pairs.is_null() || timeframes.is_null() {
        return Err(ApiError::bad_request("Missing required parameters"));
    }

    // Only pairs may arrive as a comma separated string.
    let pairs = string_list(pairs)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::bad_request("Pairs must be a non-empty array"))?;
    let timeframes = timeframes
        .is_array()
        .then(|| string_list(timeframes))
        .flatten()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::bad_request("Timeframes must be a non-empty array"))?;

    let market_type = body
        .market_type
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_MARKET_TYPE.to_string());

    let job = state
        .market_data()
        .create_download_job(NewDataDownloadJob {
            exchange: exchange.to_string(),
            pairs,
            timeframes,
            market_type,
            timerange_start: optional_date(body.timerange_start.as_deref(), "timerangeStart")?,
            timerange_end: optional_date(body.timerange_end.as_deref(), "timerangeEnd")?,
        })
        .await
        .or_internal("Failed to create download job")?;

    state
        .queue
        .enqueue(QueueJob::data_download(job.id))
        .await
        .or_internal("Failed to create download job")?;
    info!(job_id = job.id, exchange = %job.exchange, "Data download queued");

    Ok(Json(job))
}

pub async fn stream_download_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let id = parse_id(&id)?;
    if state.market_data().find_download_job(id).await?.is_none() {
        return Ok((StatusCode::NOT_FOUND, "Download job not found").into_response());
    }
    let stream = sse::relay(state.log_bus.as_ref(), data_download_channel(id), None).await?;
    Ok(stream.into_response())
}

/// Candle files under `data/<exchange>/` whose series is not registered yet.
pub async fn scan_data_files(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let registered = state.market_data().registered_series().await?;
    let mut files = Vec::new();

    match tokio::fs::read_dir(state.user_data.data_dir()).await {
        Ok(mut exchanges) => {
            while let Ok(Some(exchange_dir)) = exchanges.next_entry().await {
                if !exchange_dir.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                    continue;
                }
                let exchange = exchange_dir.file_name().to_string_lossy().into_owned();
                let Ok(mut entries) = tokio::fs::read_dir(exchange_dir.path()).await else {
                    continue;
                };
                while let Ok(Some(entry)) = entries.next_entry().await {
                    let metadata = match entry.metadata().await {
                        Ok(metadata) if metadata.is_file() => metadata,
                        _ => continue,
                    };
                    let filename = entry.file_name().to_string_lossy().into_owned();
                    let Some(parsed) = parse_data_filename(&filename) else {
                        continue;
                    };
                    files.push(ScannedDataFile {
                        filename,
                        exchange: exchange.clone(),
                        pair: parsed.pair,
                        timeframe: parsed.timeframe,
                        format: parsed.format,
                        market_type: DEFAULT_MARKET_TYPE.to_string(),
                        size: metadata.len(),
                        last_modified: metadata.modified().ok().map(DateTime::<Utc>::from),
                    });
                }
            }
        }
        Err(e) => warn!("Error scanning data files: {}", e),
    }
    files.sort_by(|a, b| (&a.exchange, &a.filename).cmp(&(&b.exchange, &b.filename)));

    let total = files.len();
    let available: Vec<ScannedDataFile> = files
        .into_iter()
        .filter(|f| !registered.contains(&series_key(&f.exchange, &f.pair, &f.timeframe, &f.market_type)))
        .collect();

    Ok(Json(json!({
        "success": true,
        "data": {
            "total": total,
            "available": available.len(),
            "existing": registered.len(),
            "files": available,
        },
        "message": "Data files scanned successfully",
    })))
}

pub async fn import_data_files(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ImportRequest>,
) -> ApiResult<Json<Value>> {
    let files = body
        .files
        .filter(|f| !f.is_empty())
        .ok_or_else(|| ApiError::bad_request("No files provided for import"))?;
    let total = files.len();

    let mut imported = Vec::new();
    let mut errors = Vec::new();
    for file in files {
        let filename = file.filename.clone();
        match import_one(&state, file).await {
            Ok(row) => imported.push(row),
            Err(error) => errors.push(json!({ "filename": filename, "error": error })),
        }
    }
    info!(imported = imported.len(), total = total, "Market data import finished");

    Ok(Json(json!({
        "success": true,
        "data": {
            "imported": imported.len(),
            "total": total,
            "marketData": imported,
            "errors": errors,
        },
        "message": format!("Successfully imported {} of {} market data entries", imported.len(), total),
    })))
}

async fn import_one(state: &AppState, file: ImportFile) -> Result<market_data::Model, String> {
    let field = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
    let (Some(exchange), Some(pair), Some(timeframe), Some(format)) = (
        field(file.exchange),
        field(file.pair),
        field(file.timeframe),
        field(file.format),
    ) else {
        return Err("Missing required fields: exchange, pair, timeframe, or format".to_string());
    };
    let market_type = field(file.market_type).unwrap_or_else(|| DEFAULT_MARKET_TYPE.to_string());

    if !is_plain_filename(&exchange) || !is_plain_filename(&file.filename) {
        return Err("File not found in data directory".to_string());
    }
    let path = state.user_data.data_dir().join(&exchange).join(&file.filename);
    let is_file = tokio::fs::metadata(&path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false);
    if !is_file {
        return Err("File not found in data directory".to_string());
    }

    let repo = state.market_data();
    if repo
        .series_exists(&exchange, &pair, &timeframe, &market_type)
        .await
        .map_err(|e| e.to_string())?
    {
        return Err("Market data already exists in database".to_string());
    }

    let (start_time, end_time) = data_file_time_range(&path, &format);
    repo.create(NewMarketData {
        exchange,
        pair,
        timeframe,
        market_type,
        file_path: Some(path.to_string_lossy().into_owned()),
        start_time,
        end_time,
    })
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            "Market data already exists in database".to_string()
        } else {
            e.to_string()
        }
    })
}
