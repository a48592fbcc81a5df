use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use shared::entity::hyperopt_tasks;
use shared::freqtrade::{apply_hyperopt_params, backup_path, parse_hyperopt_results};
use shared::log_stream::hyperopt_channel;
use shared::{FlexibleId, QueueJob, TaskStatus};
use std::io::ErrorKind;
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult, OrInternal};
use crate::extract::{parse_optional_id, ApiJson};
use crate::repositories::{HyperoptWithRelations, NewHyperopt};
use crate::sse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    strategy_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateHyperoptRequest {
    strategy_id: Option<FlexibleId>,
    config_id: Option<FlexibleId>,
    epochs: Option<FlexibleId>,
    spaces: Option<String>,
    loss_function: Option<String>,
    timerange: Option<String>,
    job_workers: Option<FlexibleId>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub async fn list_hyperopts(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<HyperoptWithRelations>>> {
    let strategy_id = parse_optional_id(query.strategy_id.as_deref())?;
    let hyperopts = state
        .hyperopts()
        .list(strategy_id)
        .await
        .or_internal("Failed to fetch hyperopts")?;
    Ok(Json(hyperopts))
}

pub async fn create_hyperopt(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CreateHyperoptRequest>,
) -> ApiResult<Json<HyperoptWithRelations>> {
    let missing = || ApiError::bad_request("Missing required fields");
    let strategy_id = body.strategy_id.as_ref().ok_or_else(missing)?;
    let config_id = body.config_id.as_ref().ok_or_else(missing)?;
    let epochs = body.epochs.as_ref().ok_or_else(missing)?;
    let spaces = non_empty(body.spaces).ok_or_else(missing)?;
    let loss_function = non_empty(body.loss_function).ok_or_else(missing)?;

    let strategy_id = strategy_id
        .as_i32()
        .ok_or_else(|| ApiError::bad_request("Invalid ID format"))?;
    let config_id = config_id
        .as_i32()
        .ok_or_else(|| ApiError::bad_request("Invalid ID format"))?;
    let epochs = epochs
        .as_i32()
        .filter(|e| *e > 0)
        .ok_or_else(|| ApiError::bad_request("Epochs must be a positive integer"))?;
    let job_workers = match &body.job_workers {
        Some(workers) => Some(
            workers
                .as_i32()
                .ok_or_else(|| ApiError::bad_request("Job workers must be an integer"))?,
        ),
        None => None,
    };

    if state.strategies().find_by_id(strategy_id).await?.is_none() {
        return Err(ApiError::not_found("Strategy not found"));
    }
    if state.configs().find_by_id(config_id).await?.is_none() {
        return Err(ApiError::not_found("Configuration not found"));
    }

    let task = state
        .hyperopts()
        .create(NewHyperopt {
            strategy_id,
            config_id,
            epochs,
            spaces,
            loss_function,
            timerange: non_empty(body.timerange),
            job_workers,
        })
        .await
        .or_internal("Failed to create hyperopt")?;

    state
        .queue
        .enqueue(QueueJob::hyperopt(task.id.as_str()))
        .await
        .or_internal("Failed to create hyperopt")?;
    info!(hyperopt_id = %task.id, epochs = epochs, "Hyperopt queued");

    state
        .hyperopts()
        .find_with_relations(&task.id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Hyperopt task not found"))
}

async fn find_task(state: &AppState, id: &str) -> ApiResult<hyperopt_tasks::Model> {
    state
        .hyperopts()
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Hyperopt task not found"))
}

pub async fn get_hyperopt(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<HyperoptWithRelations>> {
    state
        .hyperopts()
        .find_with_relations(&id)
        .await
        .or_internal("Failed to fetch hyperopt")?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Hyperopt task not found"))
}

pub async fn delete_hyperopt(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    find_task(&state, &id).await?;
    let removed = state
        .hyperopts()
        .delete_with_generated(&id)
        .await
        .or_internal("Failed to delete hyperopt")?;
    state.cache.bulk_invalidate(&removed).await;
    Ok(Json(json!({ "success": true })))
}

pub async fn retry_hyperopt(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<hyperopt_tasks::Model>> {
    let task = find_task(&state, &id).await?;

    if let Some(log_path) = task.log_path.as_deref().filter(|p| !p.is_empty()) {
        let path = state.user_data.resolve(log_path);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => info!("Removed old hyperopt log {}", path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove old hyperopt log {}: {}", path.display(), e),
        }
    }

    let task = state
        .hyperopts()
        .reset_for_retry(task)
        .await
        .or_internal("Failed to retry hyperopt")?;
    state
        .queue
        .enqueue(QueueJob::hyperopt(task.id.as_str()))
        .await
        .or_internal("Failed to retry hyperopt")?;
    info!(hyperopt_id = %task.id, "Hyperopt re-queued");

    Ok(Json(task))
}

/// Contents of the worker's log file. Missing or unreadable files read as empty.
pub async fn get_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let task = find_task(&state, &id).await?;
    let logs = match task.log_path.as_deref().filter(|p| !p.is_empty()) {
        Some(log_path) => tokio::fs::read_to_string(state.user_data.resolve(log_path))
            .await
            .unwrap_or_default(),
        None => String::new(),
    };
    Ok(Json(json!({ "logs": logs })))
}

pub async fn stream_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    if state.hyperopts().find_by_id(&id).await?.is_none() {
        return Ok((StatusCode::NOT_FOUND, "Hyperopt task not found").into_response());
    }
    let stream = sse::relay(state.log_bus.as_ref(), hyperopt_channel(&id), None).await?;
    Ok(stream.into_response())
}

pub async fn get_results(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let task = find_task(&state, &id).await?;
    let results_path = task
        .results_path
        .as_deref()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::not_found("Results not available"))?;
    if task.status != TaskStatus::Completed {
        return Err(ApiError::bad_request("Hyperopt task not completed"));
    }

    let content = tokio::fs::read_to_string(state.user_data.resolve(results_path))
        .await
        .or_internal("Failed to read hyperopt results")?;
    let results = parse_hyperopt_results(&content).or_internal("Failed to parse hyperopt results")?;
    Ok(Json(json!(results)))
}

pub async fn download_results(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let results_path = state
        .hyperopts()
        .find_by_id(&id)
        .await?
        .and_then(|task| task.results_path)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::not_found("File not found"))?;

    let path = state.user_data.resolve(&results_path);
    let bytes = tokio::fs::read(&path)
        .await
        .or_internal("Failed to download file")?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "hyperopt_results.fthypt".to_string());

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        bytes,
    )
        .into_response())
}

/// Writes the best epoch's parameters into the strategy file after taking a backup.
pub async fn apply_results(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let task = find_task(&state, &id).await?;
    if task.status != TaskStatus::Completed {
        return Err(ApiError::bad_request("Hyperopt task not completed"));
    }
    let best = task
        .best_result
        .as_ref()
        .ok_or_else(|| ApiError::not_found("Best result not available"))?;
    let strategy = state
        .strategies()
        .find_by_id(task.strategy_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Strategy not found"))?;

    let strategy_path = state.user_data.strategy_path(&strategy.filename);
    let source = tokio::fs::read_to_string(&strategy_path)
        .await
        .or_internal("Failed to read strategy file")?;

    let backup = backup_path(&strategy_path, Utc::now());
    if let Err(e) = tokio::fs::write(&backup, &source).await {
        warn!("Failed to write strategy backup {}: {}", backup.display(), e);
    }

    let params = best.get("params").cloned().unwrap_or_else(|| json!({}));
    let updated = apply_hyperopt_params(&source, &params)
        .or_internal("Failed to apply hyperopt results")?;
    tokio::fs::write(&strategy_path, updated)
        .await
        .or_internal("Failed to write strategy file")?;
    info!(hyperopt_id = %task.id, strategy = %strategy.filename, "Applied optimized parameters");

    Ok(Json(json!({
        "success": true,
        "message": "Optimized parameters applied to strategy",
        "backupPath": backup.to_string_lossy(),
    })))
}
