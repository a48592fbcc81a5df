use axum::extract::{Multipart, Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared::entity::strategies;
use shared::freqtrade::{extract_class_name, is_plain_filename};
use tracing::{info, warn};

use crate::error::{is_unique_violation, ApiError, ApiResult, OrInternal};
use crate::extract::{parse_id, ApiJson};
use crate::state::AppState;

const DUPLICATE_DETAILS: &str = "A strategy with this filename already exists.";
const NO_CLASS_DETAILS: &str =
    r#"Could not parse the class name from the strategy file. Please ensure it follows the format "class YourStrategyName(IStrategy):"."#;

#[derive(Debug, Deserialize)]
pub struct UpdateContentRequest {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    filenames: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScannedStrategy {
    filename: String,
    class_name: Option<String>,
    size: u64,
    last_modified: Option<DateTime<Utc>>,
}

pub async fn list_strategies(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let strategies = state
        .strategies()
        .list_with_counts()
        .await
        .or_internal("Failed to fetch strategies")?;
    Ok(Json(json!({
        "success": true,
        "data": strategies,
        "message": "Strategies list retrieved successfully",
    })))
}

pub async fn upload_strategy(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<strategies::Model>> {
    let mut upload: Option<(String, Vec<u8>)> = None;
    let mut description: Option<String> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await?;
                upload = Some((filename, bytes.to_vec()));
            }
            Some("description") => {
                description = Some(field.text().await?).filter(|d| !d.trim().is_empty());
            }
            _ => {}
        }
    }

    let (filename, bytes) = upload.ok_or_else(|| ApiError::bad_request("No file provided"))?;
    if !is_plain_filename(&filename) {
        return Err(ApiError::bad_request("Invalid filename"));
    }

    if state.strategies().find_by_filename(&filename).await?.is_some() {
        return Err(ApiError::conflict("Strategy file already exists", DUPLICATE_DETAILS));
    }

    let class_name = extract_class_name(&String::from_utf8_lossy(&bytes))
        .ok_or_else(|| ApiError::bad_request_with("Could not parse class name", NO_CLASS_DETAILS))?;

    // The row goes in first so a rejected upload never touches the file on disk.
    let strategy = match state
        .strategies()
        .create(&filename, &class_name, description)
        .await
    {
        Ok(strategy) => strategy,
        Err(e) if is_unique_violation(&e) => {
            return Err(ApiError::conflict("Strategy file already exists", DUPLICATE_DETAILS))
        }
        Err(e) => return Err(ApiError::internal("Failed to upload strategy", e)),
    };

    let dir = state.user_data.strategies_dir();
    let written = match tokio::fs::create_dir_all(&dir).await {
        Ok(()) => tokio::fs::write(dir.join(&filename), &bytes).await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        if let Err(cleanup) = state.strategies().delete(strategy.id).await {
            warn!("Failed to remove strategy record {} after write error: {:#}", strategy.id, cleanup);
        }
        return Err(ApiError::internal("Failed to upload strategy", e));
    }
    info!(strategy = %strategy.filename, class = %strategy.class_name, "Strategy uploaded");

    Ok(Json(strategy))
}

pub async fn delete_strategy(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let id = parse_id(&id)?;
    let strategy = state
        .strategies()
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Strategy not found"))?;

    let counts = state.strategies().counts(id).await?;
    if counts.backtest_tasks > 0 {
        return Err(ApiError::bad_request(format!(
            "Cannot delete strategy: it is referenced by {} backtest task(s)",
            counts.backtest_tasks
        )));
    }
    if counts.hyperopt_tasks > 0 {
        return Err(ApiError::bad_request(format!(
            "Cannot delete strategy: it is referenced by {} hyperopt task(s)",
            counts.hyperopt_tasks
        )));
    }

    let path = state.user_data.strategy_path(&strategy.filename);
    if tokio::fs::try_exists(&path).await.unwrap_or(false) {
        tokio::fs::remove_file(&path)
            .await
            .or_internal("Failed to delete strategy file")?;
    }
    state
        .strategies()
        .delete(id)
        .await
        .or_internal("Failed to delete strategy")?;
    info!(strategy = %strategy.filename, "Strategy deleted");

    Ok(Json(json!({ "message": "Strategy deleted successfully" })))
}

pub async fn get_content(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let id = parse_id(&id)?;
    let strategy = state
        .strategies()
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Strategy not found"))?;

    let content = tokio::fs::read_to_string(state.user_data.strategy_path(&strategy.filename))
        .await
        .or_internal("Failed to read strategy file")?;

    Ok(Json(json!({
        "id": strategy.id,
        "filename": strategy.filename,
        "className": strategy.class_name,
        "description": strategy.description,
        "content": content,
    })))
}

pub async fn update_content(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<UpdateContentRequest>,
) -> ApiResult<Json<Value>> {
    let id = parse_id(&id)?;
    let content = body
        .content
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Strategy content must not be empty"))?;
    let strategy = state
        .strategies()
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Strategy not found"))?;
    let class_name = extract_class_name(&content)
        .ok_or_else(|| ApiError::bad_request("Could not parse class name from strategy content"))?;

    tokio::fs::write(state.user_data.strategy_path(&strategy.filename), &content)
        .await
        .or_internal("Failed to write strategy file")?;

    let strategy = if class_name != strategy.class_name {
        state
            .strategies()
            .update_class_name(strategy, &class_name)
            .await
            .or_internal("Failed to save strategy")?
    } else {
        strategy
    };

    Ok(Json(json!({
        "id": strategy.id,
        "filename": strategy.filename,
        "className": strategy.class_name,
        "description": strategy.description,
        "message": "Strategy saved successfully",
    })))
}

/// `.py` files in the strategies directory that are not registered yet.
pub async fn scan_strategies(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let registered = state.strategies().registered_filenames().await?;
    let mut files = Vec::new();

    match tokio::fs::read_dir(state.user_data.strategies_dir()).await {
        Ok(mut entries) => {
            while let Ok(Some(entry)) = entries.next_entry().await {
                let filename = entry.file_name().to_string_lossy().into_owned();
                if !filename.ends_with(".py") {
                    continue;
                }
                let metadata = match entry.metadata().await {
                    Ok(metadata) if metadata.is_file() => metadata,
                    _ => continue,
                };
                let class_name = tokio::fs::read_to_string(entry.path())
                    .await
                    .ok()
                    .and_then(|content| extract_class_name(&content));
                files.push(ScannedStrategy {
                    filename,
                    class_name,
                    size: metadata.len(),
                    last_modified: metadata.modified().ok().map(DateTime::<Utc>::from),
                });
            }
        }
        Err(e) => warn!("Error scanning strategy files: {}", e),
    }
    files.sort_by(|a, b| a.filename.cmp(&b.filename));

    let total = files.len();
    let available: Vec<ScannedStrategy> = files
        .into_iter()
        .filter(|f| !registered.contains(&f.filename))
        .collect();

    Ok(Json(json!({
        "success": true,
        "data": {
            "total": total,
            "available": available.len(),
            "existing": registered.len(),
            "files": available,
        },
        "message": "Strategy files scanned successfully",
    })))
}

pub async fn import_strategies(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ImportRequest>,
) -> ApiResult<Json<Value>> {
    let filenames = body
        .filenames
        .filter(|f| !f.is_empty())
        .ok_or_else(|| ApiError::bad_request("No filenames provided for import"))?;
    let total = filenames.len();

    let mut errors: Vec<(String, String)> = Vec::new();
    let mut candidates = Vec::new();
    for filename in filenames {
        if !is_plain_filename(&filename) {
            errors.push((filename, "Invalid filename".to_string()));
            continue;
        }
        let content = match tokio::fs::read_to_string(state.user_data.strategy_path(&filename)).await {
            Ok(content) => content,
            Err(e) => {
                errors.push((filename, e.to_string()));
                continue;
            }
        };
        match extract_class_name(&content) {
            Some(class_name) => candidates.push((filename, class_name)),
            None => errors.push((
                filename,
                "Could not parse class name from strategy file".to_string(),
            )),
        }
    }

    let description = format!("Imported from user_data on {}", Utc::now().format("%Y-%m-%d"));
    let (imported, import_errors) = state
        .strategies()
        .import(candidates, &description)
        .await
        .or_internal("Failed to import strategies")?;
    errors.extend(import_errors);
    info!(imported = imported.len(), total = total, "Strategy import finished");

    let errors: Vec<Value> = errors
        .into_iter()
        .map(|(filename, error)| json!({ "filename": filename, "error": error }))
        .collect();

    Ok(Json(json!({
        "success": true,
        "data": {
            "imported": imported.len(),
            "total": total,
            "strategies": imported,
            "errors": errors,
        },
        "message": format!("Successfully imported {} of {} strategies", imported.len(), total),
    })))
}
