use axum::extract::{Multipart, Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared::entity::configs;
use shared::freqtrade::{clean_imported_config, config_display_name, is_plain_filename};
use tracing::{info, warn};

use crate::error::{is_unique_violation, ApiError, ApiResult, OrInternal};
use crate::extract::{parse_id, ApiJson};
use crate::repositories::{ConfigChanges, NewConfig};
use crate::state::AppState;

const DUPLICATE_NAME: &str = "A configuration with this name already exists.";

#[derive(Debug, Deserialize)]
pub struct UpdateConfigRequest {
    name: Option<String>,
    description: Option<String>,
    data: Option<Value>,
}

impl From<UpdateConfigRequest> for ConfigChanges {
    fn from(body: UpdateConfigRequest) -> Self {
        ConfigChanges {
            name: body.name.filter(|n| !n.trim().is_empty()),
            description: body.description.filter(|d| !d.trim().is_empty()),
            data: body.data.filter(|d| !d.is_null()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    filenames: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScannedConfig {
    filename: String,
    name: String,
    timeframe: String,
    exchange: String,
    size: u64,
    last_modified: Option<DateTime<Utc>>,
}

fn import_description() -> String {
    format!("Imported from user_data on {}", Utc::now().format("%Y-%m-%d"))
}

pub async fn list_configs(State(state): State<AppState>) -> ApiResult<Json<Vec<configs::Model>>> {
    let configs = state
        .configs()
        .list()
        .await
        .or_internal("Failed to fetch configs")?;
    Ok(Json(configs))
}

pub async fn upload_config(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<configs::Model>> {
    let mut upload: Option<(String, Vec<u8>)> = None;
    let mut description: Option<String> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                upload = Some((filename, field.bytes().await?.to_vec()));
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
    let data: Value = serde_json::from_slice(&bytes)
        .map_err(|e| ApiError::bad_request_with("Invalid JSON format in config file", e.to_string()))?;

    if state.configs().find_by_filename(&filename).await?.is_some() {
        return Err(ApiError::conflict(
            "Configuration file already exists",
            "A configuration with this filename already exists.",
        ));
    }

    let dir = state.user_data.configs_dir();
    tokio::fs::create_dir_all(&dir)
        .await
        .or_internal("Failed to upload config")?;
    tokio::fs::write(dir.join(&filename), &bytes)
        .await
        .or_internal("Failed to upload config")?;

    let config = state
        .configs()
        .create(NewConfig {
            name: Some(config_display_name(&data, &filename)),
            filename,
            description,
            data,
        })
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ApiError::conflict("Failed to upload config", DUPLICATE_NAME)
            } else {
                ApiError::internal("Failed to upload config", e)
            }
        })?;
    info!(config = %config.filename, "Config uploaded");

    Ok(Json(config))
}

async fn find_config(state: &AppState, raw_id: &str) -> ApiResult<configs::Model> {
    let id = parse_id(raw_id)?;
    state
        .configs()
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Configuration not found"))
}

pub async fn get_config(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let config = find_config(&state, &id).await?;
    Ok(Json(json!({
        "success": true,
        "data": config,
        "message": "Configuration retrieved successfully",
    })))
}

pub async fn update_config(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<UpdateConfigRequest>,
) -> ApiResult<Json<Value>> {
    let id = parse_id(&id)?;
    let changes = ConfigChanges::from(body);
    if changes.is_empty() {
        return Err(ApiError::bad_request(
            "No fields to update. Provide name, description, or data.",
        ));
    }

    let config = state
        .configs()
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Configuration not found"))?;

    if let Some(name) = changes.name.as_deref() {
        if state.configs().name_taken(name, Some(id)).await? {
            return Err(ApiError::conflict("Failed to update configuration", DUPLICATE_NAME));
        }
    }

    let updated = state
        .configs()
        .update(config, changes)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ApiError::conflict("Failed to update configuration", DUPLICATE_NAME)
            } else {
                ApiError::internal("Failed to update configuration", e)
            }
        })?;

    Ok(Json(json!({
        "success": true,
        "data": updated,
        "message": "Configuration updated successfully",
    })))
}

pub async fn delete_config(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let config = find_config(&state, &id).await?;

    let backtests = state.backtests().count_for_config(config.id).await?;
    let hyperopts = state.hyperopts().count_for_config(config.id).await?;
    if backtests + hyperopts > 0 {
        return Err(ApiError::bad_request_with(
            "Configuration is still in use",
            json!({ "backtestTasks": backtests, "hyperoptTasks": hyperopts }),
        ));
    }

    state
        .configs()
        .delete(config.id)
        .await
        .or_internal("Failed to delete configuration")?;
    info!(config = %config.filename, "Config deleted");

    Ok(Json(json!({
        "success": true,
        "message": "Configuration deleted successfully",
    })))
}

/// `.json` files in the configs directory that parse and are not registered yet.
pub async fn scan_configs(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let registered = state.configs().registered_filenames().await?;
    let mut files = Vec::new();

    match tokio::fs::read_dir(state.user_data.configs_dir()).await {
        Ok(mut entries) => {
            while let Ok(Some(entry)) = entries.next_entry().await {
                let filename = entry.file_name().to_string_lossy().into_owned();
                if !filename.ends_with(".json") {
                    continue;
                }
                let metadata = match entry.metadata().await {
                    Ok(metadata) if metadata.is_file() => metadata,
                    _ => continue,
                };
                let Some(parsed) = tokio::fs::read_to_string(entry.path())
                    .await
                    .ok()
                    .and_then(|content| serde_json::from_str::<Value>(&content).ok())
                else {
                    continue;
                };
                let text = |value: Option<&Value>| {
                    value
                        .and_then(Value::as_str)
                        .unwrap_or("N/A")
                        .to_string()
                };
                files.push(ScannedConfig {
                    name: config_display_name(&parsed, &filename),
                    timeframe: text(parsed.get("timeframe")),
                    exchange: text(parsed.get("exchange").and_then(|e| e.get("name"))),
                    filename,
                    size: metadata.len(),
                    last_modified: metadata.modified().ok().map(DateTime::<Utc>::from),
                });
            }
        }
        Err(e) => warn!("Error scanning config files: {}", e),
    }
    files.sort_by(|a, b| a.filename.cmp(&b.filename));

    let total = files.len();
    let available: Vec<ScannedConfig> = files
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
        "message": "Configuration files scanned successfully",
    })))
}

pub async fn import_configs(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ImportRequest>,
) -> ApiResult<Json<Value>> {
    let filenames = body
        .filenames
        .filter(|f| !f.is_empty())
        .ok_or_else(|| ApiError::bad_request("No filenames provided for import"))?;
    let total = filenames.len();
    let description = import_description();

    let mut imported = Vec::new();
    let mut errors = Vec::new();
    for filename in filenames {
        match import_one(&state, &filename, &description).await {
            Ok(config) => imported.push(config),
            Err(error) => errors.push(json!({ "filename": filename, "error": error })),
        }
    }
    info!(imported = imported.len(), total = total, "Config import finished");

    Ok(Json(json!({
        "success": true,
        "data": {
            "imported": imported.len(),
            "total": total,
            "configs": imported,
            "errors": errors,
        },
        "message": format!("Successfully imported {} of {} configurations", imported.len(), total),
    })))
}

/// Registers one config file; the error string is reported back per file.
async fn import_one(
    state: &AppState,
    filename: &str,
    description: &str,
) -> Result<configs::Model, String> {
    if !is_plain_filename(filename) {
        return Err("Invalid filename".to_string());
    }
    let content = tokio::fs::read_to_string(state.user_data.config_path(filename))
        .await
        .map_err(|e| e.to_string())?;
    let parsed: Value = serde_json::from_str(&content)
        .map_err(|_| "Invalid JSON format in config file".to_string())?;

    let has_timeframe = parsed
        .get("timeframe")
        .and_then(Value::as_str)
        .is_some_and(|tf| !tf.trim().is_empty());
    if !has_timeframe {
        return Err("Missing required field: timeframe".to_string());
    }

    let configs = state.configs();
    if configs
        .find_by_filename(filename)
        .await
        .map_err(|e| e.to_string())?
        .is_some()
    {
        return Err("Configuration already exists in database".to_string());
    }

    let name = config_display_name(&parsed, filename);
    configs
        .create(NewConfig {
            name: Some(name),
            filename: filename.to_string(),
            description: Some(description.to_string()),
            data: clean_imported_config(parsed),
        })
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                DUPLICATE_NAME.to_string()
            } else {
                e.to_string()
            }
        })
}
