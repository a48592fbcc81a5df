use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use shared::CacheStats;

use crate::state::AppState;

pub const SERVICE_NAME: &str = "freqdash-api";

pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": SERVICE_NAME,
        "uptimeSeconds": state.start_time.elapsed().as_secs(),
    }))
}

/// Key count and memory usage of the response cache. Reports
/// `connected: false` instead of failing when Redis is unreachable.
pub async fn cache_stats(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.cache.stats().await)
}
