//! Response cache
//!
//! Cached values are JSON strings with a TTL. A failing cache never fails the
//! caller: `BacktestCache` logs the error and behaves as if the key was absent.

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::models::AvailablePairs;
use crate::redis::{get_redis_client, get_redis_connection};

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);
pub const AVAILABLE_PAIRS_TTL: Duration = Duration::from_secs(600);
pub const CHART_DATA_TTL: Duration = DEFAULT_TTL;
const SCAN_BATCH: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total_keys: u64,
    pub memory_usage: String,
    pub connected: bool,
}

impl CacheStats {
    pub fn disconnected() -> Self {
        Self {
            total_keys: 0,
            memory_usage: "unknown".to_string(),
            connected: false,
        }
    }
}

#[async_trait]
pub trait ResponseCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    /// Deletes every key matching a glob pattern, returning how many went.
    async fn clear_pattern(&self, pattern: &str) -> Result<u64>;
    async fn stats(&self) -> Result<CacheStats>;
}

pub struct RedisCache {
    conn: MultiplexedConnection,
}

impl RedisCache {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = get_redis_client(redis_url)?;
        let conn = get_redis_connection(&client).await?;
        info!("Response cache connected to Redis");
        Ok(Self { conn })
    }
}

#[async_trait]
impl ResponseCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await.context("Redis GET failed")?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(key, value, ttl.as_secs().max(1))
            .await
            .context("Redis SETEX failed")?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await.context("Redis DEL failed")?;
        Ok(())
    }

    async fn clear_pattern(&self, pattern: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let mut keys: Vec<String> = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .cursor_arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .context("Redis SCAN failed")?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        if keys.is_empty() {
            return Ok(0);
        }
        let removed: u64 = conn.del(&keys).await.context("Redis DEL failed")?;
        Ok(removed)
    }

    async fn stats(&self) -> Result<CacheStats> {
        let mut conn = self.conn.clone();
        let total_keys: u64 = redis::cmd("DBSIZE")
            .query_async(&mut conn)
            .await
            .context("Redis DBSIZE failed")?;
        let info: String = redis::cmd("INFO")
            .arg("memory")
            .query_async(&mut conn)
            .await
            .context("Redis INFO failed")?;

        Ok(CacheStats {
            total_keys,
            memory_usage: parse_used_memory(&info).unwrap_or_else(|| "unknown".to_string()),
            connected: true,
        })
    }
}

fn parse_used_memory(info: &str) -> Option<String> {
    info.lines()
        .find_map(|line| line.trim().strip_prefix("used_memory_human:"))
        .map(|v| v.trim().to_string())
}

/// Process-local cache used when running without Redis and in tests.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, (String, Instant)>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory cache lock poisoned"))
    }
}

#[async_trait]
impl ResponseCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.lock()?;
        match entries.get(key) {
            Some((value, expires)) if *expires > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.lock()?
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    async fn clear_pattern(&self, pattern: &str) -> Result<u64> {
        let mut entries = self.lock()?;
        let before = entries.len();
        entries.retain(|key, _| !glob_match(pattern, key));
        Ok((before - entries.len()) as u64)
    }

    async fn stats(&self) -> Result<CacheStats> {
        let now = Instant::now();
        let entries = self.lock()?;
        let live = entries.values().filter(|(_, expires)| *expires > now).count();
        let bytes: usize = entries.iter().map(|(k, (v, _))| k.len() + v.len()).sum();
        Ok(CacheStats {
            total_keys: live as u64,
            memory_usage: format!("{}B", bytes),
            connected: true,
        })
    }
}

/// Redis-style glob matching, `*` and `?` only.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

pub fn available_pairs_key(backtest_id: &str) -> String {
    format!("available-pairs:{}", backtest_id)
}

pub fn chart_data_key(backtest_id: &str, pair: &str, timeframe: &str) -> String {
    format!("chart-data:{}:{}:{}", backtest_id, pair, timeframe)
}

/// Typed access to the backtest-related cache entries.
#[derive(Clone)]
pub struct BacktestCache {
    inner: Arc<dyn ResponseCache>,
}

impl BacktestCache {
    pub fn new(inner: Arc<dyn ResponseCache>) -> Self {
        Self { inner }
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.inner.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    debug!(key = key, "Cache hit");
                    Some(value)
                }
                Err(e) => {
                    warn!(key = key, "Discarding unreadable cache entry: {}", e);
                    None
                }
            },
            Ok(None) => {
                debug!(key = key, "Cache miss");
                None
            }
            Err(e) => {
                warn!(key = key, "Cache read failed: {:#}", e);
                None
            }
        }
    }

    async fn put_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = key, "Cannot serialize cache entry: {}", e);
                return;
            }
        };
        if let Err(e) = self.inner.set(key, &raw, ttl).await {
            warn!(key = key, "Cache write failed: {:#}", e);
        }
    }

    async fn delete_quietly(&self, key: &str) {
        if let Err(e) = self.inner.delete(key).await {
            warn!(key = key, "Cache delete failed: {:#}", e);
        }
    }

    async fn clear_quietly(&self, pattern: &str) {
        match self.inner.clear_pattern(pattern).await {
            Ok(n) if n > 0 => debug!(pattern = pattern, removed = n, "Cache entries cleared"),
            Ok(_) => {}
            Err(e) => warn!(pattern = pattern, "Cache pattern clear failed: {:#}", e),
        }
    }

    pub async fn available_pairs(&self, backtest_id: &str) -> Option<AvailablePairs> {
        self.get_json(&available_pairs_key(backtest_id)).await
    }

    pub async fn store_available_pairs(&self, backtest_id: &str, pairs: &AvailablePairs) {
        self.put_json(&available_pairs_key(backtest_id), pairs, AVAILABLE_PAIRS_TTL)
            .await
    }

    pub async fn chart_data(
        &self,
        backtest_id: &str,
        pair: &str,
        timeframe: &str,
    ) -> Option<serde_json::Value> {
        self.get_json(&chart_data_key(backtest_id, pair, timeframe))
            .await
    }

    pub async fn store_chart_data(
        &self,
        backtest_id: &str,
        pair: &str,
        timeframe: &str,
        data: &serde_json::Value,
    ) {
        self.put_json(&chart_data_key(backtest_id, pair, timeframe), data, CHART_DATA_TTL)
            .await
    }

    /// Called when a backtest record changes (retry, status update).
    pub async fn on_backtest_update(&self, backtest_id: &str) {
        self.delete_quietly(&available_pairs_key(backtest_id)).await;
        self.clear_quietly(&format!("chart-data:{}:*", backtest_id))
            .await;
        info!(backtest_id = backtest_id, "Invalidated backtest cache");
    }

    pub async fn on_trades_update(&self, backtest_id: &str) {
        self.delete_quietly(&available_pairs_key(backtest_id)).await;
        self.clear_quietly(&format!("trades:{}:*", backtest_id)).await;
        info!(backtest_id = backtest_id, "Invalidated trade cache");
    }

    pub async fn bulk_invalidate(&self, backtest_ids: &[String]) {
        for id in backtest_ids {
            self.on_backtest_update(id).await;
        }
    }

    pub async fn stats(&self) -> CacheStats {
        match self.inner.stats().await {
            Ok(stats) => stats,
            Err(e) => {
                warn!("Cache stats unavailable: {:#}", e);
                CacheStats::disconnected()
            }
        }
    }
}
