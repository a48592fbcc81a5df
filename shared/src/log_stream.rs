//! Worker log relay
//!
//! Workers publish log lines on a Redis channel per task. Each HTTP client that
//! follows a task gets its own subscription; dropping the returned stream
//! closes that subscription.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::redis::{get_redis_client, Redis};

pub fn backtest_channel(task_id: &str) -> String {
    format!("logs:{}", task_id)
}

pub fn plot_channel(task_id: &str) -> String {
    format!("logs:{}:plot", task_id)
}

pub fn hyperopt_channel(task_id: &str) -> String {
    format!("hyperopt-logs:{}", task_id)
}

pub fn data_download_channel(job_id: i32) -> String {
    format!("logs:{}", job_id)
}

/// Payload of one SSE `data:` line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogFrame {
    pub log: String,
    pub timestamp: String,
}

impl LogFrame {
    pub fn now(log: impl Into<String>) -> Self {
        Self {
            log: log.into(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

#[async_trait]
pub trait LogBus: Send + Sync {
    async fn subscribe(&self, channel: &str) -> Result<BoxStream<'static, String>>;
}

pub struct RedisLogBus {
    client: Redis,
}

impl RedisLogBus {
    pub fn new(redis_url: &str) -> Result<Self> {
        Ok(Self {
            client: get_redis_client(redis_url)?,
        })
    }
}

/// Lives inside the subscription stream; its drop marks the teardown.
struct SubscriptionGuard {
    channel: String,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        info!(channel = %self.channel, "Log stream client disconnected, unsubscribed");
    }
}

#[async_trait]
impl LogBus for RedisLogBus {
    async fn subscribe(&self, channel: &str) -> Result<BoxStream<'static, String>> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .context("Failed to open Redis pub/sub connection")?;
        pubsub
            .subscribe(channel)
            .await
            .with_context(|| format!("Failed to subscribe to {}", channel))?;
        info!(channel = channel, "Subscribed to log channel");

        let guard = SubscriptionGuard {
            channel: channel.to_string(),
        };
        let stream = pubsub.into_on_message().filter_map(move |msg| {
            let channel = &guard.channel;
            let payload = match msg.get_payload::<String>() {
                Ok(payload) => Some(payload),
                Err(e) => {
                    warn!(channel = %channel, "Dropping non-text log message: {}", e);
                    None
                }
            };
            futures::future::ready(payload)
        });

        Ok(stream.boxed())
    }
}

/// Replays messages queued with [`MemoryLogBus::publish`] and then ends.
#[derive(Default)]
pub struct MemoryLogBus {
    channels: Mutex<HashMap<String, Vec<String>>>,
}

impl MemoryLogBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, channel: &str, message: impl Into<String>) {
        if let Ok(mut channels) = self.channels.lock() {
            channels
                .entry(channel.to_string())
                .or_default()
                .push(message.into());
        }
    }
}

#[async_trait]
impl LogBus for MemoryLogBus {
    async fn subscribe(&self, channel: &str) -> Result<BoxStream<'static, String>> {
        let messages = self
            .channels
            .lock()
            .map_err(|_| anyhow::anyhow!("log bus lock poisoned"))?
            .remove(channel)
            .unwrap_or_default();
        debug!(channel = channel, count = messages.len(), "Replaying buffered log messages");
        Ok(stream::iter(messages).boxed())
    }
}
