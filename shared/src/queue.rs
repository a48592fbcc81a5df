//! Job queue client
//!
//! Long-running work is not executed here. Each job carries only the id of the
//! database record; the external worker that consumes a queue loads the record
//! itself and moves it through RUNNING to COMPLETED or FAILED.

use anyhow::{Context, Result};
use apalis::prelude::*;
use apalis_redis::RedisStorage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::{debug, info};

pub const BACKTEST_QUEUE: &str = "backtest";
pub const HYPEROPT_QUEUE: &str = "hyperopt";
pub const PLOT_QUEUE: &str = "plot";
pub const DATA_DOWNLOAD_QUEUE: &str = "dataDownload";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestJob {
    pub task_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HyperoptJob {
    pub task_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlotJob {
    pub task_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataDownloadJob {
    pub job_id: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueueJob {
    Backtest(BacktestJob),
    Hyperopt(HyperoptJob),
    Plot(PlotJob),
    DataDownload(DataDownloadJob),
}

impl QueueJob {
    pub fn backtest(task_id: impl Into<String>) -> Self {
        QueueJob::Backtest(BacktestJob { task_id: task_id.into() })
    }

    pub fn hyperopt(task_id: impl Into<String>) -> Self {
        QueueJob::Hyperopt(HyperoptJob { task_id: task_id.into() })
    }

    pub fn plot(task_id: impl Into<String>) -> Self {
        QueueJob::Plot(PlotJob { task_id: task_id.into() })
    }

    pub fn data_download(job_id: i32) -> Self {
        QueueJob::DataDownload(DataDownloadJob { job_id })
    }

    pub fn queue_name(&self) -> &'static str {
        match self {
            QueueJob::Backtest(_) => BACKTEST_QUEUE,
            QueueJob::Hyperopt(_) => HYPEROPT_QUEUE,
            QueueJob::Plot(_) => PLOT_QUEUE,
            QueueJob::DataDownload(_) => DATA_DOWNLOAD_QUEUE,
        }
    }

    /// Id of the record the job refers to, for logging.
    pub fn record_id(&self) -> String {
        match self {
            QueueJob::Backtest(job) => job.task_id.clone(),
            QueueJob::Hyperopt(job) => job.task_id.clone(),
            QueueJob::Plot(job) => job.task_id.clone(),
            QueueJob::DataDownload(job) => job.job_id.to_string(),
        }
    }
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: QueueJob) -> Result<()>;
}

/// Pushes jobs onto Apalis Redis storages, one namespace per queue name.
#[derive(Clone)]
pub struct RedisJobQueue {
    backtest: RedisStorage<BacktestJob>,
    hyperopt: RedisStorage<HyperoptJob>,
    plot: RedisStorage<PlotJob>,
    data_download: RedisStorage<DataDownloadJob>,
}

impl RedisJobQueue {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let conn = apalis_redis::connect(redis_url.to_string())
            .await
            .context("Failed to connect job queue to Redis")?;

        let queue = Self {
            backtest: RedisStorage::new_with_config(
                conn.clone(),
                apalis_redis::Config::default().set_namespace(BACKTEST_QUEUE),
            ),
            hyperopt: RedisStorage::new_with_config(
                conn.clone(),
                apalis_redis::Config::default().set_namespace(HYPEROPT_QUEUE),
            ),
            plot: RedisStorage::new_with_config(
                conn.clone(),
                apalis_redis::Config::default().set_namespace(PLOT_QUEUE),
            ),
            data_download: RedisStorage::new_with_config(
                conn,
                apalis_redis::Config::default().set_namespace(DATA_DOWNLOAD_QUEUE),
            ),
        };
        info!("Job queue storages initialized");
        Ok(queue)
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, job: QueueJob) -> Result<()> {
        let queue = job.queue_name();
        let record_id = job.record_id();

        match job {
            QueueJob::Backtest(payload) => {
                let mut storage = self.backtest.clone();
                storage
                    .push(payload)
                    .await
                    .with_context(|| format!("Failed to enqueue {} job", queue))?;
            }
            QueueJob::Hyperopt(payload) => {
                let mut storage = self.hyperopt.clone();
                storage
                    .push(payload)
                    .await
                    .with_context(|| format!("Failed to enqueue {} job", queue))?;
            }
            QueueJob::Plot(payload) => {
                let mut storage = self.plot.clone();
                storage
                    .push(payload)
                    .await
                    .with_context(|| format!("Failed to enqueue {} job", queue))?;
            }
            QueueJob::DataDownload(payload) => {
                let mut storage = self.data_download.clone();
                storage
                    .push(payload)
                    .await
                    .with_context(|| format!("Failed to enqueue {} job", queue))?;
            }
        }

        debug!(queue = queue, record_id = %record_id, "Job enqueued");
        Ok(())
    }
}

/// Keeps enqueued jobs in memory instead of sending them anywhere.
#[derive(Default)]
pub struct RecordingJobQueue {
    jobs: Mutex<Vec<QueueJob>>,
}

impl RecordingJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs(&self) -> Vec<QueueJob> {
        self.jobs.lock().map(|jobs| jobs.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl JobQueue for RecordingJobQueue {
    async fn enqueue(&self, job: QueueJob) -> Result<()> {
        self.jobs
            .lock()
            .map_err(|_| anyhow::anyhow!("job recorder lock poisoned"))?
            .push(job);
        Ok(())
    }
}
