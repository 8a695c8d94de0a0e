//! Job queue abstraction
//!
//! The scheduler never owns timers. It registers recurring jobs with a
//! [`JobQueue`] and attaches a single consumer that executes whatever the
//! queue dispatches.
//!
//! ## Semantics
//!
//! - Recurring jobs are keyed by id; scheduling an existing id replaces it.
//! - The first dispatch happens after `start_delay_secs`, then every
//!   `interval_secs`. Missed ticks are skipped, never bursted.
//! - A failing handler is retried up to `max_retries` times, then dropped.

mod memory;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use memory::MemoryQueue;

/// How a recurring job is dispatched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurringJobOptions {
    pub job_id: String,
    pub interval_secs: u64,
    pub start_delay_secs: u64,
}

/// How a consumer processes dispatched jobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumeOptions {
    pub consumer_group: String,
    pub max_retries: u32,
}

/// A recurring job known to the queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurringJobInfo {
    pub job_id: String,
    pub interval_secs: u64,
    pub start_delay_secs: u64,
}

/// A single dispatch of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub payload: Value,

    /// Zero for the first attempt, incremented per retry
    pub attempt: u32,
}

/// Callback executing one dispatched job
pub type JobHandler = Arc<dyn Fn(Job) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Errors from queue operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// A consumer is already attached (carries the existing consumer group)
    ConsumerAttached(String),

    /// The queue has been shut down
    Closed,

    /// Options rejected by the queue
    InvalidOptions(String),
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::ConsumerAttached(group) => {
                write!(f, "a consumer is already attached (group '{}')", group)
            }
            QueueError::Closed => write!(f, "queue is closed"),
            QueueError::InvalidOptions(msg) => write!(f, "invalid queue options: {}", msg),
        }
    }
}

impl std::error::Error for QueueError {}

/// Queue service with recurring-job support
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Create or replace the recurring job `options.job_id`
    async fn schedule_recurring(
        &self,
        payload: Value,
        options: RecurringJobOptions,
    ) -> Result<(), QueueError>;

    /// Attach `handler` as the consumer for dispatched jobs
    async fn consume(&self, handler: JobHandler, options: ConsumeOptions) -> Result<(), QueueError>;

    async fn list_recurring_jobs(&self) -> Result<Vec<RecurringJobInfo>, QueueError>;

    /// Cancel a recurring job. Returns whether it existed.
    async fn cancel_recurring(&self, job_id: &str) -> Result<bool, QueueError>;
}
