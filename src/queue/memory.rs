//! In-process queue driven by Tokio tasks
//!
//! Each recurring job is a task ticking a `tokio::time::interval` and pushing
//! [`Job`]s into an unbounded channel. The consumer drains the channel and
//! runs every job on its own task, so a slow probe never delays another.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, sleep};
use tracing::{debug, error, info, warn};

use super::{
    ConsumeOptions, Job, JobHandler, JobQueue, QueueError, RecurringJobInfo, RecurringJobOptions,
};

struct RecurringEntry {
    info: RecurringJobInfo,
    handle: JoinHandle<()>,
}

struct Consumer {
    group: String,
    handle: JoinHandle<()>,
}

/// In-memory [`JobQueue`]. Nothing survives a restart.
pub struct MemoryQueue {
    sender: mpsc::UnboundedSender<Job>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Job>>>,
    recurring: Mutex<HashMap<String, RecurringEntry>>,
    consumer: Mutex<Option<Consumer>>,
    closed: AtomicBool,
}

impl MemoryQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
            recurring: Mutex::new(HashMap::new()),
            consumer: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Stop all recurring jobs and the consumer. Jobs already running finish.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);

        let mut recurring = self.recurring.lock().await;
        for (_, entry) in recurring.drain() {
            entry.handle.abort();
        }

        if let Some(consumer) = self.consumer.lock().await.take() {
            consumer.handle.abort();
        }

        info!("memory queue shut down");
    }

    fn ensure_open(&self) -> Result<(), QueueError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Closed);
        }
        Ok(())
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MemoryQueue {
    fn drop(&mut self) {
        for entry in self.recurring.get_mut().values() {
            entry.handle.abort();
        }
        if let Some(consumer) = self.consumer.get_mut() {
            consumer.handle.abort();
        }
    }
}

fn spawn_recurring(
    sender: mpsc::UnboundedSender<Job>,
    payload: Value,
    options: RecurringJobOptions,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if options.start_delay_secs > 0 {
            sleep(Duration::from_secs(options.start_delay_secs)).await;
        }

        let mut ticker = interval(Duration::from_secs(options.interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            let job = Job {
                id: options.job_id.clone(),
                payload: payload.clone(),
                attempt: 0,
            };
            if sender.send(job).is_err() {
                debug!(job_id = %options.job_id, "queue receiver dropped, stopping recurring job");
                break;
            }
        }
    })
}

async fn run_with_retries(handler: JobHandler, mut job: Job, max_retries: u32) {
    loop {
        match handler(job.clone()).await {
            Ok(()) => return,
            Err(e) if job.attempt < max_retries => {
                warn!(job_id = %job.id, attempt = job.attempt, error = %e, "job failed, retrying");
                job.attempt += 1;
            }
            Err(e) => {
                error!(job_id = %job.id, attempt = job.attempt, error = %e, "job failed");
                return;
            }
        }
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn schedule_recurring(
        &self,
        payload: Value,
        options: RecurringJobOptions,
    ) -> Result<(), QueueError> {
        self.ensure_open()?;

        if options.interval_secs == 0 {
            return Err(QueueError::InvalidOptions(format!(
                "job '{}' has a zero interval",
                options.job_id
            )));
        }

        let info = RecurringJobInfo {
            job_id: options.job_id.clone(),
            interval_secs: options.interval_secs,
            start_delay_secs: options.start_delay_secs,
        };
        let handle = spawn_recurring(self.sender.clone(), payload, options);

        let mut recurring = self.recurring.lock().await;
        if let Some(previous) = recurring.insert(info.job_id.clone(), RecurringEntry { info, handle }) {
            debug!(job_id = %previous.info.job_id, "replacing recurring job");
            previous.handle.abort();
        }

        Ok(())
    }

    async fn consume(&self, handler: JobHandler, options: ConsumeOptions) -> Result<(), QueueError> {
        self.ensure_open()?;

        let mut consumer = self.consumer.lock().await;
        if let Some(existing) = consumer.as_ref() {
            return Err(QueueError::ConsumerAttached(existing.group.clone()));
        }

        let mut receiver = self.receiver.lock().await.take().ok_or(QueueError::Closed)?;

        let max_retries = options.max_retries;
        let group = options.consumer_group.clone();
        let handle = tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                debug!(job_id = %job.id, "dispatching job");
                tokio::spawn(run_with_retries(handler.clone(), job, max_retries));
            }
            debug!(consumer_group = %group, "queue channel closed, consumer exiting");
        });

        info!(consumer_group = %options.consumer_group, "consumer attached");
        *consumer = Some(Consumer {
            group: options.consumer_group,
            handle,
        });

        Ok(())
    }

    async fn list_recurring_jobs(&self) -> Result<Vec<RecurringJobInfo>, QueueError> {
        let recurring = self.recurring.lock().await;
        let mut jobs: Vec<RecurringJobInfo> = recurring.values().map(|e| e.info.clone()).collect();
        jobs.sort_by(|a, b| a.job_id.cmp(&b.job_id));
        Ok(jobs)
    }

    async fn cancel_recurring(&self, job_id: &str) -> Result<bool, QueueError> {
        let mut recurring = self.recurring.lock().await;
        match recurring.remove(job_id) {
            Some(entry) => {
                entry.handle.abort();
                debug!(job_id, "recurring job cancelled");
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
