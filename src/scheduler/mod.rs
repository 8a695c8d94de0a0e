//! Health check scheduling and execution
//!
//! ## Lifecycle of an association
//!
//! ```text
//! Unscheduled ──schedule──> Scheduled ──dispatch──> Executing
//!                              ^                        │
//!                              └────────────────────────┘
//!        (disabled / deleted / orphaned) ──> Removed
//! ```
//!
//! Timers belong to the [`JobQueue`]: the scheduler registers one recurring
//! job per enabled association (id `healthcheck:{config_id}:{system_id}`) and
//! executes whatever the queue dispatches.
//!
//! ## Failure handling
//!
//! - probe or config failures are stored as `unhealthy` runs
//! - catalog failures are logged
//! - only a malformed job payload fails the job

pub mod catalog;
mod status;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::HealthStatus;
use crate::checks::CheckOutcome;
use crate::queue::{ConsumeOptions, Job, JobHandler, JobQueue, QueueError, RecurringJobOptions};
use crate::registry::Registry;
use crate::storage::{CheckConfigurationRow, ConfigStore, RunRow, StorageError};

pub use catalog::{HttpCatalog, NullCatalog, SystemCatalog};
pub use status::{CheckStatus, SystemStatus, reduce_statuses, system_status};

/// Prefix shared by all recurring health check job ids
pub const JOB_ID_PREFIX: &str = "healthcheck:";

/// Consumer group the executor attaches as
pub const CONSUMER_GROUP: &str = "health-checks";

/// Deterministic recurring job id of an association
pub fn job_id(config_id: &str, system_id: &str) -> String {
    format!("{JOB_ID_PREFIX}{config_id}:{system_id}")
}

/// Payload of a recurring health check job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckJob {
    pub config_id: String,
    pub system_id: String,
}

/// Scheduling state of one association
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Unscheduled,
    Scheduled,
    Executing,
    Removed,
}

/// Outcome of [`HealthCheckScheduler::bootstrap`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BootstrapReport {
    pub scheduled: usize,
    pub orphans_cancelled: usize,
}

/// Error surfaced to the queue by the job executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    MalformedPayload(String),
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobError::MalformedPayload(msg) => write!(f, "malformed health check payload: {}", msg),
        }
    }
}

impl std::error::Error for JobError {}

/// Errors while (un)scheduling associations
#[derive(Debug)]
pub enum SchedulerError {
    Storage(StorageError),
    Queue(QueueError),
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerError::Storage(err) => write!(f, "scheduler storage error: {}", err),
            SchedulerError::Queue(err) => write!(f, "scheduler queue error: {}", err),
        }
    }
}

impl std::error::Error for SchedulerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SchedulerError::Storage(err) => Some(err),
            SchedulerError::Queue(err) => Some(err),
        }
    }
}

impl From<StorageError> for SchedulerError {
    fn from(err: StorageError) -> Self {
        SchedulerError::Storage(err)
    }
}

impl From<QueueError> for SchedulerError {
    fn from(err: QueueError) -> Self {
        SchedulerError::Queue(err)
    }
}

/// Delay before the first run after a restart.
///
/// If the last run is more recent than one interval, wait for the remainder
/// of that interval; otherwise (or without any prior run) start immediately.
pub fn compute_start_delay(
    last_run: Option<DateTime<Utc>>,
    interval_secs: u64,
    now: DateTime<Utc>,
) -> u64 {
    let Some(last_run) = last_run else {
        return 0;
    };

    let elapsed = (now - last_run).num_seconds().max(0) as u64;
    interval_secs.saturating_sub(elapsed)
}

/// Schedules and executes recurring health checks
pub struct HealthCheckScheduler {
    store: Arc<dyn ConfigStore>,
    registry: Arc<Registry>,
    queue: Arc<dyn JobQueue>,
    catalog: Arc<dyn SystemCatalog>,
    states: Mutex<HashMap<String, JobState>>,
}

impl HealthCheckScheduler {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        registry: Arc<Registry>,
        queue: Arc<dyn JobQueue>,
        catalog: Arc<dyn SystemCatalog>,
    ) -> Self {
        Self {
            store,
            registry,
            queue,
            catalog,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Current state of an association's job
    pub async fn job_state(&self, config_id: &str, system_id: &str) -> JobState {
        self.states
            .lock()
            .await
            .get(&job_id(config_id, system_id))
            .copied()
            .unwrap_or(JobState::Unscheduled)
    }

    async fn set_state(&self, job_id: &str, state: JobState) {
        self.states.lock().await.insert(job_id.to_string(), state);
    }

    /// Attach the executor as the queue's consumer
    pub async fn start_consumer(self: &Arc<Self>) -> Result<(), QueueError> {
        let scheduler = Arc::clone(self);
        let handler: JobHandler = Arc::new(move |job: Job| {
            let scheduler = Arc::clone(&scheduler);
            async move {
                scheduler.execute_job(&job.payload).await?;
                Ok::<(), anyhow::Error>(())
            }
            .boxed()
        });

        self.queue
            .consume(
                handler,
                ConsumeOptions {
                    consumer_group: CONSUMER_GROUP.to_string(),
                    max_retries: 0,
                },
            )
            .await
    }

    /// Re-create recurring jobs for all enabled associations and cancel orphans
    pub async fn bootstrap(&self) -> Result<BootstrapReport, SchedulerError> {
        self.bootstrap_at(Utc::now()).await
    }

    /// [`bootstrap`](Self::bootstrap) with an explicit clock
    #[instrument(skip(self))]
    pub async fn bootstrap_at(&self, now: DateTime<Utc>) -> Result<BootstrapReport, SchedulerError> {
        let enabled = self.store.enabled_checks().await?;
        let mut expected = HashSet::with_capacity(enabled.len());
        let mut report = BootstrapReport::default();

        for check in &enabled {
            let configuration = &check.configuration;
            let last_run = self
                .store
                .latest_run(&configuration.id, &check.system_id)
                .await?
                .map(|run| run.timestamp);
            let start_delay_secs = compute_start_delay(last_run, configuration.interval_secs, now);

            let id = job_id(&configuration.id, &check.system_id);
            match self
                .schedule(configuration, &check.system_id, start_delay_secs)
                .await
            {
                Ok(()) => report.scheduled += 1,
                Err(QueueError::InvalidOptions(msg)) => {
                    warn!(job_id = %id, "skipping association with invalid schedule: {msg}");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
            expected.insert(id);
        }

        for job in self.queue.list_recurring_jobs().await? {
            if !job.job_id.starts_with(JOB_ID_PREFIX) || expected.contains(&job.job_id) {
                continue;
            }
            if self.queue.cancel_recurring(&job.job_id).await? {
                info!(job_id = %job.job_id, "cancelled orphaned health check job");
                self.set_state(&job.job_id, JobState::Removed).await;
                report.orphans_cancelled += 1;
            }
        }

        info!(
            scheduled = report.scheduled,
            orphans_cancelled = report.orphans_cancelled,
            "health check scheduler bootstrapped"
        );
        Ok(report)
    }

    /// Start checking a newly enabled association right away
    #[instrument(skip(self, configuration), fields(config_id = %configuration.id))]
    pub async fn schedule_association(
        &self,
        configuration: &CheckConfigurationRow,
        system_id: &str,
    ) -> Result<(), SchedulerError> {
        self.schedule(configuration, system_id, 0).await?;
        Ok(())
    }

    /// Stop checking a disabled or deleted association. Returns whether a job existed.
    #[instrument(skip(self))]
    pub async fn unschedule_association(
        &self,
        config_id: &str,
        system_id: &str,
    ) -> Result<bool, SchedulerError> {
        let id = job_id(config_id, system_id);
        let existed = self.queue.cancel_recurring(&id).await?;
        self.set_state(&id, JobState::Removed).await;
        debug!(job_id = %id, existed, "association unscheduled");
        Ok(existed)
    }

    async fn schedule(
        &self,
        configuration: &CheckConfigurationRow,
        system_id: &str,
        start_delay_secs: u64,
    ) -> Result<(), QueueError> {
        let id = job_id(&configuration.id, system_id);
        let payload = json!(HealthCheckJob {
            config_id: configuration.id.clone(),
            system_id: system_id.to_string(),
        });

        self.queue
            .schedule_recurring(
                payload,
                RecurringJobOptions {
                    job_id: id.clone(),
                    interval_secs: configuration.interval_secs,
                    start_delay_secs,
                },
            )
            .await?;

        debug!(
            job_id = %id,
            interval_secs = configuration.interval_secs,
            start_delay_secs,
            "health check scheduled"
        );
        self.set_state(&id, JobState::Scheduled).await;
        Ok(())
    }

    /// Execute one dispatched health check job
    #[instrument(skip(self, payload))]
    pub async fn execute_job(&self, payload: &Value) -> Result<(), JobError> {
        let job: HealthCheckJob = serde_json::from_value(payload.clone())
            .map_err(|e| JobError::MalformedPayload(e.to_string()))?;

        let configuration = match self
            .store
            .find_enabled_check(&job.config_id, &job.system_id)
            .await
        {
            Ok(Some(configuration)) => configuration,
            Ok(None) => {
                debug!(
                    config_id = %job.config_id,
                    system_id = %job.system_id,
                    "association missing or disabled, skipping run"
                );
                return Ok(());
            }
            Err(e) => {
                warn!(config_id = %job.config_id, system_id = %job.system_id, error = %e, "failed to load check");
                return Ok(());
            }
        };

        let Some(strategy) = self.registry.strategy(&configuration.strategy_id) else {
            warn!(
                strategy_id = %configuration.strategy_id,
                config_id = %configuration.id,
                "no strategy registered for check"
            );
            return Ok(());
        };

        let id = job_id(&job.config_id, &job.system_id);
        self.set_state(&id, JobState::Executing).await;

        let outcome = match strategy.validate_config(&configuration.config) {
            Ok(()) => strategy.execute(&configuration.config).await,
            Err(e) => Err(e.into()),
        };

        let run = match outcome {
            Ok(outcome) => successful_run(&job, outcome),
            Err(e) => {
                warn!(config_id = %job.config_id, system_id = %job.system_id, error = %e, "health check failed");
                RunRow {
                    config_id: job.config_id.clone(),
                    system_id: job.system_id.clone(),
                    status: HealthStatus::Unhealthy.to_string(),
                    latency_ms: None,
                    result: json!({ "error": e.to_string() }),
                    timestamp: Utc::now(),
                }
            }
        };

        debug!(status = %run.status, latency_ms = ?run.latency_ms, "health check completed");
        if let Err(e) = self.store.insert_run(run).await {
            warn!(config_id = %job.config_id, system_id = %job.system_id, error = %e, "failed to store run");
        }

        self.propagate_system_status(&job.system_id).await;

        let mut states = self.states.lock().await;
        if states.get(&id) == Some(&JobState::Executing) {
            states.insert(id, JobState::Scheduled);
        }

        Ok(())
    }

    /// Recompute a system's status and push it to the catalog.
    ///
    /// Returns the pushed status, or `None` if it could not be derived.
    #[instrument(skip(self))]
    pub async fn propagate_system_status(&self, system_id: &str) -> Option<HealthStatus> {
        let status = match system_status(self.store.as_ref(), system_id).await {
            Ok(status) => status.status,
            Err(e) => {
                warn!(system_id, error = %e, "failed to derive system status");
                return None;
            }
        };

        if let Err(e) = self.catalog.update_system_status(system_id, status).await {
            warn!(system_id, %status, error = %e, "failed to propagate system status");
        }

        Some(status)
    }
}

fn successful_run(job: &HealthCheckJob, outcome: CheckOutcome) -> RunRow {
    let mut result = outcome.result;
    if let (Some(message), Some(object)) = (outcome.message, result.as_object_mut()) {
        object.entry("message").or_insert(Value::String(message));
    }

    RunRow {
        config_id: job.config_id.clone(),
        system_id: job.system_id.clone(),
        status: outcome.status.to_string(),
        latency_ms: outcome.latency_ms,
        result,
        timestamp: Utc::now(),
    }
}
