//! API response types

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::history::HistoryBucket;

/// Response for `GET /api/v1/health`
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,

    /// Whether the storage backend reports itself operational
    pub storage_healthy: bool,
}

/// Response for the history endpoint
#[derive(Debug, Clone, Serialize)]
pub struct HistoryResponse {
    pub config_id: String,
    pub system_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub interval_secs: u64,
    pub buckets: Vec<HistoryBucket>,
}
