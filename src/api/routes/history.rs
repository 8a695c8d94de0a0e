//! Bucketed history endpoint

use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::api::{error::ApiResult, state::ApiState, types::HistoryResponse};
use crate::history::{HistoryQuery, fetch_history};

/// Default lookback period (24 hours)
const DEFAULT_LOOKBACK_HOURS: i64 = 24;

/// Default bucket size (1 hour)
const DEFAULT_INTERVAL_SECS: u64 = 3600;

/// Query parameters for history
#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    interval_secs: Option<u64>,
}

/// GET /api/v1/checks/{config_id}/systems/{system_id}/history
///
/// Query params:
/// - start: Start time (ISO 8601, default: end - 24h)
/// - end: End time (ISO 8601, default: now)
/// - interval_secs: Bucket size (default: 3600)
pub async fn get_history(
    State(state): State<ApiState>,
    Path((config_id, system_id)): Path<(String, String)>,
    Query(params): Query<HistoryParams>,
) -> ApiResult<Json<HistoryResponse>> {
    let end = params.end.unwrap_or_else(Utc::now);
    let start = params
        .start
        .unwrap_or_else(|| end - Duration::hours(DEFAULT_LOOKBACK_HOURS));
    let interval_secs = params.interval_secs.unwrap_or(DEFAULT_INTERVAL_SECS);

    let query = HistoryQuery {
        config_id,
        system_id,
        start,
        end,
        interval_secs,
    };

    let buckets = fetch_history(state.store.as_ref(), &state.registry, &query).await?;

    Ok(Json(HistoryResponse {
        config_id: query.config_id,
        system_id: query.system_id,
        start,
        end,
        interval_secs,
        buckets,
    }))
}
