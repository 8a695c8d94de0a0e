//! System status endpoint

use axum::{
    Json,
    extract::{Path, State},
};

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
};
use crate::scheduler::{SystemStatus, system_status};

/// GET /api/v1/systems/{system_id}/status
///
/// Reduced status of a system plus the latest status of each enabled check.
/// Returns 404 if no check is enabled for the system.
pub async fn get_system_status(
    State(state): State<ApiState>,
    Path(system_id): Path<String>,
) -> ApiResult<Json<SystemStatus>> {
    let status = system_status(state.store.as_ref(), &system_id).await?;

    if status.checks.is_empty() {
        return Err(ApiError::NotFound(format!(
            "no enabled checks for system '{}'",
            system_id
        )));
    }

    Ok(Json(status))
}
