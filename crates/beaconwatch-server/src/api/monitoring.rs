//! Monitoring control API endpoints.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use beaconwatch_core::MonitoringStatus;

use crate::api::error::{ApiResult, ErrorResponse};
use crate::state::SharedState;

/// Creates the monitoring router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/start", post(start_monitoring))
        .route("/stop", post(stop_monitoring))
        .route("/status", get(get_status))
        .route("/refresh", post(refresh_status))
}

/// Start monitoring every registered region.
#[utoipa::path(
    post,
    path = "/api/monitoring/start",
    tag = "monitoring",
    operation_id = "startMonitoring",
    summary = "Start monitoring",
    description = "Starts monitoring every registered region, and ranging for regions that \
        have it enabled. Fails when the platform cannot monitor or location access is denied.",
    responses(
        (status = 200, description = "Monitoring started", body = MonitoringStatus),
        (status = 403, description = "Location access denied", body = ErrorResponse),
        (status = 503, description = "Monitoring unavailable", body = ErrorResponse)
    )
)]
pub async fn start_monitoring(
    State(state): State<SharedState>,
) -> ApiResult<Json<MonitoringStatus>> {
    state.manager.start_monitoring().await?;
    Ok(Json(state.manager.status().await?))
}

/// Stop monitoring every registered region.
#[utoipa::path(
    post,
    path = "/api/monitoring/stop",
    tag = "monitoring",
    operation_id = "stopMonitoring",
    summary = "Stop monitoring",
    description = "Stops monitoring and ranging for every region. Regions stay registered.",
    responses(
        (status = 200, description = "Monitoring stopped", body = MonitoringStatus),
        (status = 503, description = "Manager stopped", body = ErrorResponse)
    )
)]
pub async fn stop_monitoring(
    State(state): State<SharedState>,
) -> ApiResult<Json<MonitoringStatus>> {
    state.manager.stop_monitoring().await?;
    Ok(Json(state.manager.status().await?))
}

/// Current monitoring status.
#[utoipa::path(
    get,
    path = "/api/monitoring/status",
    tag = "monitoring",
    operation_id = "getMonitoringStatus",
    summary = "Get monitoring status",
    responses(
        (status = 200, description = "Current status", body = MonitoringStatus),
        (status = 503, description = "Manager stopped", body = ErrorResponse)
    )
)]
pub async fn get_status(State(state): State<SharedState>) -> ApiResult<Json<MonitoringStatus>> {
    Ok(Json(state.manager.status().await?))
}

/// Re-report authorization and radio state to the observer.
#[utoipa::path(
    post,
    path = "/api/monitoring/refresh",
    tag = "monitoring",
    operation_id = "refreshStatus",
    summary = "Refresh status notifications",
    description = "Pushes the current authorization and radio state to the notification log.",
    responses(
        (status = 200, description = "Status refreshed", body = MonitoringStatus),
        (status = 503, description = "Manager stopped", body = ErrorResponse)
    )
)]
pub async fn refresh_status(
    State(state): State<SharedState>,
) -> ApiResult<Json<MonitoringStatus>> {
    Ok(Json(state.manager.request_update_for_status().await?))
}
