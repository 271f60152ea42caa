//! Platform event injection.
//!
//! Lets an external scanner, or a test harness, feed platform callbacks into
//! the manager the same way the built-in Bluetooth scanner does.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use beaconwatch_core::PlatformEvent;

use crate::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::state::SharedState;

/// Creates the platform router.
pub fn router() -> Router<SharedState> {
    Router::new().route("/events", post(post_event))
}

/// Queue a platform event for the manager.
#[utoipa::path(
    post,
    path = "/api/platform/events",
    tag = "platform",
    operation_id = "postPlatformEvent",
    summary = "Inject a platform event",
    description = "Queues a radio, authorization, enter/exit, ranging or monitoring-failure \
        event. Events are processed in order; unknown region identifiers are ignored.",
    request_body = PlatformEvent,
    responses(
        (status = 202, description = "Event queued"),
        (status = 503, description = "Manager stopped", body = ErrorResponse)
    )
)]
pub async fn post_event(
    State(state): State<SharedState>,
    Json(event): Json<PlatformEvent>,
) -> ApiResult<StatusCode> {
    tracing::debug!(?event, "Platform event injected");
    if state.sink.deliver(event) {
        Ok(StatusCode::ACCEPTED)
    } else {
        Err(ApiError::service_unavailable(
            "SERVICE_STOPPED",
            "Region manager service has stopped",
        ))
    }
}
