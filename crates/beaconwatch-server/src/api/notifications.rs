//! Notification log API endpoint.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::notifications::Notification;
use crate::state::SharedState;

const DEFAULT_LIMIT: usize = 100;

/// Creates the notifications router.
pub fn router() -> Router<SharedState> {
    Router::new().route("/", get(list_notifications))
}

/// Query parameters for polling notifications.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct NotificationQuery {
    /// Return only notifications with a greater sequence number.
    #[param(example = 0)]
    pub since: Option<u64>,

    /// Maximum number of notifications to return. Defaults to 100.
    #[param(example = 50)]
    pub limit: Option<usize>,
}

/// Notifications since the requested sequence.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NotificationsResponse {
    /// Notifications, oldest first.
    pub notifications: Vec<Notification>,

    /// Newest sequence number logged; pass as `since` to poll for more.
    #[schema(example = 42)]
    pub last_sequence: u64,
}

/// Poll the notification log.
#[utoipa::path(
    get,
    path = "/api/notifications",
    tag = "notifications",
    operation_id = "listNotifications",
    summary = "Poll notifications",
    description = "Returns recent radio, authorization, ranging, enter/exit and failure \
        notifications. Older entries are dropped once the log is full.",
    params(NotificationQuery),
    responses(
        (status = 200, description = "Notifications", body = NotificationsResponse)
    )
)]
pub async fn list_notifications(
    State(state): State<SharedState>,
    Query(query): Query<NotificationQuery>,
) -> Json<NotificationsResponse> {
    let notifications = state
        .notifications
        .since(query.since.unwrap_or(0), query.limit.unwrap_or(DEFAULT_LIMIT));

    Json(NotificationsResponse {
        notifications,
        last_sequence: state.notifications.last_sequence(),
    })
}
