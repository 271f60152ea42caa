//! OpenAPI specification generation for the beaconwatch API.

use axum::Json;
use beaconwatch_core::{
    AuthorizationStatus, BeaconObservation, ManagerConfig, MonitoringFailure, MonitoringStatus,
    PlatformEvent, RadioState, Region, RegionPhase,
};
use utoipa::OpenApi;

use super::error::ErrorResponse;
use super::health::HealthResponse;
use super::notifications::NotificationsResponse;
use super::regions::{
    ClearRegionsResponse, RegionListResponse, RegionResponse, RegisterRegionRequest,
    StartRegionListRequest,
};
use crate::notifications::{Notification, NotificationEvent};

/// Serve the OpenAPI specification as JSON at `/api/openapi.json`.
pub async fn get_openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Returns the OpenAPI specification as pretty JSON.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized.
pub fn get_openapi_json() -> serde_json::Result<String> {
    ApiDoc::openapi().to_pretty_json()
}

/// Main OpenAPI document structure for beaconwatch.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "beaconwatch API",
        version = "0.1.0",
        description = r#"
# beaconwatch API

beaconwatch monitors iBeacon regions and reports when a region is entered or
exited, ranging nearby beacons while inside.

## Overview

1. **Regions**: register up to `region_max_count` regions by proximity UUID, with optional major and minor
2. **Monitoring**: start and stop monitoring for every registered region at once
3. **Notifications**: poll enter/exit, ranging, radio, authorization and failure notifications

Failed regions are retried until `max_fail_count` is exceeded. A region-unavailable
failure restarts monitoring for every monitored region.
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local beaconwatch server")
    ),
    tags(
        (name = "system", description = "Health checks"),
        (name = "regions", description = "Region registration and lookup"),
        (name = "monitoring", description = "Monitoring lifecycle and status"),
        (name = "notifications", description = "Observer notification log"),
        (name = "platform", description = "Platform event injection")
    ),
    paths(
        super::health::health_check,
        super::regions::list_regions,
        super::regions::register_region,
        super::regions::get_region,
        super::regions::start_region_list,
        super::regions::clear_regions,
        super::monitoring::start_monitoring,
        super::monitoring::stop_monitoring,
        super::monitoring::get_status,
        super::monitoring::refresh_status,
        super::notifications::list_notifications,
        super::platform::post_event,
    ),
    components(
        schemas(
            ErrorResponse,
            HealthResponse,
            RegisterRegionRequest,
            RegionResponse,
            RegionListResponse,
            StartRegionListRequest,
            ClearRegionsResponse,
            Region,
            RegionPhase,
            BeaconObservation,
            MonitoringStatus,
            ManagerConfig,
            AuthorizationStatus,
            RadioState,
            MonitoringFailure,
            PlatformEvent,
            Notification,
            NotificationEvent,
            NotificationsResponse,
        )
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_generation() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "beaconwatch API");
        assert!(spec.paths.paths.contains_key("/api/regions/{identifier}"));
        assert!(spec.paths.paths.contains_key("/api/monitoring/start"));
    }

    #[test]
    fn test_openapi_json_serialization() {
        let json = get_openapi_json().unwrap();
        assert!(json.contains("\"openapi\":"));
        assert!(json.contains("\"beaconwatch API\""));
    }
}
