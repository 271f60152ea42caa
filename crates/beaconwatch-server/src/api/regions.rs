//! Region registration API endpoints.
//!
//! Regions are identified by a caller-chosen identifier. Registering an
//! identifier that already exists replaces the earlier region; otherwise the
//! manager refuses new regions once `region_max_count` is reached.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use beaconwatch_core::{derive_identifier, parse_uuid, Region, RegionPhase, RegionRequest};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::error::{ApiResult, ErrorResponse};
use crate::state::SharedState;

/// Creates the regions router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_regions).post(register_region).delete(clear_regions))
        .route("/bulk", post(start_region_list))
        .route("/{identifier}", get(get_region))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to register a single region.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "uuid": "E2C56DB5-DFFB-48D2-B060-D0F5A71096E0",
    "major": 1,
    "minor": null,
    "identifier": "lobby",
    "ranging_enabled": true
}))]
pub struct RegisterRegionRequest {
    /// Proximity UUID, hyphenated.
    #[schema(example = "E2C56DB5-DFFB-48D2-B060-D0F5A71096E0")]
    pub uuid: String,

    /// Optional major value.
    #[serde(default)]
    pub major: Option<u16>,

    /// Optional minor value; requires `major`.
    #[serde(default)]
    pub minor: Option<u16>,

    /// Identifier. Defaults to the upper-case UUID.
    #[serde(default)]
    pub identifier: Option<String>,

    /// Range beacons while inside the region.
    #[serde(default)]
    pub ranging_enabled: bool,
}

/// A region with its derived lifecycle phase.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegionResponse {
    /// Current phase.
    pub phase: RegionPhase,

    /// Region snapshot.
    pub region: Region,
}

/// All registered regions, in registration order.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegionListResponse {
    /// Registered regions.
    pub regions: Vec<RegionResponse>,

    /// Configured maximum.
    #[schema(example = 20)]
    pub max_count: usize,
}

/// Request to register and start a list of UUID-only regions.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "uuids": ["E2C56DB5-DFFB-48D2-B060-D0F5A71096E0"],
    "ranging_enabled": false
}))]
pub struct StartRegionListRequest {
    /// Proximity UUIDs. Each region is named after its UUID.
    pub uuids: Vec<String>,

    /// Ranging flag applied to every listed region.
    #[serde(default)]
    pub ranging_enabled: bool,
}

/// Response after clearing every region.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ClearRegionsResponse {
    /// Number of regions removed.
    #[schema(example = 2)]
    pub removed: usize,
}

fn with_phase(region: Region, max_fail_count: u32) -> RegionResponse {
    RegionResponse {
        phase: region.phase(max_fail_count),
        region,
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// List registered regions.
#[utoipa::path(
    get,
    path = "/api/regions",
    tag = "regions",
    operation_id = "listRegions",
    summary = "List registered regions",
    responses(
        (status = 200, description = "Registered regions", body = RegionListResponse),
        (status = 503, description = "Manager stopped", body = ErrorResponse)
    )
)]
pub async fn list_regions(State(state): State<SharedState>) -> ApiResult<Json<RegionListResponse>> {
    let max_fail_count = state.manager_config.max_fail_count;
    let regions = state
        .manager
        .regions()
        .await?
        .into_iter()
        .map(|region| with_phase(region, max_fail_count))
        .collect();

    Ok(Json(RegionListResponse {
        regions,
        max_count: state.manager_config.region_max_count,
    }))
}

/// Register or replace a region.
#[utoipa::path(
    post,
    path = "/api/regions",
    tag = "regions",
    operation_id = "registerRegion",
    summary = "Register a region",
    description = "Registers a beacon region. An existing region with the same identifier is \
        replaced and its monitoring withdrawn. New regions are not monitored until monitoring \
        is started.",
    request_body = RegisterRegionRequest,
    responses(
        (status = 201, description = "Region registered", body = RegionResponse),
        (status = 400, description = "Invalid UUID or major/minor combination", body = ErrorResponse),
        (status = 409, description = "Region limit reached", body = ErrorResponse)
    )
)]
pub async fn register_region(
    State(state): State<SharedState>,
    Json(request): Json<RegisterRegionRequest>,
) -> ApiResult<(StatusCode, Json<RegionResponse>)> {
    let uuid = parse_uuid(&request.uuid)?;
    let identifier = request
        .identifier
        .unwrap_or_else(|| derive_identifier(&uuid));

    let region = state
        .manager
        .register_region(RegionRequest {
            uuid,
            major: request.major,
            minor: request.minor,
            identifier,
            ranging_enabled: request.ranging_enabled,
        })
        .await?;

    tracing::debug!(identifier = %region.identifier, "Region registered via API");
    Ok((
        StatusCode::CREATED,
        Json(with_phase(region, state.manager_config.max_fail_count)),
    ))
}

/// Fetch one region.
#[utoipa::path(
    get,
    path = "/api/regions/{identifier}",
    tag = "regions",
    operation_id = "getRegion",
    summary = "Get a region",
    params(("identifier" = String, Path, description = "Region identifier")),
    responses(
        (status = 200, description = "Region found", body = RegionResponse),
        (status = 404, description = "No such region", body = ErrorResponse)
    )
)]
pub async fn get_region(
    State(state): State<SharedState>,
    Path(identifier): Path<String>,
) -> ApiResult<Json<RegionResponse>> {
    let region = state.manager.region(&identifier).await?;
    Ok(Json(with_phase(region, state.manager_config.max_fail_count)))
}

/// Register UUID-only regions and start monitoring them.
#[utoipa::path(
    post,
    path = "/api/regions/bulk",
    tag = "regions",
    operation_id = "startRegionList",
    summary = "Register and start UUID regions",
    description = "Registers one region per UUID, named after the upper-case UUID, then starts \
        monitoring. Nothing is registered when the new regions would exceed the limit.",
    request_body = StartRegionListRequest,
    responses(
        (status = 200, description = "Regions registered and monitoring started", body = RegionListResponse),
        (status = 400, description = "Invalid UUID", body = ErrorResponse),
        (status = 403, description = "Location access denied", body = ErrorResponse),
        (status = 409, description = "Region limit reached", body = ErrorResponse),
        (status = 503, description = "Monitoring unavailable", body = ErrorResponse)
    )
)]
pub async fn start_region_list(
    State(state): State<SharedState>,
    Json(request): Json<StartRegionListRequest>,
) -> ApiResult<Json<RegionListResponse>> {
    let uuids = request
        .uuids
        .iter()
        .map(String::as_str)
        .map(parse_uuid)
        .collect::<beaconwatch_core::Result<Vec<_>>>()?;

    state
        .manager
        .start_region_with_uuid_list(uuids, request.ranging_enabled)
        .await?;

    list_regions(State(state)).await
}

/// Stop monitoring and remove every region.
#[utoipa::path(
    delete,
    path = "/api/regions",
    tag = "regions",
    operation_id = "clearRegions",
    summary = "Stop and clear all regions",
    responses(
        (status = 200, description = "Regions cleared", body = ClearRegionsResponse),
        (status = 503, description = "Manager stopped", body = ErrorResponse)
    )
)]
pub async fn clear_regions(
    State(state): State<SharedState>,
) -> ApiResult<Json<ClearRegionsResponse>> {
    let removed = state.manager.stop_region_with_clearing_uuid_list().await?;
    tracing::info!(removed, "Cleared all regions via API");
    Ok(Json(ClearRegionsResponse { removed }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_request_defaults() {
        let request: RegisterRegionRequest =
            serde_json::from_str(r#"{"uuid":"E2C56DB5-DFFB-48D2-B060-D0F5A71096E0"}"#).unwrap();
        assert_eq!(request.major, None);
        assert_eq!(request.identifier, None);
        assert!(!request.ranging_enabled);
    }
}
