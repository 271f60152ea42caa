//! HTTP API routes and handlers.
//!
//! This module contains all HTTP endpoint implementations organized by domain:
//! - `regions` - Region registration, lookup and clearing
//! - `monitoring` - Starting, stopping and inspecting monitoring
//! - `notifications` - Polling observer notifications
//! - `platform` - Injecting platform events
//! - `health` - Service health checks
//! - `error` - API error types
//! - `openapi` - OpenAPI specification generation

use axum::routing::get;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

pub mod error;
pub mod health;
pub mod monitoring;
pub mod notifications;
pub mod openapi;
pub mod platform;
pub mod regions;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use openapi::get_openapi_json;

/// Creates the combined API router with all endpoints.
///
/// # Route Structure
///
/// ```text
/// /health                 - Health check
/// /api
/// ├── /regions            - List, register, clear; /bulk; /{identifier}
/// ├── /monitoring         - start, stop, status, refresh
/// ├── /notifications      - Observer notification log
/// ├── /platform/events    - Platform event injection
/// └── /openapi.json       - OpenAPI specification
/// ```
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest(
            "/api",
            Router::new()
                .route("/openapi.json", get(openapi::get_openapi_spec))
                .nest("/regions", regions::router())
                .nest("/monitoring", monitoring::router())
                .nest("/notifications", notifications::router())
                .nest("/platform", platform::router()),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
