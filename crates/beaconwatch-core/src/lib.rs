//! # beaconwatch-core
//!
//! Core logic for the beaconwatch beacon region monitor.
//!
//! This crate provides:
//! - A bounded registry of beacon regions with per-region lifecycle state
//! - The monitoring state machine: enter/exit, ranging, failure counting,
//!   escalation and manager-wide restart
//! - A platform seam for the radio/location subsystem, with a BlueZ
//!   implementation and an in-memory mock
//! - A single-task service that serializes commands and platform events
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`region`] - Region entity and ranged beacon observations
//! - [`manager`] - Region registry and state machine
//! - [`platform`] - Platform requests, events, and the mock platform
//! - [`observer`] - Optional callbacks for region transitions
//! - [`service`] - Task ownership and the cloneable handle
//! - [`bluetooth`] - iBeacon parsing, region tracking and BlueZ support
//! - [`config`] - Configuration loading, saving, and validation
//! - [`error`] - Unified error types for the crate

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod bluetooth;
pub mod config;
pub mod error;
pub mod manager;
pub mod observer;
pub mod platform;
pub mod region;
pub mod service;

// Re-export primary types for convenience
#[cfg(feature = "bluetooth")]
pub use bluetooth::{BluezPlatform, BluezScanner};
pub use bluetooth::{parse_ibeacon, IBeaconFrame, RegionTracker};
pub use config::{
    default_config_path, default_log_directory, BluetoothSettings, Config, ConfigError,
    ConfigResult, ManagerConfig, RegionPreset, ServerSettings,
};
pub use error::{BeaconError, Result};
pub use manager::{MonitoringStatus, RegionManager};
pub use observer::{NoopObserver, RegionObserver};
pub use platform::{
    AuthorizationStatus, EventSink, MockPlatform, MonitoringFailure, Platform, PlatformCall,
    PlatformError, PlatformEvent, RadioState,
};
pub use region::{derive_identifier, parse_uuid, BeaconObservation, Region, RegionPhase};
pub use service::{spawn_manager, ManagerHandle, RegionRequest};
