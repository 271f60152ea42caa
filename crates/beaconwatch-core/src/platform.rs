//! The boundary to the radio/location subsystem.
//!
//! Everything beaconwatch knows about the outside world arrives through this
//! module:
//! - [`Platform`] is the request side: capability queries plus fire-and-forget
//!   start/stop of monitoring and ranging for a region
//! - [`PlatformEvent`] is the answer side: discrete, asynchronous events
//!   delivered through an [`EventSink`] into the manager's queue
//! - [`MockPlatform`] records every request and is used by tests and by the
//!   server when it is built without BlueZ support

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use utoipa::ToSchema;

use crate::region::{BeaconObservation, Region};
use crate::service::Request;

/// Location authorization as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationStatus {
    /// The user has not been asked yet.
    NotDetermined,
    /// Access is blocked by policy and the user cannot change it.
    Restricted,
    /// The user refused access.
    Denied,
    /// Access granted while the application is in use.
    AuthorizedWhenInUse,
    /// Access granted at all times.
    AuthorizedAlways,
}

impl AuthorizationStatus {
    /// Whether monitoring may be requested under this status.
    ///
    /// `NotDetermined` permits, since the platform prompts on the first request.
    #[must_use]
    pub const fn permits_monitoring(self) -> bool {
        !matches!(self, Self::Restricted | Self::Denied)
    }

    /// Whether this status means location access has been refused.
    #[must_use]
    pub const fn is_denied(self) -> bool {
        matches!(self, Self::Restricted | Self::Denied)
    }
}

/// Power state of the Bluetooth radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RadioState {
    /// State not yet known.
    Unknown,
    /// The radio is restarting.
    Resetting,
    /// No Bluetooth LE hardware.
    Unsupported,
    /// The application may not use the radio.
    Unauthorized,
    /// Radio is off.
    PoweredOff,
    /// Radio is on.
    PoweredOn,
}

/// Why the platform could not monitor a region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MonitoringFailure {
    /// An ordinary per-region failure, counted against the region.
    Generic {
        /// Platform supplied description.
        message: String,
    },
    /// The monitoring subsystem itself needs a restart. Not counted.
    RegionUnavailable {
        /// Platform supplied description.
        message: String,
    },
}

impl MonitoringFailure {
    /// Whether this failure calls for a manager-wide restart.
    #[must_use]
    pub const fn is_region_unavailable(&self) -> bool {
        matches!(self, Self::RegionUnavailable { .. })
    }
}

/// An event delivered by the platform.
///
/// Region events name their region by identifier; events for identifiers
/// the manager does not hold are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlatformEvent {
    /// Location authorization changed.
    AuthorizationChanged {
        /// The new status.
        status: AuthorizationStatus,
    },
    /// The Bluetooth radio changed power state.
    RadioStateChanged {
        /// The new state.
        state: RadioState,
    },
    /// The device entered a monitored region.
    Entered {
        /// Region identifier.
        identifier: String,
    },
    /// The device left a monitored region.
    Exited {
        /// Region identifier.
        identifier: String,
    },
    /// A ranging pass completed for a region.
    Ranged {
        /// Region identifier.
        identifier: String,
        /// Every beacon observed during the pass, unfiltered.
        observations: Vec<BeaconObservation>,
    },
    /// Monitoring failed for a region.
    MonitoringFailed {
        /// Region identifier.
        identifier: String,
        /// Failure class.
        failure: MonitoringFailure,
    },
}

/// Synchronous rejection of a platform request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlatformError {
    /// The platform refused this request for this region.
    #[error("platform rejected request for region '{identifier}': {message}")]
    Rejected {
        /// Region identifier.
        identifier: String,
        /// Platform supplied description.
        message: String,
    },

    /// The monitoring subsystem is unavailable as a whole.
    #[error("monitoring subsystem unavailable: {0}")]
    Unavailable(String),

    /// The Bluetooth stack reported an error.
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
}

impl PlatformError {
    /// The monitoring failure a rejected start request is accounted as.
    #[must_use]
    pub fn as_monitoring_failure(&self) -> MonitoringFailure {
        match self {
            Self::Unavailable(message) => MonitoringFailure::RegionUnavailable {
                message: message.clone(),
            },
            other => MonitoringFailure::Generic {
                message: other.to_string(),
            },
        }
    }
}

/// Requests beaconwatch issues to the radio/location subsystem.
///
/// Requests never block on the outcome. A `Err` return is a synchronous
/// rejection; everything else is reported later as a [`PlatformEvent`].
pub trait Platform: Send {
    /// Whether the hardware supports beacon region monitoring.
    fn is_monitoring_available(&self) -> bool;

    /// Current location authorization.
    fn authorization_status(&self) -> AuthorizationStatus;

    /// Current radio power state.
    fn radio_state(&self) -> RadioState;

    /// Begin monitoring a region.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform rejects the request outright.
    fn start_monitoring(&mut self, region: &Region) -> Result<(), PlatformError>;

    /// Stop monitoring a region.
    fn stop_monitoring(&mut self, region: &Region);

    /// Begin ranging beacons in a region.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform rejects the request outright.
    fn start_ranging(&mut self, region: &Region) -> Result<(), PlatformError>;

    /// Stop ranging beacons in a region.
    fn stop_ranging(&mut self, region: &Region);
}

/// Delivers platform events into the manager's serialized queue.
///
/// Cheap to clone; hand one to every platform callback source.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<Request>,
}

impl EventSink {
    pub(crate) const fn new(tx: mpsc::UnboundedSender<Request>) -> Self {
        Self { tx }
    }

    /// Queue an event. Returns `false` if the manager task has stopped.
    pub fn deliver(&self, event: PlatformEvent) -> bool {
        self.tx.send(Request::Platform(event)).is_ok()
    }
}

// ============================================================================
// Mock platform
// ============================================================================

/// A request recorded by [`MockPlatform`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    /// `start_monitoring` for the named region.
    StartMonitoring(String),
    /// `stop_monitoring` for the named region.
    StopMonitoring(String),
    /// `start_ranging` for the named region.
    StartRanging(String),
    /// `stop_ranging` for the named region.
    StopRanging(String),
}

#[derive(Debug)]
struct MockState {
    monitoring_available: bool,
    authorization: AuthorizationStatus,
    radio: RadioState,
    reject_start: Option<PlatformError>,
    calls: Vec<PlatformCall>,
}

/// In-memory platform that records requests.
///
/// Clones share state, so a test can keep one clone for inspection while
/// the manager owns another.
#[derive(Debug, Clone)]
pub struct MockPlatform {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                monitoring_available: true,
                authorization: AuthorizationStatus::AuthorizedAlways,
                radio: RadioState::PoweredOn,
                reject_start: None,
                calls: Vec::new(),
            })),
        }
    }
}

impl MockPlatform {
    /// A capable, authorized, powered-on platform.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether monitoring hardware is reported as available.
    pub fn set_monitoring_available(&self, available: bool) {
        self.state.lock().monitoring_available = available;
    }

    /// Set the reported authorization status.
    pub fn set_authorization(&self, status: AuthorizationStatus) {
        self.state.lock().authorization = status;
    }

    /// Set the reported radio state.
    pub fn set_radio_state(&self, state: RadioState) {
        self.state.lock().radio = state;
    }

    /// Make every subsequent `start_monitoring` fail with `error`, or succeed with `None`.
    pub fn reject_start_with(&self, error: Option<PlatformError>) {
        self.state.lock().reject_start = error;
    }

    /// Every request issued so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<PlatformCall> {
        self.state.lock().calls.clone()
    }

    /// Forget recorded requests.
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }
}

impl Platform for MockPlatform {
    fn is_monitoring_available(&self) -> bool {
        self.state.lock().monitoring_available
    }

    fn authorization_status(&self) -> AuthorizationStatus {
        self.state.lock().authorization
    }

    fn radio_state(&self) -> RadioState {
        self.state.lock().radio
    }

    fn start_monitoring(&mut self, region: &Region) -> Result<(), PlatformError> {
        let mut state = self.state.lock();
        state
            .calls
            .push(PlatformCall::StartMonitoring(region.identifier.clone()));
        match &state.reject_start {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn stop_monitoring(&mut self, region: &Region) {
        self.state
            .lock()
            .calls
            .push(PlatformCall::StopMonitoring(region.identifier.clone()));
    }

    fn start_ranging(&mut self, region: &Region) -> Result<(), PlatformError> {
        self.state
            .lock()
            .calls
            .push(PlatformCall::StartRanging(region.identifier.clone()));
        Ok(())
    }

    fn stop_ranging(&mut self, region: &Region) {
        self.state
            .lock()
            .calls
            .push(PlatformCall::StopRanging(region.identifier.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_permits_monitoring() {
        assert!(AuthorizationStatus::NotDetermined.permits_monitoring());
        assert!(AuthorizationStatus::AuthorizedWhenInUse.permits_monitoring());
        assert!(AuthorizationStatus::AuthorizedAlways.permits_monitoring());
        assert!(!AuthorizationStatus::Denied.permits_monitoring());
        assert!(!AuthorizationStatus::Restricted.permits_monitoring());
        assert!(AuthorizationStatus::Denied.is_denied());
    }

    #[test]
    fn test_unavailable_rejection_maps_to_region_unavailable() {
        let failure = PlatformError::Unavailable("restart".into()).as_monitoring_failure();
        assert!(failure.is_region_unavailable());

        let failure = PlatformError::Rejected {
            identifier: "a".into(),
            message: "busy".into(),
        }
        .as_monitoring_failure();
        assert!(!failure.is_region_unavailable());
    }

    #[test]
    fn test_platform_event_serialization() {
        let event = PlatformEvent::MonitoringFailed {
            identifier: "lobby".into(),
            failure: MonitoringFailure::Generic {
                message: "timeout".into(),
            },
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"monitoring_failed\""));
        assert!(json.contains("\"kind\":\"generic\""));

        let back: PlatformEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_mock_platform_shares_state_between_clones() {
        let mock = MockPlatform::new();
        let mut owned = mock.clone();
        let region = Region::new(uuid::Uuid::nil(), None, None, "a").unwrap();

        owned.start_monitoring(&region).unwrap();
        owned.stop_monitoring(&region);

        assert_eq!(
            mock.calls(),
            vec![
                PlatformCall::StartMonitoring("a".into()),
                PlatformCall::StopMonitoring("a".into()),
            ]
        );

        mock.reject_start_with(Some(PlatformError::Unavailable("x".into())));
        assert!(owned.start_monitoring(&region).is_err());
    }
}
