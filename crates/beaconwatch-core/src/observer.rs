//! Callbacks for significant region transitions.
//!
//! Every method has a no-op default, so an observer implements only what it
//! cares about. The manager holds its observer weakly; a dropped observer
//! silently stops receiving callbacks.

use crate::platform::{AuthorizationStatus, MonitoringFailure, RadioState};
use crate::region::Region;

/// Receives notifications from a [`RegionManager`](crate::manager::RegionManager).
pub trait RegionObserver: Send + Sync {
    /// The Bluetooth radio changed power state.
    fn on_radio_state_changed(&self, _state: RadioState) {}

    /// Location authorization changed.
    fn on_authorization_changed(&self, _status: AuthorizationStatus) {}

    /// A ranging pass completed; `region.last_ranged_beacons` holds the filtered result.
    fn on_ranged_beacons(&self, _region: &Region) {}

    /// The region was entered or exited; see `region.has_entered`.
    fn on_region_enter_or_exit(&self, _region: &Region) {}

    /// Monitoring failed for the region.
    ///
    /// `escalated` is true when the failure stopped monitoring for the
    /// region or triggered a manager-wide restart.
    fn on_monitoring_failed(&self, _region: &Region, _failure: &MonitoringFailure, _escalated: bool) {
    }
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl RegionObserver for NoopObserver {}
