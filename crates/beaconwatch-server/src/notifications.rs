//! Observer that keeps recent region notifications for the API.
//!
//! The application holds the log strongly; the region manager only keeps a
//! weak reference, so dropping the application state silences it.

use std::collections::VecDeque;

use beaconwatch_core::{
    AuthorizationStatus, BeaconObservation, MonitoringFailure, RadioState, Region, RegionObserver,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Notifications kept before the oldest are discarded.
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 256;

/// What the manager reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationEvent {
    /// The Bluetooth radio changed power state.
    RadioStateChanged {
        /// New state.
        state: RadioState,
    },
    /// Location authorization changed.
    AuthorizationChanged {
        /// New status.
        status: AuthorizationStatus,
    },
    /// A ranging pass completed.
    RangedBeacons {
        /// Region identifier.
        identifier: String,
        /// Observations kept after filtering.
        beacons: Vec<BeaconObservation>,
    },
    /// A region was entered or exited.
    RegionEnterOrExit {
        /// Region identifier.
        identifier: String,
        /// `true` on enter, `false` on exit.
        has_entered: bool,
    },
    /// Monitoring failed for a region.
    MonitoringFailed {
        /// Region identifier.
        identifier: String,
        /// Failure count after this failure.
        fail_count: u32,
        /// Failure class.
        failure: MonitoringFailure,
        /// Monitoring was stopped or restarted as a result.
        escalated: bool,
    },
}

/// One logged notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Notification {
    /// Monotonic sequence number, starting at 1.
    #[schema(example = 42)]
    pub sequence: u64,

    /// When the notification was received.
    pub received_at_utc: DateTime<Utc>,

    /// The notification itself.
    pub event: NotificationEvent,
}

#[derive(Debug)]
struct LogInner {
    entries: VecDeque<Notification>,
    last_sequence: u64,
}

/// Bounded in-memory log of manager notifications.
#[derive(Debug)]
pub struct NotificationLog {
    capacity: usize,
    inner: Mutex<LogInner>,
}

impl Default for NotificationLog {
    fn default() -> Self {
        Self::new(DEFAULT_NOTIFICATION_CAPACITY)
    }
}

impl NotificationLog {
    /// Create a log holding at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(LogInner {
                entries: VecDeque::with_capacity(capacity.max(1)),
                last_sequence: 0,
            }),
        }
    }

    /// Entries with a sequence greater than `since`, oldest first, at most `limit`.
    #[must_use]
    pub fn since(&self, since: u64, limit: usize) -> Vec<Notification> {
        self.inner
            .lock()
            .entries
            .iter()
            .filter(|n| n.sequence > since)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Sequence number of the newest entry, or 0 if nothing was logged.
    #[must_use]
    pub fn last_sequence(&self) -> u64 {
        self.inner.lock().last_sequence
    }

    fn push(&self, event: NotificationEvent) {
        let mut inner = self.inner.lock();
        inner.last_sequence += 1;
        let notification = Notification {
            sequence: inner.last_sequence,
            received_at_utc: Utc::now(),
            event,
        };
        if inner.entries.len() == self.capacity {
            inner.entries.pop_front();
        }
        inner.entries.push_back(notification);
    }
}

impl RegionObserver for NotificationLog {
    fn on_radio_state_changed(&self, state: RadioState) {
        self.push(NotificationEvent::RadioStateChanged { state });
    }

    fn on_authorization_changed(&self, status: AuthorizationStatus) {
        if status.is_denied() {
            tracing::warn!(
                ?status,
                "Location access denied; grant permission and start monitoring again"
            );
        }
        self.push(NotificationEvent::AuthorizationChanged { status });
    }

    fn on_ranged_beacons(&self, region: &Region) {
        self.push(NotificationEvent::RangedBeacons {
            identifier: region.identifier.clone(),
            beacons: region.last_ranged_beacons.clone(),
        });
    }

    fn on_region_enter_or_exit(&self, region: &Region) {
        self.push(NotificationEvent::RegionEnterOrExit {
            identifier: region.identifier.clone(),
            has_entered: region.has_entered,
        });
    }

    fn on_monitoring_failed(&self, region: &Region, failure: &MonitoringFailure, escalated: bool) {
        self.push(NotificationEvent::MonitoringFailed {
            identifier: region.identifier.clone(),
            fail_count: region.fail_count,
            failure: failure.clone(),
            escalated,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_and_capacity() {
        let log = NotificationLog::new(2);
        log.on_radio_state_changed(RadioState::PoweredOff);
        log.on_radio_state_changed(RadioState::PoweredOn);
        log.on_authorization_changed(AuthorizationStatus::Denied);

        let entries = log.since(0, 10);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].sequence, 2);
        assert_eq!(entries[1].sequence, 3);
        assert_eq!(log.last_sequence(), 3);
    }

    #[test]
    fn test_since_and_limit() {
        let log = NotificationLog::default();
        for _ in 0..5 {
            log.on_radio_state_changed(RadioState::PoweredOn);
        }

        let entries = log.since(2, 2);
        let sequences: Vec<u64> = entries.iter().map(|n| n.sequence).collect();
        assert_eq!(sequences, vec![3, 4]);
        assert!(log.since(5, 10).is_empty());
    }

    #[test]
    fn test_notification_serialization() {
        let log = NotificationLog::default();
        log.on_radio_state_changed(RadioState::PoweredOff);
        let json = serde_json::to_string(&log.since(0, 1)).unwrap();
        assert!(json.contains("\"kind\":\"radio_state_changed\""));
        assert!(json.contains("\"state\":\"powered_off\""));
    }
}
