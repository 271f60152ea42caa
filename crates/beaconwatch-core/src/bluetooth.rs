//! Bluetooth Low Energy beacon detection.
//!
//! This module provides functionality to:
//! - Parse Apple iBeacon advertisements from manufacturer data
//! - Track which monitored regions are currently in range
//! - Drive a [`Platform`](crate::platform::Platform) implementation over
//!   BlueZ (`bluetooth` feature, Linux only)
//!
//! Linux has no location permission model, so the BlueZ platform always
//! reports [`AuthorizedAlways`](crate::platform::AuthorizationStatus::AuthorizedAlways).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::platform::PlatformEvent;
use crate::region::{BeaconObservation, Region};

#[cfg(feature = "bluetooth")]
pub use bluez::{BluezPlatform, BluezScanner};

/// Bluetooth SIG company identifier for Apple, which owns the iBeacon format.
pub const APPLE_COMPANY_ID: u16 = 0x004C;

const IBEACON_TYPE: u8 = 0x02;
const IBEACON_LENGTH: u8 = 0x15;

/// A decoded iBeacon advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IBeaconFrame {
    /// Proximity UUID.
    pub uuid: Uuid,
    /// Major value.
    pub major: u16,
    /// Minor value.
    pub minor: u16,
    /// Calibrated RSSI at one metre.
    pub measured_power: i8,
}

impl IBeaconFrame {
    /// Attach a measurement to this frame.
    #[must_use]
    pub fn into_observation(
        self,
        rssi: i16,
        address: Option<String>,
        observed_at_utc: DateTime<Utc>,
    ) -> BeaconObservation {
        BeaconObservation {
            uuid: self.uuid,
            major: self.major,
            minor: self.minor,
            rssi,
            measured_power: Some(self.measured_power),
            address,
            observed_at_utc,
        }
    }
}

/// Decode Apple manufacturer data (company id already stripped) as an iBeacon.
///
/// Returns `None` for anything that is not a well-formed iBeacon payload.
#[must_use]
pub fn parse_ibeacon(data: &[u8]) -> Option<IBeaconFrame> {
    let [kind, length, rest @ ..] = data else {
        return None;
    };
    if *kind != IBEACON_TYPE || *length != IBEACON_LENGTH || rest.len() < 21 {
        return None;
    }

    let uuid = Uuid::from_slice(&rest[..16]).ok()?;
    let major = u16::from_be_bytes([rest[16], rest[17]]);
    let minor = u16::from_be_bytes([rest[18], rest[19]]);
    let measured_power = i8::from_be_bytes([rest[20]]);

    Some(IBeaconFrame {
        uuid,
        major,
        minor,
        measured_power,
    })
}

#[derive(Debug)]
struct TrackedRegion {
    region: Region,
    ranging: bool,
    inside: bool,
    last_seen: Option<Instant>,
}

/// Turns periodic advertisement snapshots into region events.
///
/// A region is entered on the first matching advertisement and exited once
/// no match has been seen for `exit_timeout`. Ranged regions get a
/// [`PlatformEvent::Ranged`] every pass while inside.
#[derive(Debug)]
pub struct RegionTracker {
    regions: HashMap<String, TrackedRegion>,
    exit_timeout: Duration,
}

impl RegionTracker {
    /// An empty tracker.
    #[must_use]
    pub fn new(exit_timeout: Duration) -> Self {
        Self {
            regions: HashMap::new(),
            exit_timeout,
        }
    }

    /// Start tracking a region, or refresh its definition.
    ///
    /// A region that was last reported inside starts out inside, with the
    /// exit timeout counted from `now`, so a beacon that vanished while the
    /// region was not tracked still produces an exit.
    pub fn track(&mut self, region: &Region, now: Instant) {
        self.regions
            .entry(region.identifier.clone())
            .and_modify(|tracked| tracked.region = region.clone())
            .or_insert_with(|| TrackedRegion {
                region: region.clone(),
                ranging: false,
                inside: region.has_entered,
                last_seen: region.has_entered.then_some(now),
            });
    }

    /// Stop tracking a region.
    pub fn untrack(&mut self, identifier: &str) {
        self.regions.remove(identifier);
    }

    /// Turn ranging on or off. Returns `false` if the region is not tracked.
    pub fn set_ranging(&mut self, identifier: &str, ranging: bool) -> bool {
        match self.regions.get_mut(identifier) {
            Some(tracked) => {
                tracked.ranging = ranging;
                true
            }
            None => false,
        }
    }

    /// Whether a region is tracked.
    #[must_use]
    pub fn is_tracked(&self, identifier: &str) -> bool {
        self.regions.contains_key(identifier)
    }

    /// Fold one scan pass into region state and return the resulting events.
    pub fn advance(&mut self, observations: &[BeaconObservation], now: Instant) -> Vec<PlatformEvent> {
        let exit_timeout = self.exit_timeout;
        let mut events = Vec::new();

        for (identifier, tracked) in &mut self.regions {
            let matches: Vec<BeaconObservation> = observations
                .iter()
                .filter(|o| tracked.region.matches(o))
                .cloned()
                .collect();

            if matches.is_empty() {
                let expired = tracked
                    .last_seen
                    .is_none_or(|seen| now.saturating_duration_since(seen) >= exit_timeout);
                if tracked.inside && expired {
                    tracked.inside = false;
                    events.push(PlatformEvent::Exited {
                        identifier: identifier.clone(),
                    });
                    continue;
                }
            } else {
                tracked.last_seen = Some(now);
                if !tracked.inside {
                    tracked.inside = true;
                    events.push(PlatformEvent::Entered {
                        identifier: identifier.clone(),
                    });
                }
            }

            if tracked.ranging && tracked.inside {
                events.push(PlatformEvent::Ranged {
                    identifier: identifier.clone(),
                    observations: matches,
                });
            }
        }

        events
    }
}

#[cfg(feature = "bluetooth")]
mod bluez {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use bluer::{
        Adapter, AdapterEvent, AdapterProperty, DiscoveryFilter, DiscoveryTransport, Session,
    };
    use chrono::Utc;
    use futures::{pin_mut, StreamExt};
    use parking_lot::Mutex;
    use tracing::{debug, info, warn};

    use super::{parse_ibeacon, RegionTracker, APPLE_COMPANY_ID};
    use crate::config::BluetoothSettings;
    use crate::platform::{
        AuthorizationStatus, EventSink, Platform, PlatformError, PlatformEvent, RadioState,
    };
    use crate::region::{BeaconObservation, Region};

    #[derive(Debug)]
    struct Shared {
        radio: RadioState,
        tracker: RegionTracker,
    }

    fn bluetooth_error(err: &bluer::Error) -> PlatformError {
        PlatformError::Bluetooth(err.to_string())
    }

    /// [`Platform`] over a BlueZ adapter.
    ///
    /// Requests only update the shared tracker; the paired [`BluezScanner`]
    /// does the radio work and delivers events.
    #[derive(Debug, Clone)]
    pub struct BluezPlatform {
        shared: Arc<Mutex<Shared>>,
    }

    /// Background half of [`BluezPlatform`]; run it with [`BluezScanner::run`].
    pub struct BluezScanner {
        adapter: Adapter,
        shared: Arc<Mutex<Shared>>,
        scan_interval: Duration,
        // Keeps the D-Bus connection alive.
        _session: Session,
    }

    impl BluezPlatform {
        /// Open the configured adapter and power it on.
        ///
        /// # Errors
        ///
        /// Returns an error if BlueZ is unreachable or the adapter does not exist.
        pub async fn connect(
            settings: &BluetoothSettings,
        ) -> Result<(Self, BluezScanner), PlatformError> {
            let session = Session::new().await.map_err(|e| bluetooth_error(&e))?;
            let adapter = match &settings.adapter {
                Some(name) => session.adapter(name),
                None => session.default_adapter().await,
            }
            .map_err(|e| bluetooth_error(&e))?;

            if let Err(err) = adapter.set_powered(true).await {
                warn!(adapter = adapter.name(), error = %err, "Could not power on adapter");
            }
            let radio = match adapter.is_powered().await {
                Ok(true) => RadioState::PoweredOn,
                Ok(false) => RadioState::PoweredOff,
                Err(_) => RadioState::Unknown,
            };
            info!(adapter = adapter.name(), ?radio, "Bluetooth adapter ready");

            let shared = Arc::new(Mutex::new(Shared {
                radio,
                tracker: RegionTracker::new(Duration::from_secs(settings.exit_timeout_secs)),
            }));
            let scanner = BluezScanner {
                adapter,
                shared: Arc::clone(&shared),
                scan_interval: Duration::from_secs(settings.scan_interval_secs),
                _session: session,
            };
            Ok((Self { shared }, scanner))
        }
    }

    impl Platform for BluezPlatform {
        fn is_monitoring_available(&self) -> bool {
            !matches!(
                self.shared.lock().radio,
                RadioState::Unsupported | RadioState::Unauthorized
            )
        }

        fn authorization_status(&self) -> AuthorizationStatus {
            AuthorizationStatus::AuthorizedAlways
        }

        fn radio_state(&self) -> RadioState {
            self.shared.lock().radio
        }

        fn start_monitoring(&mut self, region: &Region) -> Result<(), PlatformError> {
            self.shared.lock().tracker.track(region, Instant::now());
            Ok(())
        }

        fn stop_monitoring(&mut self, region: &Region) {
            self.shared.lock().tracker.untrack(&region.identifier);
        }

        fn start_ranging(&mut self, region: &Region) -> Result<(), PlatformError> {
            if self.shared.lock().tracker.set_ranging(&region.identifier, true) {
                Ok(())
            } else {
                Err(PlatformError::Rejected {
                    identifier: region.identifier.clone(),
                    message: "region is not monitored".into(),
                })
            }
        }

        fn stop_ranging(&mut self, region: &Region) {
            self.shared.lock().tracker.set_ranging(&region.identifier, false);
        }
    }

    impl BluezScanner {
        /// Discover until the manager goes away or discovery ends.
        ///
        /// # Errors
        ///
        /// Returns an error if discovery cannot be started.
        pub async fn run(self, sink: EventSink) -> Result<(), PlatformError> {
            let filter = DiscoveryFilter {
                transport: DiscoveryTransport::Le,
                duplicate_data: true,
                ..DiscoveryFilter::default()
            };
            self.adapter
                .set_discovery_filter(filter)
                .await
                .map_err(|e| bluetooth_error(&e))?;
            let adapter_events = self
                .adapter
                .discover_devices()
                .await
                .map_err(|e| bluetooth_error(&e))?;
            pin_mut!(adapter_events);

            let mut tick = tokio::time::interval(self.scan_interval);
            loop {
                tokio::select! {
                    event = adapter_events.next() => match event {
                        Some(AdapterEvent::PropertyChanged(AdapterProperty::Powered(powered))) => {
                            let state = if powered { RadioState::PoweredOn } else { RadioState::PoweredOff };
                            self.shared.lock().radio = state;
                            if !sink.deliver(PlatformEvent::RadioStateChanged { state }) {
                                break;
                            }
                        }
                        Some(_) => {}
                        None => {
                            warn!("Bluetooth discovery stream ended");
                            break;
                        }
                    },
                    _ = tick.tick() => {
                        let observations = self.poll().await;
                        let events = self.shared.lock().tracker.advance(&observations, Instant::now());
                        if !events.into_iter().all(|event| sink.deliver(event)) {
                            break;
                        }
                    }
                }
            }

            info!("Bluetooth scanner stopped");
            Ok(())
        }

        /// Read every cached device and keep the iBeacons currently in range.
        async fn poll(&self) -> Vec<BeaconObservation> {
            let addresses = match self.adapter.device_addresses().await {
                Ok(addresses) => addresses,
                Err(err) => {
                    warn!(error = %err, "Failed to list Bluetooth devices");
                    return Vec::new();
                }
            };

            let mut observations = Vec::new();
            for address in addresses {
                let Ok(device) = self.adapter.device(address) else {
                    continue;
                };
                let Ok(Some(data)) = device.manufacturer_data().await else {
                    continue;
                };
                let Some(frame) = data.get(&APPLE_COMPANY_ID).and_then(|d| parse_ibeacon(d)) else {
                    continue;
                };
                // No RSSI means BlueZ has not heard the device during this discovery.
                let Ok(Some(rssi)) = device.rssi().await else {
                    continue;
                };
                observations.push(frame.into_observation(rssi, Some(address.to_string()), Utc::now()));
            }

            debug!(beacons = observations.len(), "Bluetooth scan pass");
            observations
        }
    }
}
