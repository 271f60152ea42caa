//! Beacon regions and ranged beacon observations.
//!
//! A [`Region`] is one monitored beacon identity (proximity UUID plus
//! optional major/minor) together with its lifecycle flags. Regions hold
//! no behavior of their own beyond [`Region::reset_status`]; every status
//! transition is driven by the [`RegionManager`](crate::manager::RegionManager).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{BeaconError, Result};

/// One beacon advertisement observed while ranging.
///
/// Treated as an opaque record: beaconwatch filters on `rssi` but never
/// interprets the measurement otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "uuid": "E2C56DB5-DFFB-48D2-B060-D0F5A71096E0",
    "major": 1,
    "minor": 7,
    "rssi": -58,
    "measured_power": -59,
    "address": "AA:BB:CC:DD:EE:FF",
    "observed_at_utc": "2025-01-15T03:30:00Z"
}))]
pub struct BeaconObservation {
    /// Proximity UUID.
    pub uuid: Uuid,

    /// Major value.
    pub major: u16,

    /// Minor value.
    pub minor: u16,

    /// Received signal strength in dBm. Zero means the platform could not measure it.
    #[schema(example = -58)]
    pub rssi: i16,

    /// Calibrated signal strength at one metre, if advertised.
    pub measured_power: Option<i8>,

    /// Bluetooth address of the transmitter, if known.
    pub address: Option<String>,

    /// When the advertisement was observed.
    pub observed_at_utc: DateTime<Utc>,
}

/// Where a region sits in the monitoring lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RegionPhase {
    /// Registered but not monitored.
    Registered,
    /// Monitored, currently outside.
    Monitoring,
    /// Monitored and inside.
    Entered,
    /// Inside and ranging.
    Ranging,
    /// Monitoring abandoned after too many failures.
    FailedTerminal,
    /// Hit a region-unavailable failure; awaiting manager restart.
    ErrorState,
}

/// A monitored beacon region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Region {
    /// Identifier, unique within one manager.
    #[schema(example = "lobby")]
    pub identifier: String,

    /// Proximity UUID.
    pub uuid: Uuid,

    /// Optional major value.
    pub major: Option<u16>,

    /// Optional minor value. Only set together with `major`.
    pub minor: Option<u16>,

    /// Start ranging automatically when the region is entered.
    pub ranging_enabled: bool,

    /// Monitoring has been requested and not stopped.
    pub is_monitoring: bool,

    /// Ranging has been requested and not stopped.
    pub is_ranging: bool,

    /// Last known enter/exit state.
    pub has_entered: bool,

    /// Monitoring failures since the last successful start or enter.
    pub fail_count: u32,

    /// Set by a region-unavailable failure.
    pub is_error_state: bool,

    /// Observations from the most recent ranging pass.
    pub last_ranged_beacons: Vec<BeaconObservation>,
}

impl Region {
    /// Create a region with reset status.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::InvalidRegion`] if `identifier` is blank or
    /// `minor` is given without `major`.
    pub fn new(
        uuid: Uuid,
        major: Option<u16>,
        minor: Option<u16>,
        identifier: impl Into<String>,
    ) -> Result<Self> {
        let identifier = identifier.into();
        if identifier.trim().is_empty() {
            return Err(BeaconError::InvalidRegion(
                "identifier cannot be empty".into(),
            ));
        }
        if minor.is_some() && major.is_none() {
            return Err(BeaconError::InvalidRegion(format!(
                "region '{identifier}' sets minor without major"
            )));
        }

        let mut region = Self {
            identifier,
            uuid,
            major,
            minor,
            ranging_enabled: false,
            is_monitoring: false,
            is_ranging: false,
            has_entered: false,
            fail_count: 0,
            is_error_state: false,
            last_ranged_beacons: Vec::new(),
        };
        region.reset_status();
        Ok(region)
    }

    /// Return every status field to its initial value.
    pub fn reset_status(&mut self) {
        self.is_monitoring = false;
        self.is_ranging = false;
        self.has_entered = false;
        self.fail_count = 0;
        self.is_error_state = false;
        self.last_ranged_beacons.clear();
    }

    /// Whether an advertisement belongs to this region.
    #[must_use]
    pub fn matches(&self, observation: &BeaconObservation) -> bool {
        observation.uuid == self.uuid
            && self.major.is_none_or(|major| major == observation.major)
            && self.minor.is_none_or(|minor| minor == observation.minor)
    }

    /// The lifecycle node these flags describe.
    #[must_use]
    pub const fn phase(&self, max_fail_count: u32) -> RegionPhase {
        if self.is_error_state {
            RegionPhase::ErrorState
        } else if !self.is_monitoring && self.fail_count > max_fail_count {
            RegionPhase::FailedTerminal
        } else if !self.is_monitoring {
            RegionPhase::Registered
        } else if self.is_ranging {
            RegionPhase::Ranging
        } else if self.has_entered {
            RegionPhase::Entered
        } else {
            RegionPhase::Monitoring
        }
    }
}

/// Identifier used for regions created from a bare UUID.
#[must_use]
pub fn derive_identifier(uuid: &Uuid) -> String {
    uuid.hyphenated().to_string().to_uppercase()
}

/// Parse a proximity UUID string.
///
/// # Errors
///
/// Returns [`BeaconError::InvalidUuid`] if the string is not a UUID.
pub fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value.trim()).map_err(|_| BeaconError::InvalidUuid(value.to_string()))
}
