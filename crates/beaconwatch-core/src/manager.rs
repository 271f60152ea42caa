//! The region registry and its monitoring state machine.
//!
//! [`RegionManager`] owns a bounded, insertion-ordered list of [`Region`]s,
//! asks the [`Platform`] to start and stop monitoring and ranging, and folds
//! every [`PlatformEvent`] back into region status:
//!
//! ```text
//! Registered ──start──▶ Monitoring ──enter──▶ Entered (+ Ranging)
//!                          ▲   │   ◀──exit───
//!                          │   ├── generic failure > max ──▶ FailedTerminal
//!                          │   └── region unavailable ─────▶ ErrorState
//!                          └────── manager-wide restart ◀────────┘
//! ```
//!
//! The manager is plain synchronous state. It must only be driven from one
//! logical context; [`spawn_manager`](crate::service::spawn_manager) provides
//! that by owning it inside a single task.

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::ManagerConfig;
use crate::error::{BeaconError, Result};
use crate::observer::{NoopObserver, RegionObserver};
use crate::platform::{
    AuthorizationStatus, MonitoringFailure, Platform, PlatformEvent, RadioState,
};
use crate::region::{derive_identifier, BeaconObservation, Region};

/// Snapshot of manager-level status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MonitoringStatus {
    /// Platform supports monitoring and authorization permits it.
    pub monitoring_capable: bool,
    /// `start_monitoring` has been called and not stopped since.
    pub monitoring_enabled: bool,
    /// Current location authorization.
    pub authorization: AuthorizationStatus,
    /// Current radio power state.
    pub radio_state: RadioState,
    /// Number of registered regions.
    pub region_count: usize,
}

/// Owns the region collection and drives its lifecycle.
pub struct RegionManager<P: Platform, O: RegionObserver = NoopObserver> {
    platform: P,
    config: ManagerConfig,
    regions: Vec<Region>,
    monitoring_enabled: bool,
    observer: Option<Weak<O>>,
    /// Set while a manager-wide restart is in progress.
    restarting: bool,
}

impl<P: Platform, O: RegionObserver> RegionManager<P, O> {
    /// Create an empty manager.
    pub const fn new(platform: P, config: ManagerConfig) -> Self {
        Self {
            platform,
            config,
            regions: Vec::new(),
            monitoring_enabled: false,
            observer: None,
            restarting: false,
        }
    }

    /// Register the observer. Only a weak reference is kept.
    pub fn set_observer(&mut self, observer: &Arc<O>) {
        self.observer = Some(Arc::downgrade(observer));
    }

    /// Drop the observer.
    pub fn clear_observer(&mut self) {
        self.observer = None;
    }

    /// Manager configuration.
    pub const fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Replace the configuration. Takes effect for subsequent operations.
    pub fn set_config(&mut self, config: ManagerConfig) {
        self.config = config;
    }

    /// Registered regions in insertion order.
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Look up a region by identifier.
    pub fn region(&self, identifier: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.identifier == identifier)
    }

    /// Look up a region by identifier for configuration changes.
    pub fn region_mut(&mut self, identifier: &str) -> Option<&mut Region> {
        self.regions.iter_mut().find(|r| r.identifier == identifier)
    }

    /// Whether `start_monitoring` is in effect.
    pub const fn monitoring_enabled(&self) -> bool {
        self.monitoring_enabled
    }

    /// The platform, for inspection.
    pub const fn platform(&self) -> &P {
        &self.platform
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Register a region matching every beacon with `uuid`.
    ///
    /// # Errors
    ///
    /// See [`register`](Self::register).
    pub fn register_region(
        &mut self,
        uuid: Uuid,
        identifier: impl Into<String>,
    ) -> Result<&mut Region> {
        self.register(uuid, None, None, identifier)
    }

    /// Register a region matching `uuid` and `major`.
    ///
    /// # Errors
    ///
    /// See [`register`](Self::register).
    pub fn register_region_with_major(
        &mut self,
        uuid: Uuid,
        major: u16,
        identifier: impl Into<String>,
    ) -> Result<&mut Region> {
        self.register(uuid, Some(major), None, identifier)
    }

    /// Register a region matching a single beacon.
    ///
    /// # Errors
    ///
    /// See [`register`](Self::register).
    pub fn register_region_with_major_minor(
        &mut self,
        uuid: Uuid,
        major: u16,
        minor: u16,
        identifier: impl Into<String>,
    ) -> Result<&mut Region> {
        self.register(uuid, Some(major), Some(minor), identifier)
    }

    /// Register a region, replacing any region with the same identifier.
    ///
    /// The replaced region's platform requests are withdrawn and its
    /// accumulated status is discarded. The new region is not monitored
    /// until [`start_monitoring`](Self::start_monitoring) is called.
    ///
    /// # Errors
    ///
    /// - [`BeaconError::InvalidRegion`] for a blank identifier or a minor without major
    /// - [`BeaconError::CapacityExceeded`] if the identifier is new and
    ///   `region_max_count` regions are already registered
    pub fn register(
        &mut self,
        uuid: Uuid,
        major: Option<u16>,
        minor: Option<u16>,
        identifier: impl Into<String>,
    ) -> Result<&mut Region> {
        let region = Region::new(uuid, major, minor, identifier)?;

        if let Some(index) = self.position(&region.identifier) {
            let previous = std::mem::replace(&mut self.regions[index], region);
            self.withdraw(&previous);
            debug!(identifier = %previous.identifier, "Replaced registered region");
            return Ok(&mut self.regions[index]);
        }

        if self.regions.len() >= self.config.region_max_count {
            warn!(
                identifier = %region.identifier,
                max = self.config.region_max_count,
                "Region capacity exceeded"
            );
            return Err(BeaconError::CapacityExceeded {
                max: self.config.region_max_count,
            });
        }

        if self.config.logging_enabled {
            info!(identifier = %region.identifier, uuid = %region.uuid, "Registered region");
        }
        let index = self.regions.len();
        self.regions.push(region);
        Ok(&mut self.regions[index])
    }

    /// Register a region per UUID not already registered, then start monitoring.
    ///
    /// Identifiers are derived from the UUID. `ranging_enabled` is applied
    /// to every listed UUID's region, including ones already registered.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::CapacityExceeded`] without registering anything
    /// when the new regions would not all fit. Errors from
    /// [`start_monitoring`](Self::start_monitoring) are returned as well.
    pub fn start_region_with_uuid_list(
        &mut self,
        uuids: &[Uuid],
        ranging_enabled: bool,
    ) -> Result<()> {
        let fresh: HashSet<String> = uuids
            .iter()
            .map(derive_identifier)
            .filter(|identifier| self.position(identifier).is_none())
            .collect();
        let max = self.config.region_max_count;
        if self.regions.len() + fresh.len() > max {
            warn!(
                registered = self.regions.len(),
                requested = fresh.len(),
                max,
                "Region list does not fit; nothing registered"
            );
            return Err(BeaconError::CapacityExceeded { max });
        }

        for uuid in uuids {
            let identifier = derive_identifier(uuid);
            let region = match self.position(&identifier) {
                Some(index) => &mut self.regions[index],
                None => self.register_region(*uuid, identifier)?,
            };
            region.ranging_enabled = ranging_enabled;
        }
        self.start_monitoring()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Whether the platform can monitor regions under the current authorization.
    pub fn is_monitoring_capable(&self) -> bool {
        self.platform.is_monitoring_available()
            && self.platform.authorization_status().permits_monitoring()
    }

    /// Ask the platform to monitor every registered region.
    ///
    /// Calling this while already enabled re-asserts monitoring for regions
    /// that are not currently monitored, including ones abandoned after
    /// repeated failures.
    ///
    /// # Errors
    ///
    /// Nothing is started and an error is returned when the platform lacks
    /// monitoring support ([`BeaconError::MonitoringCapabilityUnavailable`])
    /// or authorization is refused ([`BeaconError::AuthorizationDenied`]).
    pub fn start_monitoring(&mut self) -> Result<()> {
        if !self.platform.is_monitoring_available() {
            warn!("Region monitoring is not available on this platform");
            return Err(BeaconError::MonitoringCapabilityUnavailable);
        }
        let authorization = self.platform.authorization_status();
        if !authorization.permits_monitoring() {
            warn!(?authorization, "Location authorization does not permit monitoring");
            return Err(BeaconError::AuthorizationDenied);
        }

        self.monitoring_enabled = true;
        for index in 0..self.regions.len() {
            if !self.regions[index].is_monitoring {
                self.start_region(index);
            }
        }

        if self.config.logging_enabled {
            info!(regions = self.regions.len(), "Monitoring started");
        }
        Ok(())
    }

    /// Stop monitoring and ranging for every region. Regions are kept.
    pub fn stop_monitoring(&mut self) {
        for index in 0..self.regions.len() {
            self.stop_region(index);
        }
        self.monitoring_enabled = false;

        if self.config.logging_enabled {
            info!(regions = self.regions.len(), "Monitoring stopped");
        }
    }

    /// Stop monitoring and forget every region. Returns how many were removed.
    pub fn stop_region_with_clearing_uuid_list(&mut self) -> usize {
        self.stop_monitoring();
        let removed = self.regions.len();
        self.regions.clear();

        if self.config.logging_enabled {
            info!(removed, "Cleared all regions");
        }
        removed
    }

    /// Re-query the platform and re-notify the observer of the current status.
    pub fn request_update_for_status(&self) -> MonitoringStatus {
        let status = self.status();
        if let Some(observer) = self.observer() {
            observer.on_authorization_changed(status.authorization);
            observer.on_radio_state_changed(status.radio_state);
        }
        status
    }

    /// Current manager-level status, without notifying anyone.
    pub fn status(&self) -> MonitoringStatus {
        MonitoringStatus {
            monitoring_capable: self.is_monitoring_capable(),
            monitoring_enabled: self.monitoring_enabled,
            authorization: self.platform.authorization_status(),
            radio_state: self.platform.radio_state(),
            region_count: self.regions.len(),
        }
    }

    // ========================================================================
    // Platform events
    // ========================================================================

    /// Fold one platform event into region status.
    pub fn handle_event(&mut self, event: PlatformEvent) {
        match event {
            PlatformEvent::AuthorizationChanged { status } => {
                self.handle_authorization_changed(status);
            }
            PlatformEvent::RadioStateChanged { state } => {
                if self.config.logging_enabled {
                    info!(?state, "Radio state changed");
                }
                if let Some(observer) = self.observer() {
                    observer.on_radio_state_changed(state);
                }
            }
            PlatformEvent::Entered { identifier } => {
                if let Some(index) = self.lookup(&identifier) {
                    self.handle_enter(index);
                }
            }
            PlatformEvent::Exited { identifier } => {
                if let Some(index) = self.lookup(&identifier) {
                    self.handle_exit(index);
                }
            }
            PlatformEvent::Ranged {
                identifier,
                observations,
            } => {
                if let Some(index) = self.lookup(&identifier) {
                    self.handle_ranged(index, observations);
                }
            }
            PlatformEvent::MonitoringFailed {
                identifier,
                failure,
            } => {
                if let Some(index) = self.lookup(&identifier) {
                    self.handle_monitoring_failure(index, &failure);
                }
            }
        }
    }

    fn handle_authorization_changed(&mut self, status: AuthorizationStatus) {
        if self.config.logging_enabled {
            info!(?status, "Authorization changed");
        }
        if let Some(observer) = self.observer() {
            observer.on_authorization_changed(status);
        }
        if status.is_denied() {
            warn!(?status, "Location access denied; stopping monitoring");
            self.stop_monitoring();
        }
    }

    fn handle_enter(&mut self, index: usize) {
        let region = &mut self.regions[index];
        region.has_entered = true;
        region.fail_count = 0;

        if region.ranging_enabled && !region.is_ranging {
            match self.platform.start_ranging(&self.regions[index]) {
                Ok(()) => self.regions[index].is_ranging = true,
                Err(err) => warn!(
                    identifier = %self.regions[index].identifier,
                    error = %err,
                    "Failed to start ranging"
                ),
            }
        }

        if self.config.logging_enabled {
            info!(identifier = %self.regions[index].identifier, "Entered region");
        }
        if let Some(observer) = self.observer() {
            observer.on_region_enter_or_exit(&self.regions[index]);
        }
    }

    fn handle_exit(&mut self, index: usize) {
        if self.regions[index].is_ranging {
            self.platform.stop_ranging(&self.regions[index]);
        }
        let region = &mut self.regions[index];
        region.has_entered = false;
        region.is_ranging = false;
        region.last_ranged_beacons.clear();

        if self.config.logging_enabled {
            info!(identifier = %region.identifier, "Exited region");
        }
        if let Some(observer) = self.observer() {
            observer.on_region_enter_or_exit(&self.regions[index]);
        }
    }

    fn handle_ranged(&mut self, index: usize, observations: Vec<BeaconObservation>) {
        let received = observations.len();
        let filtered: Vec<BeaconObservation> = observations
            .into_iter()
            .filter(|o| self.config.accepts_rssi(o.rssi))
            .collect();

        let region = &mut self.regions[index];
        if self.config.logging_enabled {
            debug!(
                identifier = %region.identifier,
                received,
                kept = filtered.len(),
                "Ranged beacons"
            );
        }
        region.last_ranged_beacons = filtered;

        if let Some(observer) = self.observer() {
            observer.on_ranged_beacons(&self.regions[index]);
        }
    }

    fn handle_monitoring_failure(&mut self, index: usize, failure: &MonitoringFailure) {
        if self.account_failure(index, failure) {
            self.retry_region(index);
        }
    }

    /// Count a failure, notify, and escalate. Returns `true` when the region
    /// should be retried.
    fn account_failure(&mut self, index: usize, failure: &MonitoringFailure) -> bool {
        match failure {
            MonitoringFailure::Generic { message } => {
                let region = &mut self.regions[index];
                region.fail_count = region.fail_count.saturating_add(1);
                let escalated = region.fail_count > self.config.max_fail_count;

                warn!(
                    identifier = %region.identifier,
                    fail_count = region.fail_count,
                    max_fail_count = self.config.max_fail_count,
                    escalated,
                    message = %message,
                    "Region monitoring failed"
                );

                if escalated {
                    self.stop_region(index);
                }
                if let Some(observer) = self.observer() {
                    observer.on_monitoring_failed(&self.regions[index], failure, escalated);
                }
                !escalated && self.monitoring_enabled
            }
            MonitoringFailure::RegionUnavailable { message } => {
                self.regions[index].is_error_state = true;
                let escalated = !self.restarting;

                warn!(
                    identifier = %self.regions[index].identifier,
                    message = %message,
                    restart = escalated,
                    "Region monitoring unavailable"
                );

                if let Some(observer) = self.observer() {
                    observer.on_monitoring_failed(&self.regions[index], failure, escalated);
                }
                if escalated {
                    self.restart_monitoring();
                }
                false
            }
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Stop and start every monitored region, plus any in error state.
    ///
    /// Starts rejected as unavailable during the restart only flag the
    /// region; they do not trigger another restart.
    fn restart_monitoring(&mut self) {
        if self.restarting {
            return;
        }
        self.restarting = true;

        let enabled = self.monitoring_enabled;
        let targets: Vec<usize> = self
            .regions
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_monitoring || (enabled && r.is_error_state))
            .map(|(index, _)| index)
            .collect();

        info!(regions = targets.len(), "Restarting region monitoring");

        for &index in &targets {
            self.stop_region(index);
        }
        for &index in &targets {
            self.start_region(index);
        }

        self.restarting = false;
    }

    /// Explicit (re)start: a success resets failure accounting.
    fn start_region(&mut self, index: usize) {
        if self.issue_start(index) {
            let region = &mut self.regions[index];
            region.fail_count = 0;
            region.is_error_state = false;
        }
    }

    /// Retry after a counted failure: the counter is left alone.
    fn retry_region(&mut self, index: usize) {
        debug!(
            identifier = %self.regions[index].identifier,
            fail_count = self.regions[index].fail_count,
            "Retrying region monitoring"
        );
        self.issue_start(index);
    }

    /// Ask the platform to monitor a region.
    ///
    /// A rejection is accounted as a failure and re-issued here until the
    /// platform accepts or the region escalates, so a platform that keeps
    /// refusing costs iterations rather than stack.
    fn issue_start(&mut self, index: usize) -> bool {
        loop {
            match self.platform.start_monitoring(&self.regions[index]) {
                Ok(()) => {
                    self.regions[index].is_monitoring = true;
                    return true;
                }
                Err(err) => {
                    self.regions[index].is_monitoring = false;
                    if !self.account_failure(index, &err.as_monitoring_failure()) {
                        return false;
                    }
                    debug!(
                        identifier = %self.regions[index].identifier,
                        fail_count = self.regions[index].fail_count,
                        "Re-issuing rejected monitoring request"
                    );
                }
            }
        }
    }

    fn stop_region(&mut self, index: usize) {
        let region = &self.regions[index];
        if region.is_ranging {
            self.platform.stop_ranging(region);
        }
        self.platform.stop_monitoring(region);

        let region = &mut self.regions[index];
        region.is_monitoring = false;
        region.is_ranging = false;
    }

    /// Withdraw platform requests for a region that is being replaced.
    fn withdraw(&mut self, region: &Region) {
        if region.is_ranging {
            self.platform.stop_ranging(region);
        }
        if region.is_monitoring {
            self.platform.stop_monitoring(region);
        }
    }

    fn position(&self, identifier: &str) -> Option<usize> {
        self.regions.iter().position(|r| r.identifier == identifier)
    }

    fn lookup(&self, identifier: &str) -> Option<usize> {
        let index = self.position(identifier);
        if index.is_none() {
            debug!(identifier, "Ignoring event for unknown region");
        }
        index
    }

    fn observer(&self) -> Option<Arc<O>> {
        self.observer.as_ref().and_then(Weak::upgrade)
    }
}
