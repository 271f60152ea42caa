//! Unified error types for the beaconwatch core library.
//!
//! This module provides a unified error type [`BeaconError`] that covers all
//! failure modes surfaced as return values. Module-specific errors
//! ([`ConfigError`](crate::config::ConfigError),
//! [`PlatformError`](crate::platform::PlatformError)) convert into it.
//!
//! Failures that happen after a request was accepted (per-region monitoring
//! failures, authorization changes) are not errors here: they arrive as
//! [`PlatformEvent`](crate::platform::PlatformEvent)s and are reported to the
//! observer.
//!
//! # Example
//!
//! ```rust
//! use beaconwatch_core::error::{BeaconError, Result};
//!
//! fn check_room(count: usize, max: usize) -> Result<()> {
//!     if count >= max {
//!         return Err(BeaconError::CapacityExceeded { max });
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

use crate::platform::PlatformError;

/// The unified error type for all beaconwatch operations.
#[derive(Debug, Error)]
pub enum BeaconError {
    // =========================================================================
    // REGION ERRORS
    // =========================================================================
    /// The region collection is full.
    #[error("Region limit of {max} reached. Clear or replace an existing region first.")]
    CapacityExceeded {
        /// Configured `region_max_count`.
        max: usize,
    },

    /// Region parameters are inconsistent.
    #[error("Invalid region: {0}")]
    InvalidRegion(String),

    /// A proximity UUID could not be parsed.
    #[error("Invalid proximity UUID: '{0}'. Expected the form E2C56DB5-DFFB-48D2-B060-D0F5A71096E0.")]
    InvalidUuid(String),

    /// No region with this identifier is registered.
    #[error("Region not found: '{0}'")]
    RegionNotFound(String),

    // =========================================================================
    // MONITORING ERRORS
    // =========================================================================
    /// The platform cannot monitor beacon regions.
    #[error("Beacon region monitoring is not available on this platform.")]
    MonitoringCapabilityUnavailable,

    /// Location authorization does not permit monitoring.
    #[error("Location access is denied. Grant location permission to monitor regions.")]
    AuthorizationDenied,

    /// The platform rejected a request.
    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// The manager task is no longer running.
    #[error("Region manager service has stopped")]
    ServiceStopped,

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration file was not found.
    #[error("Configuration file not found at: {0}")]
    ConfigNotFound(String),

    /// The configuration could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A specialized [`Result`] type for beaconwatch operations.
pub type Result<T> = std::result::Result<T, BeaconError>;

impl BeaconError {
    /// Returns `true` if this error concerns region registration.
    #[inline]
    #[must_use]
    pub const fn is_region_error(&self) -> bool {
        matches!(
            self,
            Self::CapacityExceeded { .. }
                | Self::InvalidRegion(_)
                | Self::InvalidUuid(_)
                | Self::RegionNotFound(_)
        )
    }

    /// Returns `true` if this error comes from the platform or its availability.
    #[inline]
    #[must_use]
    pub const fn is_platform_error(&self) -> bool {
        matches!(
            self,
            Self::MonitoringCapabilityUnavailable | Self::AuthorizationDenied | Self::Platform(_)
        )
    }

    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound(_) | Self::ConfigParseError(_) | Self::ConfigValidationError(_)
        )
    }

    /// Returns `true` if retrying later may succeed without user intervention.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Platform(PlatformError::Unavailable(_) | PlatformError::Bluetooth(_))
        )
    }

    /// Returns an HTTP-appropriate status code for this error.
    #[inline]
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - malformed input
            Self::InvalidRegion(_) | Self::InvalidUuid(_) => 400,

            // 403 Forbidden - refused by the platform's permission model
            Self::AuthorizationDenied => 403,

            // 404 Not Found
            Self::RegionNotFound(_) | Self::ConfigNotFound(_) => 404,

            // 409 Conflict - the registry cannot take the request in its current state
            Self::CapacityExceeded { .. } => 409,

            // 422 Unprocessable Entity - semantic errors
            Self::ConfigParseError(_) | Self::ConfigValidationError(_) => 422,

            // 500 Internal Server Error
            Self::IoError(_) => 500,

            // 503 Service Unavailable - radio/location subsystem issues
            Self::MonitoringCapabilityUnavailable | Self::Platform(_) | Self::ServiceStopped => {
                503
            }
        }
    }

    /// Returns a machine-readable error code for API responses.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            Self::InvalidRegion(_) => "INVALID_REGION",
            Self::InvalidUuid(_) => "INVALID_UUID",
            Self::RegionNotFound(_) => "REGION_NOT_FOUND",
            Self::MonitoringCapabilityUnavailable => "MONITORING_UNAVAILABLE",
            Self::AuthorizationDenied => "AUTHORIZATION_DENIED",
            Self::Platform(_) => "PLATFORM_ERROR",
            Self::ServiceStopped => "SERVICE_STOPPED",
            Self::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            Self::ConfigParseError(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
            Self::IoError(_) => "IO_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<crate::config::ConfigError> for BeaconError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::NotFound(path) => Self::ConfigNotFound(path),
            ConfigError::LoadError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::SerializeError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::WriteError { path, source } => Self::IoError(std::io::Error::new(
                source.kind(),
                format!("Failed to write {path}: {source}"),
            )),
            ConfigError::ValidationError { field, message } => {
                Self::ConfigValidationError(format!("{field}: {message}"))
            }
            ConfigError::MultipleValidationErrors(errors) => {
                let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
                Self::ConfigValidationError(messages.join("; "))
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use std::io::{Error as IoErr, ErrorKind};

    #[test]
    fn test_region_error_classification() {
        assert!(BeaconError::CapacityExceeded { max: 20 }.is_region_error());
        assert!(BeaconError::InvalidUuid("x".into()).is_region_error());
        assert!(BeaconError::RegionNotFound("lobby".into()).is_region_error());
        assert!(!BeaconError::AuthorizationDenied.is_region_error());
    }

    #[test]
    fn test_platform_error_classification() {
        assert!(BeaconError::MonitoringCapabilityUnavailable.is_platform_error());
        assert!(BeaconError::AuthorizationDenied.is_platform_error());
        assert!(BeaconError::from(PlatformError::Bluetooth("down".into())).is_platform_error());
        assert!(!BeaconError::CapacityExceeded { max: 1 }.is_platform_error());
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(BeaconError::Platform(PlatformError::Unavailable("x".into())).is_recoverable());
        assert!(!BeaconError::AuthorizationDenied.is_recoverable());
        assert!(!BeaconError::CapacityExceeded { max: 1 }.is_recoverable());
    }

    #[test]
    fn test_http_status_codes() {
        assert_eq!(BeaconError::InvalidUuid("x".into()).http_status_code(), 400);
        assert_eq!(BeaconError::AuthorizationDenied.http_status_code(), 403);
        assert_eq!(
            BeaconError::RegionNotFound("x".into()).http_status_code(),
            404
        );
        assert_eq!(
            BeaconError::CapacityExceeded { max: 20 }.http_status_code(),
            409
        );
        assert_eq!(
            BeaconError::ConfigValidationError("x".into()).http_status_code(),
            422
        );
        assert_eq!(
            BeaconError::MonitoringCapabilityUnavailable.http_status_code(),
            503
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            BeaconError::CapacityExceeded { max: 20 }.error_code(),
            "CAPACITY_EXCEEDED"
        );
        assert_eq!(BeaconError::ServiceStopped.error_code(), "SERVICE_STOPPED");
    }

    #[test]
    fn test_from_config_error() {
        let err: BeaconError = ConfigError::MultipleValidationErrors(vec![
            ConfigError::ValidationError {
                field: "a".into(),
                message: "bad".into(),
            },
            ConfigError::ValidationError {
                field: "b".into(),
                message: "worse".into(),
            },
        ])
        .into();
        assert!(err.is_config_error());
        assert_eq!(
            err.to_string(),
            "Configuration validation failed: a: bad; b: worse"
        );
    }

    #[test]
    fn test_from_io_error() {
        let err: BeaconError = IoErr::new(ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, BeaconError::IoError(_)));
    }

    #[test]
    fn test_error_display_messages() {
        assert!(BeaconError::CapacityExceeded { max: 20 }
            .to_string()
            .contains("20"));
        assert!(BeaconError::RegionNotFound("lobby".into())
            .to_string()
            .contains("lobby"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<BeaconError>();
        assert_sync::<BeaconError>();
    }
}
