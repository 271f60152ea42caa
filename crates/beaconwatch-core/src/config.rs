//! Application configuration management.
//!
//! Handles loading, saving, and validating beaconwatch configuration including:
//! - Region manager limits and ranging filters
//! - Regions to register at startup
//! - Bluetooth scan timing
//! - HTTP server binding
//!
//! Configuration is layered: built-in defaults, then an optional TOML file,
//! then `BEACONWATCH__SECTION__KEY` environment variables.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::region::parse_uuid;

/// Default bound on registered regions.
pub const DEFAULT_REGION_MAX_COUNT: usize = 20;

/// Default number of generic failures tolerated before a region is abandoned.
pub const DEFAULT_MAX_FAIL_COUNT: u32 = 3;

/// Observations weaker than this are dropped unless `notify_under20_rssi_region` is set.
pub const RSSI_FLOOR_DBM: i16 = -20;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "BEACONWATCH";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("configuration file not found: {0}")]
    NotFound(String),

    /// The configuration sources could not be read or merged.
    #[error("failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    /// The configuration file could not be written.
    #[error("failed to write {path}: {source}")]
    WriteError {
        /// File path.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The configuration could not be serialized.
    #[error("failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// A single field is invalid.
    #[error("{field}: {message}")]
    ValidationError {
        /// Dotted field path.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// Several fields are invalid.
    #[error("{} validation errors", .0.len())]
    MultipleValidationErrors(Vec<ConfigError>),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Tunables for the [`RegionManager`](crate::manager::RegionManager).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct ManagerConfig {
    /// Maximum number of registered regions.
    #[schema(example = 20)]
    pub region_max_count: usize,

    /// Generic failures tolerated per region before monitoring it is abandoned.
    #[schema(example = 3)]
    pub max_fail_count: u32,

    /// Keep ranged observations whose RSSI is zero.
    pub notify_zero_rssi_region: bool,

    /// Keep ranged observations weaker than -20 dBm.
    pub notify_under20_rssi_region: bool,

    /// Log every region transition at info level.
    pub logging_enabled: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            region_max_count: DEFAULT_REGION_MAX_COUNT,
            max_fail_count: DEFAULT_MAX_FAIL_COUNT,
            notify_zero_rssi_region: false,
            notify_under20_rssi_region: false,
            logging_enabled: false,
        }
    }
}

impl ManagerConfig {
    /// Whether a ranged observation with this RSSI is kept.
    #[must_use]
    pub const fn accepts_rssi(&self, rssi: i16) -> bool {
        if rssi == 0 {
            self.notify_zero_rssi_region
        } else if rssi < RSSI_FLOOR_DBM {
            self.notify_under20_rssi_region
        } else {
            true
        }
    }
}

/// A region registered at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionPreset {
    /// Region identifier. Defaults to the upper-case UUID.
    pub identifier: Option<String>,

    /// Proximity UUID.
    pub uuid: String,

    /// Optional major value.
    pub major: Option<u16>,

    /// Optional minor value; requires `major`.
    pub minor: Option<u16>,

    /// Range beacons while inside the region.
    #[serde(default)]
    pub ranging_enabled: bool,
}

/// BlueZ scanning parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BluetoothSettings {
    /// Adapter name such as `hci0`; the default adapter when unset.
    pub adapter: Option<String>,

    /// Seconds between ranging passes.
    pub scan_interval_secs: u64,

    /// Seconds without a matching advertisement before a region is exited.
    pub exit_timeout_secs: u64,
}

impl Default for BluetoothSettings {
    fn default() -> Self {
        Self {
            adapter: None,
            scan_interval_secs: 1,
            exit_timeout_secs: 30,
        }
    }
}

/// HTTP server parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Socket address to listen on.
    pub bind_address: String,

    /// Use production logging (JSON files plus compact stdout).
    pub production: bool,

    /// Log filter directive such as `info` or `beaconwatch_core=debug`.
    /// `RUST_LOG` takes precedence when set.
    pub log_level: String,

    /// Directory for production log files; see [`default_log_directory`].
    pub log_directory: Option<PathBuf>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            production: false,
            log_level: "info".to_string(),
            log_directory: None,
        }
    }
}

impl ServerSettings {
    /// Configured log directory, or the platform default.
    #[must_use]
    pub fn resolved_log_directory(&self) -> PathBuf {
        self.log_directory
            .clone()
            .unwrap_or_else(default_log_directory)
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Region manager tunables.
    pub manager: ManagerConfig,

    /// Regions to register at startup.
    pub regions: Vec<RegionPreset>,

    /// BlueZ scanning parameters.
    pub bluetooth: BluetoothSettings,

    /// HTTP server parameters.
    pub server: ServerSettings,
}

impl Config {
    /// Load from `path` if it exists, apply environment overrides, and validate.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or the result is invalid.
    pub fn load_or_default(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let config: Self = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, which must exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] if the file is missing, otherwise as
    /// [`load_or_default`](Self::load_or_default).
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        Self::load_or_default(path)
    }

    /// Write the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        let write_error = |source| ConfigError::WriteError {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_error)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(write_error)?;
        Ok(())
    }

    /// Check every field, reporting all problems at once.
    ///
    /// # Errors
    ///
    /// Returns the single error, or [`ConfigError::MultipleValidationErrors`].
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();
        let invalid = |field: &str, message: String| ConfigError::ValidationError {
            field: field.to_string(),
            message,
        };

        if self.manager.region_max_count == 0 {
            errors.push(invalid(
                "manager.region_max_count",
                "must be at least 1".into(),
            ));
        }
        if self.manager.max_fail_count == 0 {
            errors.push(invalid("manager.max_fail_count", "must be at least 1".into()));
        }
        if self.regions.len() > self.manager.region_max_count {
            errors.push(invalid(
                "regions",
                format!(
                    "{} regions configured but region_max_count is {}",
                    self.regions.len(),
                    self.manager.region_max_count
                ),
            ));
        }

        let mut seen = HashSet::new();
        for (index, preset) in self.regions.iter().enumerate() {
            let field = format!("regions[{index}]");
            match parse_uuid(&preset.uuid) {
                Ok(uuid) => {
                    let identifier = preset
                        .identifier
                        .clone()
                        .unwrap_or_else(|| crate::region::derive_identifier(&uuid));
                    if !seen.insert(identifier.clone()) {
                        errors.push(invalid(
                            &field,
                            format!("duplicate identifier '{identifier}'"),
                        ));
                    }
                }
                Err(_) => errors.push(invalid(
                    &format!("{field}.uuid"),
                    format!("'{}' is not a valid UUID", preset.uuid),
                )),
            }
            if preset.minor.is_some() && preset.major.is_none() {
                errors.push(invalid(&format!("{field}.minor"), "requires major".into()));
            }
            if preset
                .identifier
                .as_deref()
                .is_some_and(|id| id.trim().is_empty())
            {
                errors.push(invalid(
                    &format!("{field}.identifier"),
                    "cannot be empty".into(),
                ));
            }
        }

        if self.bluetooth.scan_interval_secs == 0 {
            errors.push(invalid(
                "bluetooth.scan_interval_secs",
                "must be at least 1".into(),
            ));
        }
        if self.bluetooth.exit_timeout_secs < self.bluetooth.scan_interval_secs {
            errors.push(invalid(
                "bluetooth.exit_timeout_secs",
                "must not be shorter than scan_interval_secs".into(),
            ));
        }
        if self.server.log_level.trim().is_empty() {
            errors.push(invalid("server.log_level", "cannot be empty".into()));
        }
        if self.server.bind_address.parse::<std::net::SocketAddr>().is_err() {
            errors.push(invalid(
                "server.bind_address",
                format!("'{}' is not a socket address", self.server.bind_address),
            ));
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }
}

/// Default configuration file path.
///
/// On Linux: `/etc/beaconwatch/config.toml`
/// Elsewhere: the platform config directory.
#[must_use]
pub fn default_config_path() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/etc/beaconwatch/config.toml")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "beaconwatch").map_or_else(
            || PathBuf::from("./config.toml"),
            |dirs| dirs.config_dir().join("config.toml"),
        )
    }
}

/// Default directory for production log files.
///
/// On Linux: `/var/log/beaconwatch`
/// Elsewhere: a `logs` folder in the platform data directory.
#[must_use]
pub fn default_log_directory() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/var/log/beaconwatch")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "beaconwatch")
            .map_or_else(|| PathBuf::from("./logs"), |dirs| dirs.data_dir().join("logs"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOBBY_UUID: &str = "E2C56DB5-DFFB-48D2-B060-D0F5A71096E0";

    fn preset(identifier: Option<&str>) -> RegionPreset {
        RegionPreset {
            identifier: identifier.map(String::from),
            uuid: LOBBY_UUID.into(),
            major: None,
            minor: None,
            ranging_enabled: false,
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.manager.region_max_count, 20);
        assert_eq!(config.manager.max_fail_count, 3);
        assert!(!config.manager.notify_zero_rssi_region);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_accepts_rssi() {
        let strict = ManagerConfig::default();
        assert!(!strict.accepts_rssi(0));
        assert!(!strict.accepts_rssi(-21));
        assert!(strict.accepts_rssi(-20));
        assert!(strict.accepts_rssi(-5));

        let lenient = ManagerConfig {
            notify_zero_rssi_region: true,
            notify_under20_rssi_region: true,
            ..ManagerConfig::default()
        };
        assert!(lenient.accepts_rssi(0));
        assert!(lenient.accepts_rssi(-90));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());

        assert!(matches!(
            Config::load(dir.path().join("absent.toml")),
            Err(ConfigError::NotFound(_))
        ));
    }

    #[test]
    fn test_load_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            format!(
                r#"
[manager]
max_fail_count = 5
notify_zero_rssi_region = true

[[regions]]
identifier = "lobby"
uuid = "{LOBBY_UUID}"
major = 1
ranging_enabled = true
"#
            ),
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.manager.max_fail_count, 5);
        assert_eq!(config.manager.region_max_count, 20);
        assert!(config.manager.notify_zero_rssi_region);
        assert_eq!(config.regions.len(), 1);
        assert_eq!(config.regions[0].major, Some(1));
        assert!(config.regions[0].ranging_enabled);
    }

    #[test]
    fn test_server_logging_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[server]
production = true
log_level = "beaconwatch_core=debug"
log_directory = "/srv/beaconwatch/logs"
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.server.log_level, "beaconwatch_core=debug");
        assert_eq!(
            config.server.resolved_log_directory(),
            PathBuf::from("/srv/beaconwatch/logs")
        );
        assert_eq!(
            ServerSettings::default().resolved_log_directory(),
            default_log_directory()
        );

        let mut blank = Config::default();
        blank.server.log_level = "  ".into();
        assert!(blank.validate().is_err());
    }

    #[test]
    fn test_save_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.regions.push(preset(Some("lobby")));

        config.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut config = Config::default();
        config.manager.max_fail_count = 0;
        config.regions.push(preset(Some("lobby")));
        config.regions.push(preset(Some("lobby")));
        config.regions.push(RegionPreset {
            uuid: "nope".into(),
            ..preset(None)
        });
        config.regions.push(RegionPreset {
            minor: Some(3),
            ..preset(Some("desk"))
        });

        match config.validate() {
            Err(ConfigError::MultipleValidationErrors(errors)) => {
                let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
                assert_eq!(errors.len(), 4, "{messages:?}");
                assert!(messages.iter().any(|m| m.contains("duplicate identifier")));
                assert!(messages.iter().any(|m| m.contains("requires major")));
            }
            other => panic!("expected multiple errors, got {other:?}"),
        }
    }

    #[test]
    fn test_presets_beyond_capacity_rejected() {
        let mut config = Config::default();
        config.manager.region_max_count = 1;
        config.regions.push(preset(Some("a")));
        config.regions.push(preset(Some("b")));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError { field, .. }) if field == "regions"
        ));
    }
}
