//! Application state shared across handlers.

use std::sync::Arc;

use beaconwatch_core::{
    derive_identifier, parse_uuid, spawn_manager, EventSink, ManagerConfig, ManagerHandle,
    Platform, RegionManager, RegionPreset, RegionRequest,
};
use tokio::task::JoinHandle;
use tracing::info;

use crate::notifications::NotificationLog;

/// Shared application state.
pub type SharedState = Arc<AppState>;

/// Handles to the running region manager.
#[derive(Debug)]
pub struct AppState {
    /// Front end to the manager task.
    pub manager: ManagerHandle,

    /// Queue for platform events.
    pub sink: EventSink,

    /// Observer log; the manager holds it weakly.
    pub notifications: Arc<NotificationLog>,

    /// Configuration the manager was started with.
    pub manager_config: ManagerConfig,
}

impl AppState {
    /// Build the manager over `platform`, attach the notification log, and spawn it.
    pub fn start<P: Platform + 'static>(
        platform: P,
        manager_config: ManagerConfig,
    ) -> (SharedState, JoinHandle<()>) {
        let notifications = Arc::new(NotificationLog::default());
        let mut manager = RegionManager::new(platform, manager_config.clone());
        manager.set_observer(&notifications);
        let (manager, sink, task) = spawn_manager(manager);

        let state = Arc::new(Self {
            manager,
            sink,
            notifications,
            manager_config,
        });
        (state, task)
    }

    /// Register configured regions. Returns how many were registered.
    ///
    /// # Errors
    ///
    /// Stops at the first invalid or rejected preset.
    pub async fn register_presets(&self, presets: &[RegionPreset]) -> beaconwatch_core::Result<usize> {
        for preset in presets {
            let uuid = parse_uuid(&preset.uuid)?;
            let identifier = preset
                .identifier
                .clone()
                .unwrap_or_else(|| derive_identifier(&uuid));
            self.manager
                .register_region(RegionRequest {
                    uuid,
                    major: preset.major,
                    minor: preset.minor,
                    identifier,
                    ranging_enabled: preset.ranging_enabled,
                })
                .await?;
        }
        if !presets.is_empty() {
            info!(count = presets.len(), "Registered configured regions");
        }
        Ok(presets.len())
    }
}

#[cfg(test)]
mod tests {
    use beaconwatch_core::MockPlatform;

    use super::*;

    #[tokio::test]
    async fn test_register_presets() {
        let (state, _task) = AppState::start(MockPlatform::new(), ManagerConfig::default());
        let presets = vec![
            RegionPreset {
                identifier: None,
                uuid: "e2c56db5-dffb-48d2-b060-d0f5a71096e0".into(),
                major: Some(1),
                minor: None,
                ranging_enabled: true,
            },
            RegionPreset {
                identifier: Some("desk".into()),
                uuid: "5A4BCFCE-174E-4BAC-A814-092E77F6B7E5".into(),
                major: Some(2),
                minor: Some(3),
                ranging_enabled: false,
            },
        ];

        assert_eq!(state.register_presets(&presets).await.unwrap(), 2);

        let regions = state.manager.regions().await.unwrap();
        assert_eq!(regions[0].identifier, "E2C56DB5-DFFB-48D2-B060-D0F5A71096E0");
        assert!(regions[0].ranging_enabled);
        assert_eq!(regions[1].identifier, "desk");
        assert_eq!(regions[1].minor, Some(3));
    }

    #[tokio::test]
    async fn test_invalid_preset_rejected() {
        let (state, _task) = AppState::start(MockPlatform::new(), ManagerConfig::default());
        let presets = vec![RegionPreset {
            identifier: None,
            uuid: "bogus".into(),
            major: None,
            minor: None,
            ranging_enabled: false,
        }];
        assert!(state.register_presets(&presets).await.is_err());
    }
}
