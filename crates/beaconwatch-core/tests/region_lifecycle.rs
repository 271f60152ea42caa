//! End-to-end region lifecycle through the manager task.

use std::sync::Arc;

use beaconwatch_core::{
    spawn_manager, BeaconError, BeaconObservation, ManagerConfig, MockPlatform, MonitoringFailure,
    PlatformCall, PlatformEvent, Region, RegionManager, RegionObserver, RegionRequest,
};
use chrono::Utc;
use parking_lot::Mutex;
use uuid::Uuid;

const UUID_A: &str = "E2C56DB5-DFFB-48D2-B060-D0F5A71096E0";
const UUID_B: &str = "5A4BCFCE-174E-4BAC-A814-092E77F6B7E5";

#[derive(Default)]
struct Transitions {
    enter_exit: Mutex<Vec<(String, bool)>>,
    failures: Mutex<Vec<(String, u32, bool)>>,
}

impl RegionObserver for Transitions {
    fn on_region_enter_or_exit(&self, region: &Region) {
        self.enter_exit
            .lock()
            .push((region.identifier.clone(), region.has_entered));
    }

    fn on_monitoring_failed(&self, region: &Region, _: &MonitoringFailure, escalated: bool) {
        self.failures
            .lock()
            .push((region.identifier.clone(), region.fail_count, escalated));
    }
}

fn request(uuid: &str, identifier: &str) -> RegionRequest {
    RegionRequest {
        uuid: Uuid::parse_str(uuid).unwrap(),
        major: None,
        minor: None,
        identifier: identifier.into(),
        ranging_enabled: false,
    }
}

fn generic_failure(identifier: &str) -> PlatformEvent {
    PlatformEvent::MonitoringFailed {
        identifier: identifier.into(),
        failure: MonitoringFailure::Generic {
            message: "monitoring did fail".into(),
        },
    }
}

#[tokio::test]
async fn enter_failure_and_clear_scenario() {
    let platform = MockPlatform::new();
    let observer = Arc::new(Transitions::default());
    let mut manager = RegionManager::new(platform.clone(), ManagerConfig::default());
    manager.set_observer(&observer);
    let (handle, sink, _task) = spawn_manager(manager);

    handle.register_region(request(UUID_A, "A")).await.unwrap();
    handle.register_region(request(UUID_B, "B")).await.unwrap();
    handle.start_monitoring().await.unwrap();

    sink.deliver(PlatformEvent::Entered {
        identifier: "A".into(),
    });
    let a = handle.region("A").await.unwrap();
    assert!(a.has_entered);
    assert_eq!(a.fail_count, 0);
    assert_eq!(*observer.enter_exit.lock(), vec![("A".to_string(), true)]);

    for _ in 0..4 {
        sink.deliver(generic_failure("B"));
    }
    let b = handle.region("B").await.unwrap();
    assert!(!b.is_monitoring);
    assert_eq!(b.fail_count, 4);
    assert!(handle.region("A").await.unwrap().is_monitoring);
    assert_eq!(
        *observer.failures.lock(),
        vec![
            ("B".to_string(), 1, false),
            ("B".to_string(), 2, false),
            ("B".to_string(), 3, false),
            ("B".to_string(), 4, true),
        ]
    );

    assert_eq!(handle.stop_region_with_clearing_uuid_list().await.unwrap(), 2);
    assert!(handle.regions().await.unwrap().is_empty());
}

#[tokio::test]
async fn capacity_bound_is_never_exceeded() {
    let config = ManagerConfig {
        region_max_count: 3,
        ..ManagerConfig::default()
    };
    let manager: RegionManager<_> = RegionManager::new(MockPlatform::new(), config);
    let (handle, _sink, _task) = spawn_manager(manager);

    for index in 0..6 {
        let result = handle
            .register_region(request(UUID_A, &format!("region-{index}")))
            .await;
        if index < 3 {
            assert!(result.is_ok());
        } else {
            assert!(matches!(result, Err(BeaconError::CapacityExceeded { max: 3 })));
        }
        assert!(handle.regions().await.unwrap().len() <= 3);
    }

    let identifiers: Vec<String> = handle
        .regions()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.identifier)
        .collect();
    assert_eq!(identifiers, vec!["region-0", "region-1", "region-2"]);
}

#[tokio::test]
async fn fail_count_only_grows_until_enter() {
    let manager: RegionManager<_> =
        RegionManager::new(MockPlatform::new(), ManagerConfig {
            max_fail_count: 10,
            ..ManagerConfig::default()
        });
    let (handle, sink, _task) = spawn_manager(manager);
    handle.register_region(request(UUID_A, "A")).await.unwrap();
    handle.start_monitoring().await.unwrap();

    let mut previous = 0;
    for _ in 0..5 {
        sink.deliver(generic_failure("A"));
        let current = handle.region("A").await.unwrap().fail_count;
        assert!(current >= previous);
        previous = current;
    }
    assert_eq!(previous, 5);

    sink.deliver(PlatformEvent::Entered {
        identifier: "A".into(),
    });
    assert_eq!(handle.region("A").await.unwrap().fail_count, 0);
}

#[tokio::test]
async fn region_unavailable_cycles_every_monitored_region() {
    let platform = MockPlatform::new();
    let manager: RegionManager<_> =
        RegionManager::new(platform.clone(), ManagerConfig::default());
    let (handle, sink, _task) = spawn_manager(manager);
    handle.register_region(request(UUID_A, "A")).await.unwrap();
    handle.register_region(request(UUID_B, "B")).await.unwrap();
    handle.start_monitoring().await.unwrap();
    for _ in 0..3 {
        sink.deliver(generic_failure("A"));
    }
    platform.clear_calls();

    sink.deliver(PlatformEvent::MonitoringFailed {
        identifier: "A".into(),
        failure: MonitoringFailure::RegionUnavailable {
            message: "region monitoring unavailable".into(),
        },
    });

    let regions = handle.regions().await.unwrap();
    let calls = platform.calls();
    for region in &regions {
        let stop = calls
            .iter()
            .position(|c| *c == PlatformCall::StopMonitoring(region.identifier.clone()))
            .unwrap();
        let start = calls
            .iter()
            .position(|c| *c == PlatformCall::StartMonitoring(region.identifier.clone()))
            .unwrap();
        assert!(stop < start, "{} restarted out of order", region.identifier);
        assert!(region.is_monitoring);
        assert!(!region.is_error_state);
        assert_eq!(region.fail_count, 0);
    }
}

#[tokio::test]
async fn ranged_observations_respect_rssi_filters() {
    let config = ManagerConfig {
        notify_zero_rssi_region: true,
        ..ManagerConfig::default()
    };
    let manager: RegionManager<_> = RegionManager::new(MockPlatform::new(), config);
    let (handle, sink, _task) = spawn_manager(manager);
    handle.register_region(request(UUID_A, "A")).await.unwrap();

    let observation = |rssi| BeaconObservation {
        uuid: Uuid::parse_str(UUID_A).unwrap(),
        major: 1,
        minor: 2,
        rssi,
        measured_power: Some(-59),
        address: None,
        observed_at_utc: Utc::now(),
    };
    sink.deliver(PlatformEvent::Ranged {
        identifier: "A".into(),
        observations: vec![observation(0), observation(-75), observation(-15)],
    });

    let kept: Vec<i16> = handle
        .region("A")
        .await
        .unwrap()
        .last_ranged_beacons
        .iter()
        .map(|o| o.rssi)
        .collect();
    assert_eq!(kept, vec![0, -15]);
}
