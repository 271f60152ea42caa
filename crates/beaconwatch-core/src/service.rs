//! Serialized access to a [`RegionManager`].
//!
//! The manager is not safe to mutate from several places at once, so it is
//! moved into a single tokio task. Application commands and platform events
//! share one queue and are applied strictly in arrival order.
//!
//! ```text
//! ManagerHandle ──Command + reply──┐
//!                                  ├──▶ mpsc ──▶ task owning RegionManager
//! EventSink ──────PlatformEvent────┘
//! ```

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{BeaconError, Result};
use crate::manager::{MonitoringStatus, RegionManager};
use crate::observer::RegionObserver;
use crate::platform::{EventSink, Platform, PlatformEvent};
use crate::region::Region;

/// Parameters for registering one region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionRequest {
    /// Proximity UUID.
    pub uuid: Uuid,
    /// Optional major value.
    pub major: Option<u16>,
    /// Optional minor value; requires `major`.
    pub minor: Option<u16>,
    /// Region identifier.
    pub identifier: String,
    /// Range while inside.
    pub ranging_enabled: bool,
}

type Reply<T> = oneshot::Sender<T>;

/// An application request to the manager task.
#[derive(Debug)]
pub(crate) enum Command {
    Register(RegionRequest, Reply<Result<Region>>),
    StartWithUuidList(Vec<Uuid>, bool, Reply<Result<()>>),
    StartMonitoring(Reply<Result<()>>),
    StopMonitoring(Reply<()>),
    StopAndClear(Reply<usize>),
    RequestStatusUpdate(Reply<MonitoringStatus>),
    Status(Reply<MonitoringStatus>),
    IsMonitoringCapable(Reply<bool>),
    Regions(Reply<Vec<Region>>),
    Region(String, Reply<Option<Region>>),
}

/// Everything the manager task consumes.
#[derive(Debug)]
pub(crate) enum Request {
    Command(Command),
    Platform(PlatformEvent),
}

/// Cloneable front end to the manager task.
#[derive(Debug, Clone)]
pub struct ManagerHandle {
    tx: mpsc::UnboundedSender<Request>,
}

/// Move `manager` into its own task.
///
/// Returns the handle for application calls, the sink the platform delivers
/// events through, and the task itself. The task ends once every handle and
/// sink has been dropped.
pub fn spawn_manager<P, O>(
    manager: RegionManager<P, O>,
) -> (ManagerHandle, EventSink, JoinHandle<()>)
where
    P: Platform + 'static,
    O: RegionObserver + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = ManagerHandle { tx: tx.clone() };
    let sink = EventSink::new(tx);
    let task = tokio::spawn(run(manager, rx));
    (handle, sink, task)
}

async fn run<P: Platform, O: RegionObserver>(
    mut manager: RegionManager<P, O>,
    mut rx: mpsc::UnboundedReceiver<Request>,
) {
    info!("Region manager task started");
    while let Some(request) = rx.recv().await {
        match request {
            Request::Platform(event) => {
                debug!(?event, "Platform event");
                manager.handle_event(event);
            }
            Request::Command(command) => apply(&mut manager, command),
        }
    }
    info!("Region manager task stopped");
}

// A dropped reply receiver only means the caller stopped waiting.
fn apply<P: Platform, O: RegionObserver>(manager: &mut RegionManager<P, O>, command: Command) {
    match command {
        Command::Register(request, reply) => {
            let result = manager
                .register(request.uuid, request.major, request.minor, request.identifier)
                .map(|region| {
                    region.ranging_enabled = request.ranging_enabled;
                    region.clone()
                });
            let _ = reply.send(result);
        }
        Command::StartWithUuidList(uuids, ranging_enabled, reply) => {
            let _ = reply.send(manager.start_region_with_uuid_list(&uuids, ranging_enabled));
        }
        Command::StartMonitoring(reply) => {
            let _ = reply.send(manager.start_monitoring());
        }
        Command::StopMonitoring(reply) => {
            manager.stop_monitoring();
            let _ = reply.send(());
        }
        Command::StopAndClear(reply) => {
            let _ = reply.send(manager.stop_region_with_clearing_uuid_list());
        }
        Command::RequestStatusUpdate(reply) => {
            let _ = reply.send(manager.request_update_for_status());
        }
        Command::Status(reply) => {
            let _ = reply.send(manager.status());
        }
        Command::IsMonitoringCapable(reply) => {
            let _ = reply.send(manager.is_monitoring_capable());
        }
        Command::Regions(reply) => {
            let _ = reply.send(manager.regions().to_vec());
        }
        Command::Region(identifier, reply) => {
            let _ = reply.send(manager.region(&identifier).cloned());
        }
    }
}

impl ManagerHandle {
    async fn call<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(Request::Command(build(reply)))
            .map_err(|_| BeaconError::ServiceStopped)?;
        response.await.map_err(|_| BeaconError::ServiceStopped)
    }

    /// Register a region and return a snapshot of it.
    ///
    /// # Errors
    ///
    /// Registration errors from [`RegionManager::register`], or
    /// [`BeaconError::ServiceStopped`].
    pub async fn register_region(&self, request: RegionRequest) -> Result<Region> {
        self.call(|reply| Command::Register(request, reply)).await?
    }

    /// See [`RegionManager::start_region_with_uuid_list`].
    ///
    /// # Errors
    ///
    /// Registration or start errors, or [`BeaconError::ServiceStopped`].
    pub async fn start_region_with_uuid_list(
        &self,
        uuids: Vec<Uuid>,
        ranging_enabled: bool,
    ) -> Result<()> {
        self.call(|reply| Command::StartWithUuidList(uuids, ranging_enabled, reply))
            .await?
    }

    /// See [`RegionManager::start_monitoring`].
    ///
    /// # Errors
    ///
    /// Capability or authorization errors, or [`BeaconError::ServiceStopped`].
    pub async fn start_monitoring(&self) -> Result<()> {
        self.call(Command::StartMonitoring).await?
    }

    /// See [`RegionManager::stop_monitoring`].
    ///
    /// # Errors
    ///
    /// [`BeaconError::ServiceStopped`] if the task is gone.
    pub async fn stop_monitoring(&self) -> Result<()> {
        self.call(Command::StopMonitoring).await
    }

    /// See [`RegionManager::stop_region_with_clearing_uuid_list`]. Returns
    /// the number of regions removed.
    ///
    /// # Errors
    ///
    /// [`BeaconError::ServiceStopped`] if the task is gone.
    pub async fn stop_region_with_clearing_uuid_list(&self) -> Result<usize> {
        self.call(Command::StopAndClear).await
    }

    /// See [`RegionManager::request_update_for_status`].
    ///
    /// # Errors
    ///
    /// [`BeaconError::ServiceStopped`] if the task is gone.
    pub async fn request_update_for_status(&self) -> Result<MonitoringStatus> {
        self.call(Command::RequestStatusUpdate).await
    }

    /// Current manager status without notifying the observer.
    ///
    /// # Errors
    ///
    /// [`BeaconError::ServiceStopped`] if the task is gone.
    pub async fn status(&self) -> Result<MonitoringStatus> {
        self.call(Command::Status).await
    }

    /// See [`RegionManager::is_monitoring_capable`].
    ///
    /// # Errors
    ///
    /// [`BeaconError::ServiceStopped`] if the task is gone.
    pub async fn is_monitoring_capable(&self) -> Result<bool> {
        self.call(Command::IsMonitoringCapable).await
    }

    /// Snapshot of every region in insertion order.
    ///
    /// # Errors
    ///
    /// [`BeaconError::ServiceStopped`] if the task is gone.
    pub async fn regions(&self) -> Result<Vec<Region>> {
        self.call(Command::Regions).await
    }

    /// Snapshot of one region.
    ///
    /// # Errors
    ///
    /// [`BeaconError::RegionNotFound`] for an unknown identifier, or
    /// [`BeaconError::ServiceStopped`].
    pub async fn region(&self, identifier: &str) -> Result<Region> {
        let owned = identifier.to_string();
        self.call(|reply| Command::Region(owned, reply))
            .await?
            .ok_or_else(|| BeaconError::RegionNotFound(identifier.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ManagerConfig;
    use crate::platform::{MockPlatform, MonitoringFailure};
    use crate::region::parse_uuid;

    const UUID_A: &str = "E2C56DB5-DFFB-48D2-B060-D0F5A71096E0";

    fn request(identifier: &str) -> RegionRequest {
        RegionRequest {
            uuid: parse_uuid(UUID_A).unwrap(),
            major: None,
            minor: None,
            identifier: identifier.into(),
            ranging_enabled: true,
        }
    }

    fn spawn() -> (ManagerHandle, EventSink, JoinHandle<()>) {
        let manager: RegionManager<_> =
            RegionManager::new(MockPlatform::new(), ManagerConfig::default());
        spawn_manager(manager)
    }

    #[tokio::test]
    async fn test_register_returns_snapshot() {
        let (handle, _sink, _task) = spawn();

        let region = handle.register_region(request("lobby")).await.unwrap();

        assert_eq!(region.identifier, "lobby");
        assert!(region.ranging_enabled);
        assert_eq!(handle.regions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_events_and_commands_are_serialized() {
        let (handle, sink, _task) = spawn();
        handle.register_region(request("lobby")).await.unwrap();
        handle.start_monitoring().await.unwrap();

        assert!(sink.deliver(PlatformEvent::Entered {
            identifier: "lobby".into(),
        }));
        assert!(sink.deliver(PlatformEvent::MonitoringFailed {
            identifier: "lobby".into(),
            failure: MonitoringFailure::Generic {
                message: "x".into(),
            },
        }));

        // Queued behind the events, so it observes both.
        let region = handle.region("lobby").await.unwrap();
        assert!(region.has_entered);
        assert!(region.is_ranging);
        assert_eq!(region.fail_count, 1);
    }

    #[tokio::test]
    async fn test_unknown_region_lookup() {
        let (handle, _sink, _task) = spawn();
        assert!(matches!(
            handle.region("ghost").await,
            Err(BeaconError::RegionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_stop_and_clear() {
        let (handle, _sink, _task) = spawn();
        handle
            .start_region_with_uuid_list(vec![parse_uuid(UUID_A).unwrap()], false)
            .await
            .unwrap();
        assert!(handle.status().await.unwrap().monitoring_enabled);

        assert_eq!(handle.stop_region_with_clearing_uuid_list().await.unwrap(), 1);

        let status = handle.status().await.unwrap();
        assert!(!status.monitoring_enabled);
        assert_eq!(status.region_count, 0);
    }

    #[tokio::test]
    async fn test_task_ends_when_handles_dropped() {
        let (handle, sink, task) = spawn();
        drop(handle);
        drop(sink);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_stopped_service_reports_error() {
        let (handle, sink, task) = spawn();
        task.abort();
        let _ = task.await;
        drop(sink);

        assert!(matches!(
            handle.is_monitoring_capable().await,
            Err(BeaconError::ServiceStopped)
        ));
    }
}
