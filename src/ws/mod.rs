pub mod bridge;
pub mod handler;
pub mod registry;
pub mod session;

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::bus::MessageBus;
use crate::store::RoomStore;
use bridge::BroadcastBridge;
use registry::ConnectionRegistry;


/// How long shutdown waits for running sessions to finish their teardown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Process-wide state shared by every session: the room store plus this process's
/// connection registry and bus bridge.
pub struct SyncContext {
    pub store: Arc<dyn RoomStore>,
    pub registry: Arc<ConnectionRegistry>,
    pub bridge: Arc<BroadcastBridge>,
    /// Sessions between join and the end of their teardown.
    sessions: TaskTracker,
    stopping: CancellationToken,
}

impl SyncContext {
    pub fn new(store: Arc<dyn RoomStore>, bus: Arc<dyn MessageBus>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let bridge = Arc::new(BroadcastBridge::new(bus, registry.clone()));
        Self {
            store,
            registry,
            bridge,
            sessions: TaskTracker::new(),
            stopping: CancellationToken::new(),
        }
    }

    /// Ends every running session, waits for their teardown, then stops every bus
    /// listener and drops whatever connection is left.
    pub async fn shutdown(&self) {
        self.stopping.cancel();
        self.sessions.close();
        info!("Waiting for {} sessions to close", self.sessions.len());
        if tokio::time::timeout(SHUTDOWN_GRACE, self.sessions.wait()).await.is_err() {
            warn!("{} sessions did not finish teardown in time", self.sessions.len());
        }
        self.bridge.shutdown().await;
        self.registry.close_all().await;
    }
}
