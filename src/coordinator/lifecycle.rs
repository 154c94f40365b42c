//! Engine lifecycle management: start, run loop, shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::{EngineState, SyncEngine};

impl SyncEngine {
    /// Reload persisted work and become ready.
    ///
    /// Never fails: unreadable queue data is logged and treated as empty.
    #[tracing::instrument(skip(self))]
    pub async fn start(&self) {
        let startup_start = std::time::Instant::now();
        self.state.send_replace(EngineState::Loading);

        let pending = self.queue.load().await;
        self.publish_status();

        self.state.send_replace(EngineState::Ready);
        info!(
            pending,
            dead_letter = self.queue.failed_items(),
            elapsed_ms = startup_start.elapsed().as_millis() as u64,
            "Sync engine ready"
        );
    }

    /// Run the trigger loop until [`shutdown()`](Self::shutdown).
    ///
    /// Drains on every offline→online transition and on the periodic timer
    /// (the first tick fires immediately, replaying work reloaded by `start`).
    #[tracing::instrument(skip(self))]
    pub async fn run(&self) {
        let mut shutdown = self.shutdown_tx.subscribe();
        if *shutdown.borrow_and_update() {
            return;
        }
        // Subscribe before announcing Running so no transition is missed
        let mut network = self.network.subscribe();
        let mut was_online = network.current().online;
        self.state.send_replace(EngineState::Running);
        info!(sync_interval_secs = self.config.sync_interval_secs, "Sync engine running");

        let mut network_open = true;

        let timer_enabled = self.config.sync_interval_secs > 0;
        let mut sync_interval = tokio::time::interval(Duration::from_secs(self.config.sync_interval_secs.max(1)));
        sync_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,

                changed = network.changed(), if network_open => match changed {
                    Some(status) => {
                        let came_online = status.online && !was_online;
                        was_online = status.online;
                        if came_online {
                            let outcome = self.drain().await;
                            debug!(outcome = outcome.label(), "Drain after reconnect");
                        }
                    }
                    None => {
                        warn!("Network monitor dropped, connectivity triggers disabled");
                        network_open = false;
                    }
                },

                _ = sync_interval.tick(), if timer_enabled => {
                    let outcome = self.drain().await;
                    debug!(outcome = outcome.label(), "Periodic drain");
                }
            }
        }

        info!("Sync engine run loop stopped");
    }

    /// Run the trigger loop on the tokio runtime.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move { engine.run().await })
    }

    /// Stop the run loop.
    ///
    /// Every queue mutation is already persisted, so there is nothing to
    /// flush; an in-flight drain finishes on its own.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&self) {
        info!(pending = self.queue.len(), "Initiating sync engine shutdown...");
        self.state.send_replace(EngineState::ShuttingDown);
        self.shutdown_tx.send_replace(true);
        self.publish_status();
        info!("Sync engine shutdown complete");
    }
}
