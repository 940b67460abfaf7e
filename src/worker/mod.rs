//! Long-running agent workers
//!
//! ```text
//!  Poller ──snapshots──▶ Reconciler ──rpc──▶ engine
//!  Collector ──samples──▶ Reporter ──http──▶ control plane
//! ```
//!
//! Each worker runs in its own task. Workers driven by a timer take a stop
//! signal; workers driven by a channel stop when the channel closes.

pub mod collector;
pub mod poller;
pub mod reconciler;
pub mod reporter;
pub mod ticker;

use std::future::Future;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error};

pub use collector::{ChannelClosed, StatsCollector};
pub use poller::{PollError, ServicePoller};
pub use reconciler::{CycleReport, Phase, Plan, ReconcileError, Reconciler, Topology};
pub use reporter::{Report, StatsReporter};

/// Capacity of the snapshot and usage channels
pub const CHANNEL_CAPACITY: usize = 10;

/// A spawned worker task
pub struct Worker {
    name: &'static str,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl Worker {
    /// Spawn a worker that runs until told to stop
    pub fn spawn<F, Fut>(name: &'static str, run: F) -> Self
    where
        F: FnOnce(oneshot::Receiver<()>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        Self {
            name,
            stop: Some(tx),
            handle: tokio::spawn(run(rx)),
        }
    }

    /// Spawn a worker that runs until its input channel closes
    pub fn spawn_draining<Fut>(name: &'static str, run: Fut) -> Self
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            name,
            stop: None,
            handle: tokio::spawn(run),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signal the worker and wait for it to finish its current tick
    pub async fn stop(mut self) {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(());
        }
        self.join().await;
    }

    pub async fn join(self) {
        match self.handle.await {
            Ok(()) => debug!(worker = self.name, "Worker finished"),
            Err(e) => error!(worker = self.name, error = %e, "Worker task failed"),
        }
    }
}
