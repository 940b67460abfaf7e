//! Desired-state poller

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::ticker::periodic;
use crate::control_plane::{ControlPlane, ControlPlaneError};
use crate::models::{validate_batch, Service, ValidationError};

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("service listing failed: {0}")]
    Fetch(#[from] ControlPlaneError),

    #[error("snapshot rejected: {0}")]
    Invalid(#[from] ValidationError),

    #[error("snapshot channel closed")]
    Closed,
}

/// Fetches this node's service list on a fixed interval and forwards each
/// fully valid snapshot to the reconciler.
pub struct ServicePoller {
    control_plane: Arc<dyn ControlPlane>,
    interval: Duration,
    snapshots: mpsc::Sender<Vec<Service>>,
}

impl ServicePoller {
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        interval: Duration,
        snapshots: mpsc::Sender<Vec<Service>>,
    ) -> Self {
        Self {
            control_plane,
            interval,
            snapshots,
        }
    }

    /// Fetch, validate and forward one snapshot. Returns its size.
    ///
    /// An invalid record discards the whole snapshot.
    pub async fn poll_once(&self) -> Result<usize, PollError> {
        let services = self.control_plane.fetch_services().await?;
        validate_batch(&services)?;

        let count = services.len();
        self.snapshots
            .send(services)
            .await
            .map_err(|_| PollError::Closed)?;
        debug!(services = count, "Snapshot forwarded");
        Ok(count)
    }

    /// Poll until stopped. Returning drops the sender, which tells the
    /// reconciler no further snapshots will arrive.
    pub async fn run(self, mut stop: oneshot::Receiver<()>) {
        let mut tick = periodic(self.interval);
        info!(interval_secs = self.interval.as_secs(), "Service poller started");

        loop {
            tokio::select! {
                biased;
                _ = &mut stop => break,
                _ = tick.tick() => match self.poll_once().await {
                    Ok(_) => {}
                    Err(PollError::Closed) => {
                        warn!("Reconciler is gone, stopping poller");
                        break;
                    }
                    Err(PollError::Invalid(e)) => {
                        warn!(error = %e, "Service validation failed, snapshot discarded");
                    }
                    Err(e) => warn!(error = %e, "Service poll failed"),
                },
            }
        }

        info!("Service poller stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_plane::MockControlPlane;

    fn service(id: u64) -> Service {
        Service {
            id,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_valid_snapshot_forwarded() {
        let cp = Arc::new(MockControlPlane::new().with_services(vec![service(1), service(2)]));
        let (tx, mut rx) = mpsc::channel(4);
        let poller = ServicePoller::new(cp, Duration::from_secs(5), tx);

        assert_eq!(poller.poll_once().await.unwrap(), 2);
        let snapshot = rx.recv().await.unwrap();
        assert_eq!(snapshot.iter().map(|s| s.id).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_invalid_record_discards_batch() {
        let cp = Arc::new(MockControlPlane::new().with_services(vec![service(1), service(0)]));
        let (tx, mut rx) = mpsc::channel(4);
        let poller = ServicePoller::new(cp, Duration::from_secs(5), tx);

        assert!(matches!(poller.poll_once().await, Err(PollError::Invalid(_))));
        drop(poller);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_fetch_failure_sends_nothing() {
        let cp = Arc::new(MockControlPlane::new().with_services(vec![service(1)]));
        cp.fail_service_listing(1);
        let (tx, mut rx) = mpsc::channel(4);
        let poller = ServicePoller::new(cp, Duration::from_secs(5), tx);

        assert!(matches!(poller.poll_once().await, Err(PollError::Fetch(_))));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_polls_on_interval_and_closes_on_stop() {
        let cp = Arc::new(MockControlPlane::new().with_services(vec![service(7)]));
        let (tx, mut rx) = mpsc::channel(4);
        let (stop_tx, stop_rx) = oneshot::channel();
        let poller = ServicePoller::new(cp.clone(), Duration::from_secs(5), tx);
        let task = tokio::spawn(poller.run(stop_rx));

        // first poll one period after start
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(cp.service_calls(), 0);
        assert!(rx.recv().await.is_some());
        assert_eq!(cp.service_calls(), 1);

        stop_tx.send(()).unwrap();
        task.await.unwrap();

        // channel closes once the poller is gone
        while rx.recv().await.is_some() {}
    }
}
