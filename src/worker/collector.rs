//! Per-user traffic collection

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::ticker::periodic;
use crate::engine::{user_traffic, ProxyEngine};
use crate::models::UsageSample;
use crate::registry::UserRegistry;

/// Reads every known user's traffic counters on a fixed interval and hands
/// the deltas to the reporter.
///
/// The collector holds the only sender of the usage channel, so once it
/// stops the reporter sees the channel close.
pub struct StatsCollector {
    engine: Arc<dyn ProxyEngine>,
    registry: UserRegistry,
    interval: Duration,
    samples: mpsc::Sender<UsageSample>,
}

/// The reporter has gone away
#[derive(Debug, thiserror::Error)]
#[error("usage channel closed")]
pub struct ChannelClosed;

impl StatsCollector {
    pub fn new(
        engine: Arc<dyn ProxyEngine>,
        registry: UserRegistry,
        interval: Duration,
        samples: mpsc::Sender<UsageSample>,
    ) -> Self {
        Self {
            engine,
            registry,
            interval,
            samples,
        }
    }

    /// Collect one round of samples. Returns how many were sent.
    ///
    /// Users whose counters cannot be read are skipped for this round.
    pub async fn collect_once(&self) -> Result<usize, ChannelClosed> {
        // The identity list is copied out so the registry lock is not held
        // across engine calls or a full channel.
        let emails = self.registry.identities().await;

        let mut sent = 0;
        for email in emails {
            let traffic = match user_traffic(self.engine.as_ref(), &email).await {
                Ok(t) => t,
                Err(e) => {
                    warn!(email = %email, error = %e, "Failed to read user traffic");
                    continue;
                }
            };
            self.samples
                .send(UsageSample::new(email, traffic))
                .await
                .map_err(|_| ChannelClosed)?;
            sent += 1;
        }

        debug!(samples = sent, "Collected user traffic");
        Ok(sent)
    }

    pub async fn run(self, mut stop: oneshot::Receiver<()>) {
        let mut tick = periodic(self.interval);
        info!(interval_secs = self.interval.as_secs(), "Stats collector started");

        loop {
            tokio::select! {
                biased;
                _ = &mut stop => break,
                _ = tick.tick() => {
                    if self.collect_once().await.is_err() {
                        warn!("Reporter is gone, stopping collector");
                        break;
                    }
                }
            }
        }

        info!("Stats collector stopped");
    }
}
