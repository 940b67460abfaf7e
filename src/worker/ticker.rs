//! Shared periodic timer policy

use std::time::Duration;

use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Fixed-period timer used by the poller and the collector.
///
/// The first tick fires one period after creation. If a tick comes due while
/// the previous one is still being handled, at most one tick is delivered on
/// return and the rest are dropped.
pub fn periodic(period: Duration) -> Interval {
    let mut tick = interval_at(Instant::now() + period, period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tick
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_after_one_period() {
        let start = Instant::now();
        let mut tick = periodic(Duration::from_secs(5));
        tick.tick().await;
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missed_ticks_dropped() {
        let start = Instant::now();
        let mut tick = periodic(Duration::from_secs(5));
        tick.tick().await;

        // busy for three periods
        tokio::time::sleep(Duration::from_secs(15)).await;

        // one late tick is delivered right away
        tick.tick().await;
        assert_eq!(start.elapsed(), Duration::from_secs(20));

        // the rest were skipped; next tick is on the original grid
        tick.tick().await;
        assert_eq!(start.elapsed(), Duration::from_secs(25));
    }
}
