//! Bounded connection retry

use std::future::Future;
use std::time::Duration;

use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::debug;

use super::EngineError;

/// Delay between connection attempts
pub const CONNECT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Call `attempt` every `poll` until it succeeds or `max_wait` has elapsed.
///
/// The first attempt is made immediately. An attempt still in flight when the
/// deadline passes is abandoned.
pub async fn connect_with_retry<T, F, Fut>(
    addr: &str,
    max_wait: Duration,
    poll: Duration,
    mut attempt: F,
) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    let deadline = Instant::now() + max_wait;
    let expired = sleep_until(deadline);
    tokio::pin!(expired);

    let mut tick = interval(poll);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut attempts = 0u32;
    loop {
        tokio::select! {
            biased;
            _ = &mut expired => {
                return Err(EngineError::ConnectTimeout {
                    addr: addr.to_string(),
                    waited: max_wait,
                });
            }
            _ = tick.tick() => {
                attempts += 1;
                tokio::select! {
                    biased;
                    _ = &mut expired => {
                        return Err(EngineError::ConnectTimeout {
                            addr: addr.to_string(),
                            waited: max_wait,
                        });
                    }
                    result = attempt() => match result {
                        Ok(conn) => return Ok(conn),
                        Err(EngineError::InvalidEndpoint(e)) => {
                            return Err(EngineError::InvalidEndpoint(e));
                        }
                        Err(e) => debug!(addr, attempts, error = %e, "Connection attempt failed"),
                    },
                }
            }
        }
    }
}
