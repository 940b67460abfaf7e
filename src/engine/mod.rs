//! Proxy engine control interface
//!
//! The reconciler and the stats collector drive the engine through the
//! `ProxyEngine` trait. `V2RayClient` implements it over gRPC; `MockEngine`
//! keeps everything in memory for tests.

pub mod connect;
pub mod grpc;
pub mod inbound;
pub mod mock;
pub mod proto;

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

pub use connect::{connect_with_retry, CONNECT_POLL_INTERVAL};
pub use grpc::V2RayClient;
pub use inbound::{
    is_transport_supported, EngineUser, InboundSpec, DEFAULT_ALTER_ID, SUPPORTED_TRANSPORTS,
};
pub use mock::{EngineCall, MockEngine};

/// Proxy engine errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("invalid endpoint {0:?}")]
    InvalidEndpoint(String),

    #[error("could not connect to {addr} within {waited:?}")]
    ConnectTimeout { addr: String, waited: Duration },

    #[error("rpc {method} failed: {message}")]
    Rpc { method: &'static str, message: String },

    #[error("counter {0} not found")]
    CounterNotFound(String),

    #[error("invalid port {0}")]
    InvalidPort(u32),

    #[error("unsupported transport protocol {0:?}")]
    UnsupportedTransport(String),
}

/// Capability set the agent consumes from the proxy engine
#[async_trait]
pub trait ProxyEngine: Send + Sync {
    async fn add_inbound(&self, inbound: &InboundSpec) -> Result<(), EngineError>;

    async fn remove_inbound(&self, tag: &str) -> Result<(), EngineError>;

    /// Add a user to an existing inbound
    async fn add_user(&self, tag: &str, user: &EngineUser) -> Result<(), EngineError>;

    /// Remove a user, by email, from an existing inbound
    async fn remove_user(&self, tag: &str, email: &str) -> Result<(), EngineError>;

    /// Read a named counter. With `reset` the engine zeroes it atomically.
    async fn query_stats(&self, name: &str, reset: bool) -> Result<u64, EngineError>;
}

pub fn uplink_counter(email: &str) -> String {
    format!("user>>>{email}>>>traffic>>>uplink")
}

pub fn downlink_counter(email: &str) -> String {
    format!("user>>>{email}>>>traffic>>>downlink")
}

/// Uplink plus downlink traffic for `email` since the previous read.
///
/// Both counters are reset on read. A counter the engine has never created
/// reads as zero. Once the uplink has been reset its value is always
/// returned: a failed downlink read leaves that counter untouched on the
/// engine, to be picked up by the next read.
pub async fn user_traffic(engine: &dyn ProxyEngine, email: &str) -> Result<u64, EngineError> {
    let up = read_and_reset(engine, &uplink_counter(email)).await?;
    match read_and_reset(engine, &downlink_counter(email)).await {
        Ok(down) => Ok(up.saturating_add(down)),
        Err(e) => {
            warn!(email = %email, error = %e, "Downlink read failed, keeping uplink only");
            Ok(up)
        }
    }
}

async fn read_and_reset(engine: &dyn ProxyEngine, name: &str) -> Result<u64, EngineError> {
    match engine.query_stats(name, true).await {
        Ok(value) => Ok(value),
        Err(EngineError::CounterNotFound(_)) => Ok(0),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_names() {
        assert_eq!(
            uplink_counter("alice@example.com"),
            "user>>>alice@example.com>>>traffic>>>uplink"
        );
        assert_eq!(
            downlink_counter("alice@example.com"),
            "user>>>alice@example.com>>>traffic>>>downlink"
        );
    }

    #[tokio::test]
    async fn test_user_traffic_sums_and_resets() {
        let engine = MockEngine::new();
        engine.record_traffic("alice@example.com", 300, 700);

        assert_eq!(user_traffic(&engine, "alice@example.com").await.unwrap(), 1000);
        assert_eq!(user_traffic(&engine, "alice@example.com").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_counter_reads_zero() {
        let engine = MockEngine::new();
        assert_eq!(user_traffic(&engine, "nobody@example.com").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_downlink_failure_keeps_uplink() {
        let engine = MockEngine::new();
        engine.record_traffic("alice@example.com", 500, 200);
        engine.fail_counter(&downlink_counter("alice@example.com"));

        assert_eq!(user_traffic(&engine, "alice@example.com").await.unwrap(), 500);

        engine.heal();
        assert_eq!(user_traffic(&engine, "alice@example.com").await.unwrap(), 200);
    }

    #[tokio::test]
    async fn test_rpc_failure_propagates() {
        let engine = MockEngine::new();
        engine.fail_stats("alice@example.com");
        assert!(matches!(
            user_traffic(&engine, "alice@example.com").await,
            Err(EngineError::Rpc { .. })
        ));
    }
}
