//! rayagent: fleet agent for v2ray nodes
//!
//! Runs beside a v2ray instance, pulls the desired per-user services for its
//! node from the RayDash control plane, reconciles them onto v2ray over its
//! gRPC API and reports per-user traffic back.

pub mod agent;
pub mod config;
pub mod control_plane;
pub mod diff;
pub mod engine;
pub mod logging;
pub mod models;
pub mod registry;
pub mod worker;

pub use agent::{AgentError, AgentSettings, RayAgent};
pub use config::{Config, ConfigError, Overrides};
pub use registry::{QuotaState, UserRegistry};
