//! Control plane ("RayDash") access
//!
//! The agent talks to the control plane through the `ControlPlane` trait so
//! workers can be driven by the HTTP client in production and by an in-memory
//! double in tests.

pub mod client;
pub mod mock;

use async_trait::async_trait;

use crate::models::{Node, Service, User};

pub use client::RayDashClient;
pub use mock::MockControlPlane;

/// Control plane errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ControlPlaneError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: String, status: u16 },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid client configuration: {0}")]
    InvalidConfig(String),
}

/// Operations the agent needs from the control plane. All calls are scoped
/// to the node this agent manages.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// `GET /nodes/{id}`
    async fn fetch_node(&self) -> Result<Node, ControlPlaneError>;

    /// `GET /nodes/{id}/services`
    async fn fetch_services(&self) -> Result<Vec<Service>, ControlPlaneError>;

    /// `GET /nodes/{id}/users`
    async fn fetch_users(&self) -> Result<Vec<User>, ControlPlaneError>;

    /// `PATCH /users/{username}`
    async fn patch_user(&self, user: &User) -> Result<(), ControlPlaneError>;
}
