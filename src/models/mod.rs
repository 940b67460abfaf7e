//! Control-plane data model
//!
//! One schema revision for every entity exchanged with the control plane:
//! - `Node`: the proxy instance this agent manages
//! - `Service`: a desired session binding (identity = service id)
//! - `User`: a quota-tracked principal (identity = email)
//! - `UsageSample`: a per-interval traffic delta for one principal

pub mod node;
pub mod service;
pub mod usage;
pub mod user;

pub use node::{Node, NodeSettings};
pub use service::{validate_batch, Service, StreamSettings, VmessSettings, VmessUser};
pub use usage::UsageSample;
pub use user::User;

/// Record validation failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid email address: {0:?}")]
    InvalidEmail(String),

    #[error("duplicate service id {0} in snapshot")]
    DuplicateId(u64),
}
