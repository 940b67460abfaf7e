//! Desired session bindings

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::ValidationError;

/// A service the control plane wants running on this node.
///
/// Only `id` takes part in identity. Everything else is payload used when the
/// service is pushed to the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Service {
    pub id: u64,
    pub name: String,
    pub description: String,
    #[serde(rename = "uid")]
    pub user_id: u64,
    #[serde(rename = "nid")]
    pub node_id: u64,
    pub host: String,
    pub port: u32,
    pub protocol: String,
    #[serde(rename = "vmessUser")]
    pub vmess_user: VmessUser,
    #[serde(rename = "streamSettings")]
    pub stream_settings: StreamSettings,
}

/// VMess credentials of the principal owning a service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmessUser {
    pub email: String,
    pub uuid: String,
    #[serde(rename = "alterid")]
    pub alter_id: u32,
    pub security: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmessSettings {
    #[serde(rename = "streamSettings")]
    pub stream_settings: StreamSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    #[serde(rename = "protocol")]
    pub transport_protocol: String,
}

impl Service {
    /// Email of the owning principal
    pub fn email(&self) -> &str {
        &self.vmess_user.email
    }

    /// Tag of the dedicated inbound used in multi-inbound mode
    pub fn inbound_tag(&self) -> String {
        format!("{:x}", self.id)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id == 0 {
            return Err(ValidationError::MissingField("id"));
        }
        Ok(())
    }
}

/// Validate a whole snapshot.
///
/// Fails on the first invalid record or on a repeated service id.
pub fn validate_batch(services: &[Service]) -> Result<(), ValidationError> {
    let mut seen = HashSet::with_capacity(services.len());
    for service in services {
        service.validate()?;
        if !seen.insert(service.id) {
            return Err(ValidationError::DuplicateId(service.id));
        }
    }
    Ok(())
}
