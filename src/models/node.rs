//! Node descriptor

use serde::{Deserialize, Serialize};

use super::VmessSettings;

/// The proxy instance managed by this agent. Fetched once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Node {
    pub name: String,
    pub description: String,
    /// Host clients use to reach the proxy
    pub host: String,
    pub ports: String,
    pub access_key: String,
    pub current_traffic: u64,
    pub max_traffic: u64,
    #[serde(rename = "hasUDP")]
    pub has_udp: bool,
    /// Selects one inbound per service instead of one shared inbound
    #[serde(rename = "hasMultiPort")]
    pub has_multi_port: bool,
    pub settings: NodeSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSettings {
    pub listen: String,
    pub port: u32,
    #[serde(rename = "vmessSettings")]
    pub vmess_settings: VmessSettings,
}

impl Node {
    /// Port of the shared inbound in single-inbound mode
    pub fn port(&self) -> u32 {
        self.settings.port
    }

    pub fn transport_protocol(&self) -> &str {
        &self.settings.vmess_settings.stream_settings.transport_protocol
    }
}
