//! Inbound and user descriptions handed to the engine

use crate::models::{Node, Service};

use super::EngineError;

/// Transport protocols a VMess inbound can be created with
pub const SUPPORTED_TRANSPORTS: &[&str] =
    &["tcp", "websocket", "http", "mkcp", "domainsocket", "quic"];

/// Alter id used for every account and inbound default
pub const DEFAULT_ALTER_ID: u32 = 64;

const DEFAULT_LISTEN: &str = "0.0.0.0";

/// A VMess user as the engine sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineUser {
    pub email: String,
    pub uuid: String,
    pub alter_id: u32,
    pub level: u32,
}

impl EngineUser {
    pub fn from_service(service: &Service) -> Self {
        Self {
            email: service.vmess_user.email.clone(),
            uuid: service.vmess_user.uuid.clone(),
            alter_id: DEFAULT_ALTER_ID,
            level: 0,
        }
    }
}

/// A VMess inbound, ready to be encoded for the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundSpec {
    pub tag: String,
    pub listen: String,
    pub port: u16,
    pub transport: String,
    pub users: Vec<EngineUser>,
}

impl InboundSpec {
    /// Dedicated inbound for one service (multi-inbound topology)
    pub fn for_service(service: &Service) -> Result<Self, EngineError> {
        Ok(Self {
            tag: service.inbound_tag(),
            listen: DEFAULT_LISTEN.to_string(),
            port: checked_port(service.port)?,
            transport: checked_transport(&service.stream_settings.transport_protocol)?,
            users: vec![EngineUser::from_service(service)],
        })
    }

    /// Shared inbound with no users (single-inbound topology)
    pub fn shared(tag: &str, node: &Node) -> Result<Self, EngineError> {
        let listen = if node.settings.listen.is_empty() {
            DEFAULT_LISTEN.to_string()
        } else {
            node.settings.listen.clone()
        };
        Ok(Self {
            tag: tag.to_string(),
            listen,
            port: checked_port(node.port())?,
            transport: checked_transport(node.transport_protocol())?,
            users: Vec::new(),
        })
    }
}

pub fn is_transport_supported(name: &str) -> bool {
    SUPPORTED_TRANSPORTS.contains(&name)
}

fn checked_port(port: u32) -> Result<u16, EngineError> {
    match u16::try_from(port) {
        Ok(p) if p != 0 => Ok(p),
        _ => Err(EngineError::InvalidPort(port)),
    }
}

fn checked_transport(name: &str) -> Result<String, EngineError> {
    if is_transport_supported(name) {
        Ok(name.to_string())
    } else {
        Err(EngineError::UnsupportedTransport(name.to_string()))
    }
}
