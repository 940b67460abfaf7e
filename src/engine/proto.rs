//! Wire messages for the v2ray command API
//!
//! Hand-declared prost messages covering exactly the subset of the v2ray
//! protobuf schema the agent sends and receives. Field tags follow the
//! upstream `.proto` files. Nested configuration travels as `TypedMessage`
//! (fully-qualified type name + encoded bytes).

use prost::Message;

/// A message that can be packed into a `TypedMessage`
pub trait Named: Message + Sized {
    const TYPE_NAME: &'static str;
}

/// `v2ray.core.common.serial.TypedMessage`
#[derive(Clone, PartialEq, Message)]
pub struct TypedMessage {
    #[prost(string, tag = "1")]
    pub r#type: String,
    #[prost(bytes = "vec", tag = "2")]
    pub value: Vec<u8>,
}

impl TypedMessage {
    pub fn pack<M: Named>(message: &M) -> Self {
        Self {
            r#type: M::TYPE_NAME.to_string(),
            value: message.encode_to_vec(),
        }
    }
}

// --- core ---

/// `v2ray.core.InboundHandlerConfig`
#[derive(Clone, PartialEq, Message)]
pub struct InboundHandlerConfig {
    #[prost(string, tag = "1")]
    pub tag: String,
    #[prost(message, optional, tag = "2")]
    pub receiver_settings: Option<TypedMessage>,
    #[prost(message, optional, tag = "3")]
    pub proxy_settings: Option<TypedMessage>,
}

// --- common ---

/// `v2ray.core.common.net.PortRange`
#[derive(Clone, PartialEq, Message)]
pub struct PortRange {
    #[prost(uint32, tag = "1")]
    pub from: u32,
    #[prost(uint32, tag = "2")]
    pub to: u32,
}

impl PortRange {
    pub fn single(port: u16) -> Self {
        Self {
            from: u32::from(port),
            to: u32::from(port),
        }
    }
}

/// `v2ray.core.common.net.IPOrDomain`
#[derive(Clone, PartialEq, Message)]
pub struct IpOrDomain {
    #[prost(oneof = "ip_or_domain::Address", tags = "1, 2")]
    pub address: Option<ip_or_domain::Address>,
}

pub mod ip_or_domain {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Address {
        #[prost(bytes, tag = "1")]
        Ip(Vec<u8>),
        #[prost(string, tag = "2")]
        Domain(String),
    }
}

impl IpOrDomain {
    /// IP literals are sent as raw octets, anything else as a domain
    pub fn parse(addr: &str) -> Self {
        let address = match addr.parse::<std::net::IpAddr>() {
            Ok(std::net::IpAddr::V4(ip)) => ip_or_domain::Address::Ip(ip.octets().to_vec()),
            Ok(std::net::IpAddr::V6(ip)) => ip_or_domain::Address::Ip(ip.octets().to_vec()),
            Err(_) => ip_or_domain::Address::Domain(addr.to_string()),
        };
        Self {
            address: Some(address),
        }
    }
}

/// `v2ray.core.common.protocol.User`
#[derive(Clone, PartialEq, Message)]
pub struct User {
    #[prost(uint32, tag = "1")]
    pub level: u32,
    #[prost(string, tag = "2")]
    pub email: String,
    #[prost(message, optional, tag = "3")]
    pub account: Option<TypedMessage>,
}

// --- app/proxyman ---

/// `v2ray.core.app.proxyman.AllocationStrategy`
#[derive(Clone, PartialEq, Message)]
pub struct AllocationStrategy {
    #[prost(enumeration = "AllocationType", tag = "1")]
    pub r#type: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum AllocationType {
    Always = 0,
    Random = 1,
    External = 2,
}

/// `v2ray.core.app.proxyman.SniffingConfig`
#[derive(Clone, PartialEq, Message)]
pub struct SniffingConfig {
    #[prost(bool, tag = "1")]
    pub enabled: bool,
    #[prost(string, repeated, tag = "2")]
    pub destination_override: Vec<String>,
}

/// `v2ray.core.app.proxyman.ReceiverConfig`
#[derive(Clone, PartialEq, Message)]
pub struct ReceiverConfig {
    #[prost(message, optional, tag = "1")]
    pub port_range: Option<PortRange>,
    #[prost(message, optional, tag = "2")]
    pub listen: Option<IpOrDomain>,
    #[prost(message, optional, tag = "3")]
    pub allocation_strategy: Option<AllocationStrategy>,
    #[prost(message, optional, tag = "4")]
    pub stream_settings: Option<StreamConfig>,
    #[prost(bool, tag = "5")]
    pub receive_original_destination: bool,
    #[prost(message, optional, tag = "8")]
    pub sniffing_settings: Option<SniffingConfig>,
}

impl Named for ReceiverConfig {
    const TYPE_NAME: &'static str = "v2ray.core.app.proxyman.ReceiverConfig";
}

// --- transport ---

/// `v2ray.core.transport.internet.StreamConfig`
#[derive(Clone, PartialEq, Message)]
pub struct StreamConfig {
    #[prost(message, repeated, tag = "2")]
    pub transport_settings: Vec<TransportConfig>,
    #[prost(string, tag = "3")]
    pub security_type: String,
    #[prost(string, tag = "5")]
    pub protocol_name: String,
}

/// `v2ray.core.transport.internet.TransportConfig`
#[derive(Clone, PartialEq, Message)]
pub struct TransportConfig {
    #[prost(message, optional, tag = "2")]
    pub settings: Option<TypedMessage>,
    #[prost(string, tag = "3")]
    pub protocol_name: String,
}

/// `v2ray.core.transport.internet.websocket.Config`
#[derive(Clone, PartialEq, Message)]
pub struct WebsocketConfig {
    #[prost(string, tag = "2")]
    pub path: String,
}

impl Named for WebsocketConfig {
    const TYPE_NAME: &'static str = "v2ray.core.transport.internet.websocket.Config";
}

// --- proxy/vmess ---

/// `v2ray.core.proxy.vmess.Account`
#[derive(Clone, PartialEq, Message)]
pub struct VmessAccount {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(uint32, tag = "2")]
    pub alter_id: u32,
}

impl Named for VmessAccount {
    const TYPE_NAME: &'static str = "v2ray.core.proxy.vmess.Account";
}

/// `v2ray.core.proxy.vmess.inbound.DefaultConfig`
#[derive(Clone, PartialEq, Message)]
pub struct VmessDefaultConfig {
    #[prost(uint32, tag = "1")]
    pub alter_id: u32,
    #[prost(uint32, tag = "2")]
    pub level: u32,
}

/// `v2ray.core.proxy.vmess.inbound.Config`
#[derive(Clone, PartialEq, Message)]
pub struct VmessInboundConfig {
    #[prost(message, repeated, tag = "1")]
    pub user: Vec<User>,
    #[prost(message, optional, tag = "2")]
    pub default: Option<VmessDefaultConfig>,
    #[prost(bool, tag = "4")]
    pub secure_encryption_only: bool,
}

impl Named for VmessInboundConfig {
    const TYPE_NAME: &'static str = "v2ray.core.proxy.vmess.inbound.Config";
}

// --- app/proxyman/command ---

#[derive(Clone, PartialEq, Message)]
pub struct AddInboundRequest {
    #[prost(message, optional, tag = "1")]
    pub inbound: Option<InboundHandlerConfig>,
}

#[derive(Clone, PartialEq, Message)]
pub struct AddInboundResponse {}

#[derive(Clone, PartialEq, Message)]
pub struct RemoveInboundRequest {
    #[prost(string, tag = "1")]
    pub tag: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct RemoveInboundResponse {}

#[derive(Clone, PartialEq, Message)]
pub struct AlterInboundRequest {
    #[prost(string, tag = "1")]
    pub tag: String,
    #[prost(message, optional, tag = "2")]
    pub operation: Option<TypedMessage>,
}

#[derive(Clone, PartialEq, Message)]
pub struct AlterInboundResponse {}

#[derive(Clone, PartialEq, Message)]
pub struct AddUserOperation {
    #[prost(message, optional, tag = "1")]
    pub user: Option<User>,
}

impl Named for AddUserOperation {
    const TYPE_NAME: &'static str = "v2ray.core.app.proxyman.command.AddUserOperation";
}

#[derive(Clone, PartialEq, Message)]
pub struct RemoveUserOperation {
    #[prost(string, tag = "1")]
    pub email: String,
}

impl Named for RemoveUserOperation {
    const TYPE_NAME: &'static str = "v2ray.core.app.proxyman.command.RemoveUserOperation";
}

// --- app/stats/command ---

#[derive(Clone, PartialEq, Message)]
pub struct GetStatsRequest {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(bool, tag = "2")]
    pub reset: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct Stat {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(int64, tag = "2")]
    pub value: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct GetStatsResponse {
    #[prost(message, optional, tag = "1")]
    pub stat: Option<Stat>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_message_carries_type_name() {
        let op = RemoveUserOperation {
            email: "alice@example.com".to_string(),
        };
        let packed = TypedMessage::pack(&op);
        assert_eq!(
            packed.r#type,
            "v2ray.core.app.proxyman.command.RemoveUserOperation"
        );
        assert_eq!(RemoveUserOperation::decode(packed.value.as_slice()).unwrap(), op);
    }

    #[test]
    fn test_ip_or_domain() {
        assert_eq!(
            IpOrDomain::parse("0.0.0.0").address,
            Some(ip_or_domain::Address::Ip(vec![0, 0, 0, 0]))
        );
        assert_eq!(
            IpOrDomain::parse("localhost").address,
            Some(ip_or_domain::Address::Domain("localhost".to_string()))
        );
        match IpOrDomain::parse("::1").address {
            Some(ip_or_domain::Address::Ip(octets)) => assert_eq!(octets.len(), 16),
            other => panic!("unexpected address {other:?}"),
        }
    }

    #[test]
    fn test_port_range_single() {
        let range = PortRange::single(443);
        assert_eq!((range.from, range.to), (443, 443));
    }
}
