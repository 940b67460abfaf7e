//! gRPC client for the v2ray command API

use std::time::Duration;

use async_trait::async_trait;
use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Status};
use tracing::{debug, info};

use super::connect::{connect_with_retry, CONNECT_POLL_INTERVAL};
use super::inbound::{EngineUser, InboundSpec, DEFAULT_ALTER_ID};
use super::proto::{self, TypedMessage};
use super::{EngineError, ProxyEngine};

const ADD_INBOUND: &str = "/v2ray.core.app.proxyman.command.HandlerService/AddInbound";
const REMOVE_INBOUND: &str = "/v2ray.core.app.proxyman.command.HandlerService/RemoveInbound";
const ALTER_INBOUND: &str = "/v2ray.core.app.proxyman.command.HandlerService/AlterInbound";
const GET_STATS: &str = "/v2ray.core.app.stats.command.StatsService/GetStats";

/// Client for a running v2ray instance's gRPC API
#[derive(Clone)]
pub struct V2RayClient {
    channel: Channel,
}

impl V2RayClient {
    /// Connect to `addr`, retrying until `max_wait` has elapsed.
    ///
    /// `addr` may omit the scheme (`127.0.0.1:10085`).
    pub async fn connect(addr: &str, max_wait: Duration) -> Result<Self, EngineError> {
        let uri = if addr.contains("://") {
            addr.to_string()
        } else {
            format!("http://{addr}")
        };
        let endpoint = Endpoint::from_shared(uri)
            .map_err(|_| EngineError::InvalidEndpoint(addr.to_string()))?
            .connect_timeout(max_wait);

        let channel = connect_with_retry(addr, max_wait, CONNECT_POLL_INTERVAL, || {
            let endpoint = endpoint.clone();
            async move {
                endpoint.connect().await.map_err(|e| EngineError::Rpc {
                    method: "connect",
                    message: e.to_string(),
                })
            }
        })
        .await?;

        info!(addr, "Connected to v2ray API");
        Ok(Self { channel })
    }

    pub fn from_channel(channel: Channel) -> Self {
        Self { channel }
    }

    async fn unary<Req, Resp>(&self, path: &'static str, request: Req) -> Result<Resp, Status>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let mut grpc = Grpc::new(self.channel.clone());
        grpc.ready()
            .await
            .map_err(|e| Status::new(Code::Unknown, format!("service was not ready: {e}")))?;
        let codec: ProstCodec<Req, Resp> = ProstCodec::default();
        let response = grpc
            .unary(
                tonic::Request::new(request),
                PathAndQuery::from_static(path),
                codec,
            )
            .await?;
        Ok(response.into_inner())
    }

    async fn alter_inbound(
        &self,
        tag: &str,
        operation: TypedMessage,
    ) -> Result<(), EngineError> {
        let request = proto::AlterInboundRequest {
            tag: tag.to_string(),
            operation: Some(operation),
        };
        self.unary::<_, proto::AlterInboundResponse>(ALTER_INBOUND, request)
            .await
            .map_err(|s| rpc_error("AlterInbound", s))?;
        Ok(())
    }
}

#[async_trait]
impl ProxyEngine for V2RayClient {
    async fn add_inbound(&self, inbound: &InboundSpec) -> Result<(), EngineError> {
        let request = proto::AddInboundRequest {
            inbound: Some(handler_config(inbound)),
        };
        self.unary::<_, proto::AddInboundResponse>(ADD_INBOUND, request)
            .await
            .map_err(|s| rpc_error("AddInbound", s))?;
        debug!(tag = %inbound.tag, port = inbound.port, "Inbound added");
        Ok(())
    }

    async fn remove_inbound(&self, tag: &str) -> Result<(), EngineError> {
        let request = proto::RemoveInboundRequest {
            tag: tag.to_string(),
        };
        self.unary::<_, proto::RemoveInboundResponse>(REMOVE_INBOUND, request)
            .await
            .map_err(|s| rpc_error("RemoveInbound", s))?;
        debug!(tag, "Inbound removed");
        Ok(())
    }

    async fn add_user(&self, tag: &str, user: &EngineUser) -> Result<(), EngineError> {
        let operation = proto::AddUserOperation {
            user: Some(proto_user(user)),
        };
        self.alter_inbound(tag, TypedMessage::pack(&operation)).await
    }

    async fn remove_user(&self, tag: &str, email: &str) -> Result<(), EngineError> {
        let operation = proto::RemoveUserOperation {
            email: email.to_string(),
        };
        self.alter_inbound(tag, TypedMessage::pack(&operation)).await
    }

    async fn query_stats(&self, name: &str, reset: bool) -> Result<u64, EngineError> {
        let request = proto::GetStatsRequest {
            name: name.to_string(),
            reset,
        };
        let response: proto::GetStatsResponse = self
            .unary(GET_STATS, request)
            .await
            .map_err(|s| stats_error(name, s))?;
        let value = response.stat.map(|s| s.value).unwrap_or_default();
        Ok(u64::try_from(value).unwrap_or(0))
    }
}

fn rpc_error(method: &'static str, status: Status) -> EngineError {
    EngineError::Rpc {
        method,
        message: format!("{:?}: {}", status.code(), status.message()),
    }
}

/// The stats service reports a missing counter as an error whose message
/// ends with `"<name> not found."`
fn stats_error(name: &str, status: Status) -> EngineError {
    if status.message().ends_with(&format!("{name} not found.")) {
        EngineError::CounterNotFound(name.to_string())
    } else {
        rpc_error("GetStats", status)
    }
}

fn proto_user(user: &EngineUser) -> proto::User {
    proto::User {
        level: user.level,
        email: user.email.clone(),
        account: Some(TypedMessage::pack(&proto::VmessAccount {
            id: user.uuid.clone(),
            alter_id: user.alter_id,
        })),
    }
}

fn transport_settings(transport: &str) -> Option<TypedMessage> {
    match transport {
        "websocket" => Some(TypedMessage::pack(&proto::WebsocketConfig {
            path: String::new(),
        })),
        _ => None,
    }
}

fn receiver_config(inbound: &InboundSpec) -> proto::ReceiverConfig {
    proto::ReceiverConfig {
        port_range: Some(proto::PortRange::single(inbound.port)),
        listen: Some(proto::IpOrDomain::parse(&inbound.listen)),
        allocation_strategy: Some(proto::AllocationStrategy {
            r#type: proto::AllocationType::Always as i32,
        }),
        stream_settings: Some(proto::StreamConfig {
            transport_settings: vec![proto::TransportConfig {
                settings: transport_settings(&inbound.transport),
                protocol_name: inbound.transport.clone(),
            }],
            security_type: String::new(),
            protocol_name: inbound.transport.clone(),
        }),
        receive_original_destination: true,
        sniffing_settings: Some(proto::SniffingConfig {
            enabled: true,
            destination_override: vec!["http".to_string(), "tls".to_string()],
        }),
    }
}

fn handler_config(inbound: &InboundSpec) -> proto::InboundHandlerConfig {
    let vmess = proto::VmessInboundConfig {
        user: inbound.users.iter().map(proto_user).collect(),
        default: Some(proto::VmessDefaultConfig {
            alter_id: DEFAULT_ALTER_ID,
            level: 0,
        }),
        secure_encryption_only: true,
    };

    proto::InboundHandlerConfig {
        tag: inbound.tag.clone(),
        receiver_settings: Some(TypedMessage::pack(&receiver_config(inbound))),
        proxy_settings: Some(TypedMessage::pack(&vmess)),
    }
}
