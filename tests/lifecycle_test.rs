//! Agent startup and shutdown sequencing

use std::sync::Arc;
use std::time::Duration;

use rayagent::control_plane::MockControlPlane;
use rayagent::engine::{EngineError, MockEngine, ProxyEngine};
use rayagent::models::{Node, Service, User, VmessUser};
use rayagent::{AgentError, AgentSettings, RayAgent};

fn settings() -> AgentSettings {
    AgentSettings {
        poll_interval: Duration::from_secs(5),
        stats_interval: Duration::from_secs(10),
        connect_timeout: Duration::from_secs(10),
        inbound_tag: "rayagent".to_string(),
        registry_attempts: 3,
    }
}

fn node(transport: &str) -> Node {
    let mut node = Node::default();
    node.name = "edge-01".to_string();
    node.settings.port = 443;
    node.settings.vmess_settings.stream_settings.transport_protocol = transport.to_string();
    node
}

fn alice() -> User {
    User {
        email: "a@x.io".to_string(),
        username: "alice".to_string(),
        current_traffic: 0,
        max_traffic: 1000,
    }
}

fn service(id: u64, email: &str) -> Service {
    Service {
        id,
        vmess_user: VmessUser {
            email: email.to_string(),
            uuid: format!("uuid-{id}"),
            ..Default::default()
        },
        ..Default::default()
    }
}

async fn start(
    control_plane: Arc<MockControlPlane>,
    engine: Arc<MockEngine>,
) -> Result<RayAgent, AgentError> {
    RayAgent::start_with(settings(), control_plane, move |_| async move {
        Ok::<_, EngineError>(engine as Arc<dyn ProxyEngine>)
    })
    .await
}

#[tokio::test(start_paused = true)]
async fn test_full_cycle() {
    let control_plane = Arc::new(
        MockControlPlane::new()
            .with_node(Some(node("websocket")))
            .with_users(vec![alice()])
            .with_services(vec![service(1, "a@x.io")]),
    );
    let engine = Arc::new(MockEngine::new());

    let agent = start(control_plane.clone(), engine.clone()).await.unwrap();
    assert_eq!(agent.node().name, "edge-01");
    assert_eq!(agent.registry().len().await, 1);
    assert!(engine.users_of("rayagent").is_empty());

    // first poll at t = 5s
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(engine.users_of("rayagent"), vec!["a@x.io"]);

    // first collection at t = 10s
    engine.record_traffic("a@x.io", 100, 50);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(
        agent.registry().get("a@x.io").await.unwrap().current_traffic,
        150
    );
    assert_eq!(control_plane.patched().len(), 1);

    agent.shutdown().await;

    // nothing polls after shutdown
    let calls = control_plane.service_calls();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(control_plane.service_calls(), calls);
}

#[tokio::test(start_paused = true)]
async fn test_connect_failure_stops_poller() {
    let control_plane = Arc::new(MockControlPlane::new().with_users(vec![alice()]));

    let result = RayAgent::start_with(settings(), control_plane.clone(), |timeout| async move {
        Err::<Arc<dyn ProxyEngine>, _>(EngineError::ConnectTimeout {
            addr: "127.0.0.1:10085".to_string(),
            waited: timeout,
        })
    })
    .await;
    assert!(matches!(result, Err(AgentError::Connect(_))));

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(control_plane.service_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_node_fetch_failure_is_fatal() {
    let control_plane = Arc::new(MockControlPlane::new().with_node(None).with_users(vec![alice()]));
    let result = start(control_plane, Arc::new(MockEngine::new())).await;
    assert!(matches!(result, Err(AgentError::Node(_))));
}

#[tokio::test(start_paused = true)]
async fn test_unsupported_transport_is_fatal() {
    let control_plane = Arc::new(
        MockControlPlane::new()
            .with_node(Some(node("grpc")))
            .with_users(vec![alice()]),
    );
    let engine = Arc::new(MockEngine::new());
    let result = start(control_plane, engine.clone()).await;
    assert!(matches!(result, Err(AgentError::Reconcile(_))));
    assert!(engine.inbound_tags().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_registry_retries_then_fails() {
    let control_plane = Arc::new(MockControlPlane::new().with_node(Some(node("tcp"))));
    control_plane.fail_user_listing(3);

    let result = start(control_plane.clone(), Arc::new(MockEngine::new())).await;
    assert!(matches!(result, Err(AgentError::Registry(_))));
    assert_eq!(control_plane.user_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_registry_recovers_within_attempts() {
    let control_plane = Arc::new(
        MockControlPlane::new()
            .with_node(Some(node("tcp")))
            .with_users(vec![alice()]),
    );
    control_plane.fail_user_listing(2);

    let agent = start(control_plane, Arc::new(MockEngine::new())).await.unwrap();
    assert_eq!(agent.registry().len().await, 1);
    agent.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_multi_port_node_skips_shared_inbound() {
    let mut multi = node("tcp");
    multi.has_multi_port = true;
    let mut svc = service(255, "a@x.io");
    svc.port = 30000;
    svc.stream_settings.transport_protocol = "tcp".to_string();

    let control_plane = Arc::new(
        MockControlPlane::new()
            .with_node(Some(multi))
            .with_users(vec![alice()])
            .with_services(vec![svc]),
    );
    let engine = Arc::new(MockEngine::new());

    let agent = start(control_plane, engine.clone()).await.unwrap();
    assert!(engine.inbound_tags().is_empty());

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(engine.inbound_tags(), vec!["ff"]);
    agent.shutdown().await;
}
