//! RayDash HTTP client against a mock server

use rayagent::control_plane::{ControlPlane, ControlPlaneError, RayDashClient};
use rayagent::models::User;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn client(server: &MockServer) -> RayDashClient {
    RayDashClient::new(&server.uri(), 3, "secret").unwrap()
}

#[tokio::test]
async fn test_fetch_services_sends_node_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/nodes/3/services"))
        .and(header("authorization", "Bearer node.secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "services": [
                {
                    "id": 1,
                    "vmessUser": { "email": "a@x.io", "uuid": "u-1" },
                    "streamSettings": { "protocol": "tcp" }
                },
                { "id": 2, "vmessUser": { "email": "b@x.io", "uuid": "u-2" } }
            ],
            "total": 2
        })))
        .expect(1)
        .mount(&server)
        .await;

    let services = client(&server).await.fetch_services().await.unwrap();
    assert_eq!(services.len(), 2);
    assert_eq!(services[0].email(), "a@x.io");
    assert_eq!(services[0].stream_settings.transport_protocol, "tcp");
}

#[tokio::test]
async fn test_fetch_node() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/nodes/3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "node": {
                "name": "edge-01",
                "hasMultiPort": true,
                "settings": { "port": 443 }
            }
        })))
        .mount(&server)
        .await;

    let node = client(&server).await.fetch_node().await.unwrap();
    assert_eq!(node.name, "edge-01");
    assert!(node.has_multi_port);
    assert_eq!(node.port(), 443);
}

#[tokio::test]
async fn test_fetch_users() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/nodes/3/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "users": [
                { "email": "a@x.io", "username": "alice", "current_traffic": 5, "max_traffic": 100 }
            ]
        })))
        .mount(&server)
        .await;

    let users = client(&server).await.fetch_users().await.unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].username, "alice");
    assert_eq!(users[0].current_traffic, 5);
}

#[tokio::test]
async fn test_patch_user_sends_record() {
    let server = MockServer::start().await;
    let user = User {
        email: "a@x.io".to_string(),
        username: "alice".to_string(),
        current_traffic: 150,
        max_traffic: 100,
    };
    Mock::given(method("PATCH"))
        .and(path("/users/alice"))
        .and(header("authorization", "Bearer node.secret"))
        .and(body_json(&user))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    client(&server).await.patch_user(&user).await.unwrap();
}

#[tokio::test]
async fn test_non_200_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/nodes/3/services"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let result = client(&server).await.fetch_services().await;
    assert!(matches!(
        result,
        Err(ControlPlaneError::Status { status: 204, .. })
    ));
}

#[tokio::test]
async fn test_malformed_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/nodes/3/users"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let result = client(&server).await.fetch_users().await;
    assert!(matches!(result, Err(ControlPlaneError::InvalidResponse(_))));
}

#[tokio::test]
async fn test_unreachable_server() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let client = RayDashClient::new(&uri, 3, "secret").unwrap();
    assert!(matches!(
        client.fetch_node().await,
        Err(ControlPlaneError::Network(_))
    ));
}
