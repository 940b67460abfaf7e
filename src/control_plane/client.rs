//! HTTP client for the RayDash control plane

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Method, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::{ControlPlane, ControlPlaneError};
use crate::models::{Node, Service, User};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_IDLE_PER_HOST: usize = 10;
const IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// reqwest-backed control plane client. Every request carries
/// `Authorization: Bearer node.<token>`.
pub struct RayDashClient {
    client: Client,
    base_url: Url,
    node_id: u64,
}

#[derive(Debug, Deserialize)]
struct NodeResponse {
    node: Node,
}

#[derive(Debug, Deserialize)]
struct ServicesResponse {
    #[serde(default)]
    services: Vec<Service>,
    #[serde(default)]
    total: u64,
}

#[derive(Debug, Deserialize)]
struct UsersResponse {
    #[serde(default)]
    users: Vec<User>,
}

impl RayDashClient {
    pub fn new(base_url: &str, node_id: u64, token: &str) -> Result<Self, ControlPlaneError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ControlPlaneError::InvalidConfig(format!("url {base_url:?}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ControlPlaneError::InvalidConfig(format!(
                "url {base_url} cannot be used as a base"
            )));
        }

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        let mut auth = header::HeaderValue::from_str(&format!("Bearer node.{token}"))
            .map_err(|e| ControlPlaneError::InvalidConfig(format!("token: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, auth);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .pool_max_idle_per_host(MAX_IDLE_PER_HOST)
            .pool_idle_timeout(IDLE_TIMEOUT)
            .build()
            .map_err(|e| ControlPlaneError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            node_id,
        })
    }

    pub fn node_id(&self) -> u64 {
        self.node_id
    }

    /// Join path segments onto the base URL, percent-encoding each one
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn node_endpoint(&self, suffix: Option<&str>) -> Url {
        let id = self.node_id.to_string();
        match suffix {
            Some(s) => self.endpoint(&["nodes", &id, s]),
            None => self.endpoint(&["nodes", &id]),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ControlPlaneError> {
        let response = self.send(Method::GET, url.clone(), None).await?;
        let body = response
            .json::<T>()
            .await
            .map_err(|e| ControlPlaneError::InvalidResponse(e.to_string()))?;
        debug!(endpoint = %url, "Control plane call succeeded");
        Ok(body)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&User>,
    ) -> Result<reqwest::Response, ControlPlaneError> {
        let mut request = self.client.request(method, url.clone());
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ControlPlaneError::Network(e.to_string()))?;

        // The API contract is 200 exactly, not any 2xx
        if response.status() != reqwest::StatusCode::OK {
            return Err(ControlPlaneError::Status {
                endpoint: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl ControlPlane for RayDashClient {
    async fn fetch_node(&self) -> Result<Node, ControlPlaneError> {
        let response: NodeResponse = self.get_json(self.node_endpoint(None)).await?;
        Ok(response.node)
    }

    async fn fetch_services(&self) -> Result<Vec<Service>, ControlPlaneError> {
        let response: ServicesResponse =
            self.get_json(self.node_endpoint(Some("services"))).await?;
        if response.total != response.services.len() as u64 {
            debug!(
                total = response.total,
                received = response.services.len(),
                "Service total does not match list length"
            );
        }
        Ok(response.services)
    }

    async fn fetch_users(&self) -> Result<Vec<User>, ControlPlaneError> {
        let response: UsersResponse = self.get_json(self.node_endpoint(Some("users"))).await?;
        Ok(response.users)
    }

    async fn patch_user(&self, user: &User) -> Result<(), ControlPlaneError> {
        let url = self.endpoint(&["users", &user.username]);
        self.send(Method::PATCH, url, Some(user)).await?;
        Ok(())
    }
}
