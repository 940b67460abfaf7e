//! Agent lifecycle
//!
//! Startup order:
//!
//! 1. validate configuration
//! 2. build the user registry
//! 3. start the service poller
//! 4. connect to the engine
//! 5. fetch the node descriptor
//! 6. start the reconciler (shared inbound set up first in single mode)
//! 7. start the stats collector and reporter
//!
//! Shutdown stops the poller, lets the reconciler drain what is buffered,
//! then stops the collector, which in turn ends the reporter.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, info};

use crate::config::{Config, ConfigError};
use crate::control_plane::{ControlPlane, ControlPlaneError, RayDashClient};
use crate::engine::{EngineError, ProxyEngine, V2RayClient};
use crate::models::{Node, Service};
use crate::registry::{RegistryError, UserRegistry};
use crate::worker::{
    ReconcileError, Reconciler, ServicePoller, StatsCollector, StatsReporter, Topology, Worker,
    CHANNEL_CAPACITY,
};

/// Attempts at the boot-time user listing
pub const REGISTRY_ATTEMPTS: u32 = 3;

/// Interval between traffic collections
pub const STATS_INTERVAL: Duration = Duration::from_secs(10);

/// Startup failures. Every variant is fatal.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("control plane client: {0}")]
    Client(ControlPlaneError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("proxy engine unreachable: {0}")]
    Connect(#[source] EngineError),

    #[error("node descriptor unavailable: {0}")]
    Node(#[source] ControlPlaneError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

/// Runtime knobs, resolved from `Config`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSettings {
    pub poll_interval: Duration,
    pub stats_interval: Duration,
    pub connect_timeout: Duration,
    pub inbound_tag: String,
    pub registry_attempts: u32,
}

impl AgentSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            stats_interval: STATS_INTERVAL,
            connect_timeout: config.connect_timeout(),
            inbound_tag: config.v2ray.inbound.clone(),
            registry_attempts: REGISTRY_ATTEMPTS,
        }
    }
}

/// A running agent
pub struct RayAgent {
    node: Node,
    registry: UserRegistry,
    poller: Worker,
    reconciler: Worker,
    collector: Worker,
    reporter: Worker,
}

impl RayAgent {
    /// Start against the control plane and engine named in `config`
    pub async fn start(config: &Config) -> Result<Self, AgentError> {
        config.validate()?;

        let control_plane = RayDashClient::new(
            &config.raydash.url,
            config.raydash.node_id,
            &config.raydash.token,
        )
        .map_err(AgentError::Client)?;

        info!(
            node_id = config.raydash.node_id,
            raydash = %config.raydash.url,
            grpc = %config.v2ray.grpcaddr,
            "Starting rayagent"
        );

        let addr = config.v2ray.grpcaddr.clone();
        Self::start_with(
            AgentSettings::from_config(config),
            Arc::new(control_plane),
            move |timeout| async move {
                V2RayClient::connect(&addr, timeout)
                    .await
                    .map(|client| Arc::new(client) as Arc<dyn ProxyEngine>)
            },
        )
        .await
    }

    /// Start with an explicit control plane and engine connector.
    ///
    /// `connect` is given the connection timeout. If a later step fails, the
    /// workers already running are stopped before the error is returned.
    pub async fn start_with<C, Fut>(
        settings: AgentSettings,
        control_plane: Arc<dyn ControlPlane>,
        connect: C,
    ) -> Result<Self, AgentError>
    where
        C: FnOnce(Duration) -> Fut,
        Fut: Future<Output = Result<Arc<dyn ProxyEngine>, EngineError>>,
    {
        let registry =
            UserRegistry::build(control_plane.as_ref(), settings.registry_attempts).await?;

        let (snapshot_tx, snapshot_rx) = mpsc::channel::<Vec<Service>>(CHANNEL_CAPACITY);
        let poller = ServicePoller::new(control_plane.clone(), settings.poll_interval, snapshot_tx);
        let poller = Worker::spawn("poller", move |stop| poller.run(stop));

        let engine = match connect(settings.connect_timeout).await {
            Ok(engine) => engine,
            Err(e) => {
                abort(poller, snapshot_rx).await;
                return Err(AgentError::Connect(e));
            }
        };

        let node = match control_plane.fetch_node().await {
            Ok(node) => node,
            Err(e) => {
                abort(poller, snapshot_rx).await;
                return Err(AgentError::Node(e));
            }
        };
        info!(
            node = %node.name,
            multi_port = node.has_multi_port,
            "Fetched node descriptor"
        );

        let topology = Topology::for_node(&node, &settings.inbound_tag);
        let mut reconciler = Reconciler::new(engine.clone(), registry.clone(), topology);
        if let Err(e) = reconciler.initialize(&node).await {
            abort(poller, snapshot_rx).await;
            return Err(e.into());
        }
        let reconciler = Worker::spawn_draining("reconciler", reconciler.run(snapshot_rx));

        let (usage_tx, usage_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let collector =
            StatsCollector::new(engine, registry.clone(), settings.stats_interval, usage_tx);
        let collector = Worker::spawn("collector", move |stop| collector.run(stop));

        let reporter = StatsReporter::new(control_plane, registry.clone());
        let reporter = Worker::spawn_draining("reporter", reporter.run(usage_rx));

        info!("Agent started");
        Ok(Self {
            node,
            registry,
            poller,
            reconciler,
            collector,
            reporter,
        })
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn registry(&self) -> &UserRegistry {
        &self.registry
    }

    /// Stop every worker, letting buffered snapshots and samples drain
    pub async fn shutdown(self) {
        info!("Shutting down");
        self.poller.stop().await;
        self.reconciler.join().await;
        self.collector.stop().await;
        self.reporter.join().await;
        info!("Agent stopped");
    }
}

/// Undo a partial startup: only the poller is running at this point
async fn abort(poller: Worker, snapshots: mpsc::Receiver<Vec<Service>>) {
    error!("Startup failed, stopping started workers");
    // Dropping the receiver first unblocks a poller waiting on a full channel
    drop(snapshots);
    poller.stop().await;
}
