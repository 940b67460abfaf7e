//! Desired-state reconciler
//!
//! Keeps the engine in line with the latest snapshot. The reconciler's
//! `applied` list mirrors what has actually been pushed to the engine: an
//! item only enters it after a successful add and only leaves it after a
//! successful remove, so anything that failed is retried on the next cycle.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::diff::difference;
use crate::engine::{EngineError, EngineUser, InboundSpec, ProxyEngine};
use crate::models::{Node, Service};
use crate::registry::{QuotaState, UserRegistry};

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("shared inbound {tag:?} could not be set up: {source}")]
    SharedInbound {
        tag: String,
        #[source]
        source: EngineError,
    },
}

/// How services map onto engine inbounds. Fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topology {
    /// One inbound per service, tagged with the service id in hex
    MultiInbound,
    /// One shared inbound; services become users on it
    SingleInbound { tag: String },
}

impl Topology {
    pub fn for_node(node: &Node, shared_tag: &str) -> Self {
        if node.has_multi_port {
            Topology::MultiInbound
        } else {
            Topology::SingleInbound {
                tag: shared_tag.to_string(),
            }
        }
    }
}

/// Where the reconciler is within a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Diffing,
    QuotaFiltering,
    Applying,
}

/// Changes to push in one cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub to_add: Vec<Service>,
    pub to_remove: Vec<Service>,
}

/// Outcome of one cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub added: usize,
    pub removed: usize,
    pub failed: usize,
    /// Additions held back because the owner is over quota or unknown
    pub withheld: usize,
    /// Applied services scheduled for removal because the owner is over quota
    pub evicted: usize,
}

/// `to_add = desired - applied`, `to_remove = applied - desired`, by service id
pub fn diff_services(desired: &[Service], applied: &[Service]) -> Plan {
    Plan {
        to_add: difference(desired, applied, |s| s.id),
        to_remove: difference(applied, desired, |s| s.id),
    }
}

/// Apply quota to a plan.
///
/// Additions owned by an exhausted or unknown principal are dropped. Applied
/// services owned by an exhausted principal are scheduled for removal even if
/// still desired. Returns the filtered plan with the number withheld and
/// evicted.
pub fn enforce_quota(
    plan: Plan,
    applied: &[Service],
    quota: &HashMap<String, QuotaState>,
) -> (Plan, usize, usize) {
    let state = |s: &Service| quota.get(s.email()).copied().unwrap_or(QuotaState::Unknown);

    let before = plan.to_add.len();
    let to_add: Vec<Service> = plan
        .to_add
        .into_iter()
        .filter(|s| match state(s) {
            QuotaState::Available => true,
            QuotaState::Exhausted => false,
            QuotaState::Unknown => {
                warn!(service = s.id, email = %s.email(), "Service owner is not a known user");
                false
            }
        })
        .collect();
    let withheld = before - to_add.len();

    let mut to_remove = plan.to_remove;
    let mut scheduled: HashSet<u64> = to_remove.iter().map(|s| s.id).collect();
    let mut evicted = 0;
    for service in applied {
        if state(service) == QuotaState::Exhausted && scheduled.insert(service.id) {
            to_remove.push(service.clone());
            evicted += 1;
        }
    }

    (Plan { to_add, to_remove }, withheld, evicted)
}

/// Applies snapshots to the engine
pub struct Reconciler {
    engine: Arc<dyn ProxyEngine>,
    registry: UserRegistry,
    topology: Topology,
    applied: Vec<Service>,
    phase: Phase,
}

impl Reconciler {
    pub fn new(engine: Arc<dyn ProxyEngine>, registry: UserRegistry, topology: Topology) -> Self {
        Self {
            engine,
            registry,
            topology,
            applied: Vec::new(),
            phase: Phase::Idle,
        }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Services currently pushed to the engine
    pub fn applied(&self) -> &[Service] {
        &self.applied
    }

    /// Prepare the engine for this topology.
    ///
    /// For a shared inbound, any inbound left over under the same tag is
    /// removed and a fresh one with no users is created.
    pub async fn initialize(&mut self, node: &Node) -> Result<(), ReconcileError> {
        let Topology::SingleInbound { tag } = &self.topology else {
            info!("Reconciler using one inbound per service");
            return Ok(());
        };

        let fail = |source| ReconcileError::SharedInbound {
            tag: tag.clone(),
            source,
        };
        let inbound = InboundSpec::shared(tag, node).map_err(fail)?;

        if let Err(e) = self.engine.remove_inbound(tag).await {
            debug!(tag = %tag, error = %e, "No stale inbound removed");
        }
        self.engine.add_inbound(&inbound).await.map_err(fail)?;

        info!(
            tag = %tag,
            port = inbound.port,
            transport = %inbound.transport,
            "Shared inbound ready"
        );
        Ok(())
    }

    /// Work out what one snapshot requires, including quota in single mode
    pub async fn plan(&mut self, desired: &[Service]) -> (Plan, usize, usize) {
        self.phase = Phase::Diffing;
        let plan = diff_services(desired, &self.applied);

        if matches!(self.topology, Topology::MultiInbound) {
            return (plan, 0, 0);
        }

        self.phase = Phase::QuotaFiltering;
        let emails = plan
            .to_add
            .iter()
            .chain(self.applied.iter())
            .map(|s| s.email());
        let quota = self.registry.quota_states(emails).await;
        enforce_quota(plan, &self.applied, &quota)
    }

    /// Run one reconcile cycle for `desired`
    pub async fn reconcile(&mut self, desired: &[Service]) -> CycleReport {
        let (plan, withheld, evicted) = self.plan(desired).await;
        let mut report = CycleReport {
            withheld,
            evicted,
            ..Default::default()
        };

        self.phase = Phase::Applying;
        for service in plan.to_remove {
            match self.remove(&service).await {
                Ok(()) => {
                    self.applied.retain(|s| s.id != service.id);
                    report.removed += 1;
                    info!(service = service.id, email = %service.email(), "Service removed");
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(service = service.id, error = %e, "Failed to remove service");
                }
            }
        }
        for service in plan.to_add {
            match self.add(&service).await {
                Ok(()) => {
                    report.added += 1;
                    info!(service = service.id, email = %service.email(), "Service added");
                    self.applied.push(service);
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(service = service.id, error = %e, "Failed to add service");
                }
            }
        }

        self.phase = Phase::Idle;
        debug!(
            added = report.added,
            removed = report.removed,
            failed = report.failed,
            applied = self.applied.len(),
            "Reconcile cycle finished"
        );
        report
    }

    async fn add(&self, service: &Service) -> Result<(), EngineError> {
        match &self.topology {
            Topology::MultiInbound => {
                let inbound = InboundSpec::for_service(service)?;
                // an inbound left behind by an earlier run holds the tag
                if let Err(e) = self.engine.remove_inbound(&inbound.tag).await {
                    debug!(tag = %inbound.tag, error = %e, "No stale inbound removed");
                }
                self.engine.add_inbound(&inbound).await
            }
            Topology::SingleInbound { tag } => {
                self.engine
                    .add_user(tag, &EngineUser::from_service(service))
                    .await
            }
        }
    }

    async fn remove(&self, service: &Service) -> Result<(), EngineError> {
        match &self.topology {
            Topology::MultiInbound => self.engine.remove_inbound(&service.inbound_tag()).await,
            Topology::SingleInbound { tag } => {
                self.engine.remove_user(tag, service.email()).await
            }
        }
    }

    /// Apply snapshots until the channel closes, draining anything buffered
    pub async fn run(mut self, mut snapshots: mpsc::Receiver<Vec<Service>>) {
        info!("Reconciler started");
        while let Some(desired) = snapshots.recv().await {
            self.reconcile(&desired).await;
        }
        info!(applied = self.applied.len(), "Reconciler stopped");
    }
}
