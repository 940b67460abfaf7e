//! Usage reporting to the control plane

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::control_plane::{ControlPlane, ControlPlaneError};
use crate::models::UsageSample;
use crate::registry::UserRegistry;

/// What happened to one sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    /// Zero delta, nothing to do
    Empty,
    /// Sample for a user the registry does not know
    UnknownUser,
    /// Traffic accumulated and the new total pushed
    Pushed { total: u64 },
}

/// Folds usage samples into the registry and pushes each updated user to
/// the control plane.
pub struct StatsReporter {
    control_plane: Arc<dyn ControlPlane>,
    registry: UserRegistry,
}

impl StatsReporter {
    pub fn new(control_plane: Arc<dyn ControlPlane>, registry: UserRegistry) -> Self {
        Self {
            control_plane,
            registry,
        }
    }

    /// Handle one sample.
    ///
    /// Accumulation and the push are separate steps. When the push fails the
    /// registry keeps the new total and the next successful push carries it.
    pub async fn report(&self, sample: &UsageSample) -> Result<Report, ControlPlaneError> {
        if sample.is_empty() {
            return Ok(Report::Empty);
        }

        let Some(total) = self.registry.accumulate(&sample.email, sample.traffic).await else {
            return Ok(Report::UnknownUser);
        };
        let Some(user) = self.registry.get(&sample.email).await else {
            return Ok(Report::UnknownUser);
        };

        self.control_plane.patch_user(&user).await?;
        debug!(email = %sample.email, delta = sample.traffic, total, "Usage reported");
        Ok(Report::Pushed { total })
    }

    /// Report samples until the channel closes
    pub async fn run(self, mut samples: mpsc::Receiver<UsageSample>) {
        info!("Stats reporter started");
        while let Some(sample) = samples.recv().await {
            match self.report(&sample).await {
                Ok(Report::UnknownUser) => {
                    warn!(email = %sample.email, "Usage sample for unknown user");
                }
                Ok(_) => {}
                Err(e) => warn!(email = %sample.email, error = %e, "Failed to push usage"),
            }
        }
        info!("Stats reporter stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_plane::MockControlPlane;
    use crate::models::User;

    fn setup() -> (Arc<MockControlPlane>, UserRegistry, StatsReporter) {
        let cp = Arc::new(MockControlPlane::new());
        let registry = UserRegistry::from_users(vec![User {
            email: "a@x.io".to_string(),
            username: "alice".to_string(),
            current_traffic: 10,
            max_traffic: 1000,
        }]);
        let reporter = StatsReporter::new(cp.clone(), registry.clone());
        (cp, registry, reporter)
    }

    #[tokio::test]
    async fn test_empty_sample_is_ignored() {
        let (cp, _, reporter) = setup();
        assert_eq!(
            reporter.report(&UsageSample::new("a@x.io", 0)).await.unwrap(),
            Report::Empty
        );
        assert!(cp.patched().is_empty());
    }

    #[tokio::test]
    async fn test_sample_accumulated_and_pushed() {
        let (cp, registry, reporter) = setup();
        assert_eq!(
            reporter.report(&UsageSample::new("a@x.io", 5)).await.unwrap(),
            Report::Pushed { total: 15 }
        );
        assert_eq!(registry.get("a@x.io").await.unwrap().current_traffic, 15);

        let patched = cp.patched();
        assert_eq!(patched.len(), 1);
        assert_eq!(patched[0].username, "alice");
        assert_eq!(patched[0].current_traffic, 15);
    }

    #[tokio::test]
    async fn test_failed_push_keeps_total() {
        let (cp, registry, reporter) = setup();
        cp.fail_patches(1);

        assert!(reporter.report(&UsageSample::new("a@x.io", 5)).await.is_err());
        assert_eq!(registry.get("a@x.io").await.unwrap().current_traffic, 15);

        reporter.report(&UsageSample::new("a@x.io", 1)).await.unwrap();
        assert_eq!(cp.patched()[0].current_traffic, 16);
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let (cp, _, reporter) = setup();
        assert_eq!(
            reporter.report(&UsageSample::new("ghost@x.io", 5)).await.unwrap(),
            Report::UnknownUser
        );
        assert!(cp.patched().is_empty());
    }
}
