//! Shared quota-aware user registry
//!
//! Built once at boot from the control plane's user listing. After that the
//! set of principals never changes; only traffic counters move. The
//! Reconciler and Collector read it, the Reporter is the only writer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::control_plane::{ControlPlane, ControlPlaneError};
use crate::models::User;

/// Delay between user-listing attempts
pub const BUILD_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("user listing failed after {attempts} attempts: {source}")]
    Listing {
        attempts: u32,
        #[source]
        source: ControlPlaneError,
    },
}

/// Quota state of one principal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaState {
    Available,
    Exhausted,
    /// Not in the registry
    Unknown,
}

/// Handle to the process-wide user table. Clones share the same table.
#[derive(Clone, Default)]
pub struct UserRegistry {
    users: Arc<RwLock<HashMap<String, User>>>,
}

impl UserRegistry {
    /// Build from the control plane, trying up to `attempts` times.
    ///
    /// Records that fail validation are skipped with a warning.
    pub async fn build(
        control_plane: &dyn ControlPlane,
        attempts: u32,
    ) -> Result<Self, RegistryError> {
        let attempts = attempts.max(1);
        let mut attempt = 0;
        let users = loop {
            attempt += 1;
            match control_plane.fetch_users().await {
                Ok(users) => break users,
                Err(e) if attempt < attempts => {
                    warn!(attempt, error = %e, "User listing failed, retrying");
                    tokio::time::sleep(BUILD_RETRY_DELAY).await;
                }
                Err(e) => {
                    return Err(RegistryError::Listing {
                        attempts,
                        source: e,
                    })
                }
            }
        };

        let registry = Self::from_users(users);
        info!(users = registry.len().await, "User registry built");
        Ok(registry)
    }

    pub fn from_users(users: impl IntoIterator<Item = User>) -> Self {
        let mut table = HashMap::new();
        for user in users {
            if let Err(e) = user.validate() {
                warn!(username = %user.username, error = %e, "Skipping invalid user");
                continue;
            }
            table.insert(user.email.clone(), user);
        }
        Self {
            users: Arc::new(RwLock::new(table)),
        }
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }

    /// Snapshot of every principal's email
    pub async fn identities(&self) -> Vec<String> {
        self.users.read().await.keys().cloned().collect()
    }

    pub async fn get(&self, email: &str) -> Option<User> {
        self.users.read().await.get(email).cloned()
    }

    /// Quota state of each email, all read under one lock acquisition
    pub async fn quota_states<'a, I>(&self, emails: I) -> HashMap<String, QuotaState>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let users = self.users.read().await;
        emails
            .into_iter()
            .map(|email| {
                let state = match users.get(email) {
                    Some(u) if u.is_exhausted() => QuotaState::Exhausted,
                    Some(_) => QuotaState::Available,
                    None => QuotaState::Unknown,
                };
                (email.to_string(), state)
            })
            .collect()
    }

    /// Add `delta` to a principal's traffic. Returns the new total, or `None`
    /// when the principal is unknown.
    pub async fn accumulate(&self, email: &str, delta: u64) -> Option<u64> {
        let mut users = self.users.write().await;
        let user = users.get_mut(email)?;
        user.current_traffic = user.current_traffic.saturating_add(delta);
        Some(user.current_traffic)
    }
}
