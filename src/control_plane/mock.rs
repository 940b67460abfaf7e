//! In-memory control plane for tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ControlPlane, ControlPlaneError};
use crate::models::{Node, Service, User};

/// Mock control plane.
///
/// Serves a fixed node and user list, and either a queue of service
/// snapshots (one per poll) or the last snapshot repeatedly. Every PATCH is
/// recorded. Failures can be injected per call kind.
pub struct MockControlPlane {
    node: Mutex<Option<Node>>,
    users: Mutex<Vec<User>>,
    snapshots: Mutex<VecDeque<Vec<Service>>>,
    current: Mutex<Vec<Service>>,
    patched: Mutex<Vec<User>>,
    user_failures: AtomicU32,
    service_failures: AtomicU32,
    patch_failures: AtomicU32,
    user_calls: AtomicU32,
    service_calls: AtomicU32,
}

impl MockControlPlane {
    pub fn new() -> Self {
        Self {
            node: Mutex::new(Some(Node::default())),
            users: Mutex::new(Vec::new()),
            snapshots: Mutex::new(VecDeque::new()),
            current: Mutex::new(Vec::new()),
            patched: Mutex::new(Vec::new()),
            user_failures: AtomicU32::new(0),
            service_failures: AtomicU32::new(0),
            patch_failures: AtomicU32::new(0),
            user_calls: AtomicU32::new(0),
            service_calls: AtomicU32::new(0),
        }
    }

    /// Set the node descriptor. `None` makes `fetch_node` fail.
    pub fn with_node(self, node: Option<Node>) -> Self {
        *lock(&self.node) = node;
        self
    }

    pub fn with_users(self, users: Vec<User>) -> Self {
        *lock(&self.users) = users;
        self
    }

    /// Services returned on every poll once the snapshot queue is empty
    pub fn with_services(self, services: Vec<Service>) -> Self {
        *lock(&self.current) = services;
        self
    }

    /// Queue a snapshot to be returned by the next poll
    pub fn push_snapshot(&self, services: Vec<Service>) {
        lock(&self.snapshots).push_back(services);
    }

    pub fn set_services(&self, services: Vec<Service>) {
        *lock(&self.current) = services;
    }

    /// Fail the next `n` user listings
    pub fn fail_user_listing(&self, n: u32) {
        self.user_failures.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` service listings
    pub fn fail_service_listing(&self, n: u32) {
        self.service_failures.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` user patches
    pub fn fail_patches(&self, n: u32) {
        self.patch_failures.store(n, Ordering::SeqCst);
    }

    /// Every user successfully patched, in order
    pub fn patched(&self) -> Vec<User> {
        lock(&self.patched).clone()
    }

    pub fn user_calls(&self) -> u32 {
        self.user_calls.load(Ordering::SeqCst)
    }

    pub fn service_calls(&self) -> u32 {
        self.service_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn take_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl ControlPlane for MockControlPlane {
    async fn fetch_node(&self) -> Result<Node, ControlPlaneError> {
        lock(&self.node).clone().ok_or(ControlPlaneError::Status {
            endpoint: "mock://nodes".to_string(),
            status: 404,
        })
    }

    async fn fetch_services(&self) -> Result<Vec<Service>, ControlPlaneError> {
        self.service_calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.service_failures) {
            return Err(ControlPlaneError::Network("injected failure".to_string()));
        }
        if let Some(next) = lock(&self.snapshots).pop_front() {
            *lock(&self.current) = next.clone();
            return Ok(next);
        }
        Ok(lock(&self.current).clone())
    }

    async fn fetch_users(&self) -> Result<Vec<User>, ControlPlaneError> {
        self.user_calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.user_failures) {
            return Err(ControlPlaneError::Status {
                endpoint: "mock://users".to_string(),
                status: 503,
            });
        }
        Ok(lock(&self.users).clone())
    }

    async fn patch_user(&self, user: &User) -> Result<(), ControlPlaneError> {
        if take_failure(&self.patch_failures) {
            return Err(ControlPlaneError::Network("injected failure".to_string()));
        }
        lock(&self.patched).push(user.clone());
        Ok(())
    }
}
