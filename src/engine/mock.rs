//! In-memory proxy engine for tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use super::inbound::{EngineUser, InboundSpec};
use super::{downlink_counter, uplink_counter, EngineError, ProxyEngine};

/// A call observed by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    AddInbound(String),
    RemoveInbound(String),
    AddUser { tag: String, email: String },
    RemoveUser { tag: String, email: String },
    QueryStats(String),
}

#[derive(Default)]
struct State {
    inbounds: BTreeMap<String, InboundSpec>,
    counters: HashMap<String, u64>,
    failing_tags: HashSet<String>,
    failing_users: HashSet<String>,
    failing_stats: HashSet<String>,
    failing_counters: HashSet<String>,
    calls: Vec<EngineCall>,
}

/// Mock engine.
///
/// Behaves like v2ray for the calls the agent makes: inbound tags are unique,
/// users live inside inbounds, and counters reset on read. Failures can be
/// injected per inbound tag, per user email and per stats email.
#[derive(Default)]
pub struct MockEngine {
    state: Mutex<State>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add traffic to a user's uplink and downlink counters
    pub fn record_traffic(&self, email: &str, uplink: u64, downlink: u64) {
        let mut state = self.state();
        *state.counters.entry(uplink_counter(email)).or_default() += uplink;
        *state.counters.entry(downlink_counter(email)).or_default() += downlink;
    }

    /// Seed an inbound as if left over from an earlier run
    pub fn seed_inbound(&self, inbound: InboundSpec) {
        self.state().inbounds.insert(inbound.tag.clone(), inbound);
    }

    /// Fail every call targeting inbound `tag`
    pub fn fail_inbound(&self, tag: &str) {
        self.state().failing_tags.insert(tag.to_string());
    }

    /// Fail every add/remove of user `email`
    pub fn fail_user(&self, email: &str) {
        self.state().failing_users.insert(email.to_string());
    }

    /// Fail stats queries for user `email`
    pub fn fail_stats(&self, email: &str) {
        self.state().failing_stats.insert(email.to_string());
    }

    /// Fail queries of the single counter `name`
    pub fn fail_counter(&self, name: &str) {
        self.state().failing_counters.insert(name.to_string());
    }

    /// Clear all injected failures
    pub fn heal(&self) {
        let mut state = self.state();
        state.failing_tags.clear();
        state.failing_users.clear();
        state.failing_stats.clear();
        state.failing_counters.clear();
    }

    pub fn inbound_tags(&self) -> Vec<String> {
        self.state().inbounds.keys().cloned().collect()
    }

    pub fn inbound(&self, tag: &str) -> Option<InboundSpec> {
        self.state().inbounds.get(tag).cloned()
    }

    /// Emails of the users currently in inbound `tag`
    pub fn users_of(&self, tag: &str) -> Vec<String> {
        self.state()
            .inbounds
            .get(tag)
            .map(|i| i.users.iter().map(|u| u.email.clone()).collect())
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }
}

fn injected(method: &'static str) -> EngineError {
    EngineError::Rpc {
        method,
        message: "injected failure".to_string(),
    }
}

#[async_trait]
impl ProxyEngine for MockEngine {
    async fn add_inbound(&self, inbound: &InboundSpec) -> Result<(), EngineError> {
        let mut state = self.state();
        state.calls.push(EngineCall::AddInbound(inbound.tag.clone()));
        if state.failing_tags.contains(&inbound.tag) {
            return Err(injected("AddInbound"));
        }
        if state.inbounds.contains_key(&inbound.tag) {
            return Err(EngineError::Rpc {
                method: "AddInbound",
                message: format!("existing tag found: {}", inbound.tag),
            });
        }
        state.inbounds.insert(inbound.tag.clone(), inbound.clone());
        Ok(())
    }

    async fn remove_inbound(&self, tag: &str) -> Result<(), EngineError> {
        let mut state = self.state();
        state.calls.push(EngineCall::RemoveInbound(tag.to_string()));
        if state.failing_tags.contains(tag) {
            return Err(injected("RemoveInbound"));
        }
        match state.inbounds.remove(tag) {
            Some(_) => Ok(()),
            None => Err(EngineError::Rpc {
                method: "RemoveInbound",
                message: format!("handler not found: {tag}"),
            }),
        }
    }

    async fn add_user(&self, tag: &str, user: &EngineUser) -> Result<(), EngineError> {
        let mut state = self.state();
        state.calls.push(EngineCall::AddUser {
            tag: tag.to_string(),
            email: user.email.clone(),
        });
        if state.failing_tags.contains(tag) || state.failing_users.contains(&user.email) {
            return Err(injected("AlterInbound"));
        }
        let inbound = state.inbounds.get_mut(tag).ok_or_else(|| EngineError::Rpc {
            method: "AlterInbound",
            message: format!("handler not found: {tag}"),
        })?;
        if inbound.users.iter().any(|u| u.email == user.email) {
            return Err(EngineError::Rpc {
                method: "AlterInbound",
                message: format!("User {} already exists.", user.email),
            });
        }
        inbound.users.push(user.clone());
        Ok(())
    }

    async fn remove_user(&self, tag: &str, email: &str) -> Result<(), EngineError> {
        let mut state = self.state();
        state.calls.push(EngineCall::RemoveUser {
            tag: tag.to_string(),
            email: email.to_string(),
        });
        if state.failing_tags.contains(tag) || state.failing_users.contains(email) {
            return Err(injected("AlterInbound"));
        }
        let inbound = state.inbounds.get_mut(tag).ok_or_else(|| EngineError::Rpc {
            method: "AlterInbound",
            message: format!("handler not found: {tag}"),
        })?;
        let before = inbound.users.len();
        inbound.users.retain(|u| u.email != email);
        if inbound.users.len() == before {
            return Err(EngineError::Rpc {
                method: "AlterInbound",
                message: format!("User {email} not found."),
            });
        }
        Ok(())
    }

    async fn query_stats(&self, name: &str, reset: bool) -> Result<u64, EngineError> {
        let mut state = self.state();
        state.calls.push(EngineCall::QueryStats(name.to_string()));
        let failing = name
            .strip_prefix("user>>>")
            .and_then(|rest| rest.split(">>>").next())
            .is_some_and(|email| state.failing_stats.contains(email));
        if failing || state.failing_counters.contains(name) {
            return Err(injected("GetStats"));
        }
        let value = if reset {
            state.counters.get_mut(name).map(std::mem::take)
        } else {
            state.counters.get(name).copied()
        };
        value.ok_or_else(|| EngineError::CounterNotFound(name.to_string()))
    }
}
