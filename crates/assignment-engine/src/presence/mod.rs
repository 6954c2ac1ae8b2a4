//! # Presence Tracking
//!
//! Agent connectivity lives in a store separate from orders. It is best
//! effort and may lag reality by up to one heartbeat interval.
//!
//! [`PresenceStore`] is the storage seam. Its one hard requirement is that
//! [`PresenceStore::set_state`] reports the previous state atomically with
//! the write, so that of several concurrent "go offline" calls exactly one
//! observes the connected-to-offline edge. The engine fires offline
//! redistribution from that edge and nowhere else.
//!
//! [`PresenceTracker`] is the adapter the engine uses: it bounds every call
//! with the configured timeout and exposes the narrow online/offline view.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::{AgentId, PresenceState};
use crate::error::Result;
use crate::store::bounded;

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryPresenceStore;
pub use sqlite::SqlitePresenceStore;

/// Stored presence of one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub agent_id: AgentId,
    pub state: PresenceState,
    /// Last heartbeat or explicit activity
    pub last_activity: DateTime<Utc>,
    /// When `state` was entered
    pub state_since: DateTime<Utc>,
}

/// Result of a presence write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceTransition {
    /// `None` when the agent had no presence entry
    pub previous: Option<PresenceState>,
    pub current: PresenceState,
}

impl PresenceTransition {
    pub fn changed(&self) -> bool {
        self.previous != Some(self.current)
    }

    /// A connected agent just became offline
    pub fn went_offline(&self) -> bool {
        self.current == PresenceState::Offline && self.previous.map_or(false, |p| p.is_connected())
    }

    /// The agent just became able to receive orders
    pub fn came_online(&self) -> bool {
        self.current.accepts_orders() && !self.previous.map_or(false, |p| p.accepts_orders())
    }
}

/// Presence storage
#[async_trait]
pub trait PresenceStore: Send + Sync {
    /// Write `state` and return what it replaced
    ///
    /// Must be atomic per agent: concurrent writers each see a distinct
    /// previous state. Also refreshes `last_activity`.
    async fn set_state(&self, agent_id: &AgentId, state: PresenceState) -> Result<PresenceTransition>;

    async fn get(&self, agent_id: &AgentId) -> Result<Option<PresenceRecord>>;

    /// Refresh `last_activity`; returns `false` if the agent has no entry
    async fn touch_activity(&self, agent_id: &AgentId) -> Result<bool>;

    /// Agents currently in `state`, sorted by id
    async fn list_in_state(&self, state: PresenceState) -> Result<Vec<AgentId>>;

    /// Connected agents whose last activity is before `cutoff`, sorted by id
    async fn list_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<AgentId>>;

    /// Take the agent offline only if it is connected and its last activity
    /// is still before `cutoff`
    ///
    /// Checked atomically with the write, so a heartbeat that lands after
    /// [`list_stale`](Self::list_stale) keeps the agent connected. `None`
    /// when nothing was written. Leaves `last_activity` untouched.
    async fn mark_offline_if_stale(&self, agent_id: &AgentId, cutoff: DateTime<Utc>) -> Result<Option<PresenceTransition>>;

    async fn list_all(&self) -> Result<Vec<PresenceRecord>>;
}

/// Bounded presence adapter used by the engine
#[derive(Clone)]
pub struct PresenceTracker {
    store: Arc<dyn PresenceStore>,
    timeout: Duration,
}

impl PresenceTracker {
    pub fn new(store: Arc<dyn PresenceStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub async fn set_online(&self, agent_id: &AgentId) -> Result<PresenceTransition> {
        self.set_state(agent_id, PresenceState::Online).await
    }

    pub async fn set_offline(&self, agent_id: &AgentId) -> Result<PresenceTransition> {
        self.set_state(agent_id, PresenceState::Offline).await
    }

    pub async fn set_state(&self, agent_id: &AgentId, state: PresenceState) -> Result<PresenceTransition> {
        bounded(self.timeout, "presence.set_state", self.store.set_state(agent_id, state)).await
    }

    /// Unknown agents are offline
    pub async fn state_of(&self, agent_id: &AgentId) -> Result<PresenceState> {
        let record = bounded(self.timeout, "presence.get", self.store.get(agent_id)).await?;
        Ok(record.map_or(PresenceState::Offline, |r| r.state))
    }

    pub async fn is_online(&self, agent_id: &AgentId) -> Result<bool> {
        Ok(self.state_of(agent_id).await?.accepts_orders())
    }

    pub async fn touch_activity(&self, agent_id: &AgentId) -> Result<bool> {
        bounded(self.timeout, "presence.touch_activity", self.store.touch_activity(agent_id)).await
    }

    pub async fn list_online_agent_ids(&self) -> Result<BTreeSet<AgentId>> {
        let ids = bounded(
            self.timeout,
            "presence.list_online",
            self.store.list_in_state(PresenceState::Online),
        )
        .await?;
        Ok(ids.into_iter().collect())
    }

    pub async fn list_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<AgentId>> {
        bounded(self.timeout, "presence.list_stale", self.store.list_stale(cutoff)).await
    }

    pub async fn mark_offline_if_stale(
        &self,
        agent_id: &AgentId,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<PresenceTransition>> {
        bounded(
            self.timeout,
            "presence.mark_offline_if_stale",
            self.store.mark_offline_if_stale(agent_id, cutoff),
        )
        .await
    }

    pub async fn list_all(&self) -> Result<Vec<PresenceRecord>> {
        bounded(self.timeout, "presence.list_all", self.store.list_all()).await
    }
}
