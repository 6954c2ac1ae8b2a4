//! In-memory presence store

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::agent::{AgentId, PresenceState};
use crate::error::Result;
use crate::presence::{PresenceRecord, PresenceStore, PresenceTransition};

/// Presence entries keyed by agent
///
/// Transitions are computed under the entry lock, so the previous state a
/// writer observes is exactly the state it replaced.
#[derive(Clone, Default)]
pub struct InMemoryPresenceStore {
    entries: Arc<DashMap<AgentId, PresenceRecord>>,
}

impl InMemoryPresenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite an agent's last activity; fixtures use this to age entries
    pub fn set_last_activity(&self, agent_id: &AgentId, at: DateTime<Utc>) -> bool {
        match self.entries.get_mut(agent_id) {
            Some(mut entry) => {
                entry.last_activity = at;
                true
            }
            None => false,
        }
    }

    fn ids_where(&self, predicate: impl Fn(&PresenceRecord) -> bool) -> Vec<AgentId> {
        let mut ids: Vec<AgentId> = self
            .entries
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl PresenceStore for InMemoryPresenceStore {
    async fn set_state(&self, agent_id: &AgentId, state: PresenceState) -> Result<PresenceTransition> {
        let now = Utc::now();
        let mut previous = None;

        self.entries
            .entry(agent_id.clone())
            .and_modify(|entry| {
                previous = Some(entry.state);
                if entry.state != state {
                    entry.state = state;
                    entry.state_since = now;
                }
                entry.last_activity = now;
            })
            .or_insert_with(|| PresenceRecord {
                agent_id: agent_id.clone(),
                state,
                last_activity: now,
                state_since: now,
            });

        Ok(PresenceTransition { previous, current: state })
    }

    async fn get(&self, agent_id: &AgentId) -> Result<Option<PresenceRecord>> {
        Ok(self.entries.get(agent_id).map(|entry| entry.value().clone()))
    }

    async fn touch_activity(&self, agent_id: &AgentId) -> Result<bool> {
        Ok(self.set_last_activity(agent_id, Utc::now()))
    }

    async fn list_in_state(&self, state: PresenceState) -> Result<Vec<AgentId>> {
        Ok(self.ids_where(|record| record.state == state))
    }

    async fn list_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<AgentId>> {
        Ok(self.ids_where(|record| record.state.is_connected() && record.last_activity < cutoff))
    }

    async fn mark_offline_if_stale(&self, agent_id: &AgentId, cutoff: DateTime<Utc>) -> Result<Option<PresenceTransition>> {
        let Some(mut entry) = self.entries.get_mut(agent_id) else {
            return Ok(None);
        };
        if !entry.state.is_connected() || entry.last_activity >= cutoff {
            return Ok(None);
        }

        let previous = entry.state;
        entry.state = PresenceState::Offline;
        entry.state_since = Utc::now();
        Ok(Some(PresenceTransition {
            previous: Some(previous),
            current: PresenceState::Offline,
        }))
    }

    async fn list_all(&self) -> Result<Vec<PresenceRecord>> {
        let mut records: Vec<PresenceRecord> = self.entries.iter().map(|entry| entry.value().clone()).collect();
        records.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        Ok(records)
    }
}
