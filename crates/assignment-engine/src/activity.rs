//! # Activity Logging
//!
//! Append-only audit trail of every assignment-affecting transition, plus the
//! per-agent and global analytics read from it.
//!
//! [`ActivityLogger`] is the writer every component goes through. It never
//! returns an error: a failed append is logged and dropped, because the
//! assignment it describes has already been committed and must not be rolled
//! back on account of its audit record.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::agent::AgentId;
use crate::error::Result;
use crate::store::{bounded, ActivitySink};

/// Kind of an activity record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityType {
    Login,
    Logout,
    BreakStarted,
    StatusChanged,
    OrderAssigned,
    OrderRedistributed,
}

impl ActivityType {
    pub const ALL: [ActivityType; 6] = [
        ActivityType::Login,
        ActivityType::Logout,
        ActivityType::BreakStarted,
        ActivityType::StatusChanged,
        ActivityType::OrderAssigned,
        ActivityType::OrderRedistributed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::Login => "LOGIN",
            ActivityType::Logout => "LOGOUT",
            ActivityType::BreakStarted => "BREAK_STARTED",
            ActivityType::StatusChanged => "STATUS_CHANGED",
            ActivityType::OrderAssigned => "ORDER_ASSIGNED",
            ActivityType::OrderRedistributed => "ORDER_REDISTRIBUTED",
        }
    }

    /// Whether the record moved an order onto the agent
    pub fn is_assignment(&self) -> bool {
        matches!(self, ActivityType::OrderAssigned | ActivityType::OrderRedistributed)
    }
}

impl std::str::FromStr for ActivityType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ActivityType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown activity type: {}", s))
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable activity log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: String,
    pub agent_id: AgentId,
    pub activity_type: ActivityType,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

impl ActivityRecord {
    pub fn new(agent_id: AgentId, activity_type: ActivityType, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            agent_id,
            activity_type,
            description: description.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Activity analytics for a single agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentActivityStats {
    pub agent_id: AgentId,
    pub total_records: usize,
    pub counts_by_type: HashMap<ActivityType, usize>,
    /// ORDER_ASSIGNED plus ORDER_REDISTRIBUTED records
    pub orders_received: usize,
    pub last_activity: Option<DateTime<Utc>>,
}

/// Activity analytics across all agents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalActivityStats {
    pub total_records: usize,
    pub counts_by_type: HashMap<ActivityType, usize>,
    pub agents: Vec<AgentActivityStats>,
}

impl AgentActivityStats {
    pub fn from_records<'a>(agent_id: &AgentId, records: impl IntoIterator<Item = &'a ActivityRecord>) -> Self {
        let mut stats = AgentActivityStats {
            agent_id: agent_id.clone(),
            ..Default::default()
        };
        for record in records.into_iter().filter(|r| &r.agent_id == agent_id) {
            stats.total_records += 1;
            *stats.counts_by_type.entry(record.activity_type).or_insert(0) += 1;
            if record.activity_type.is_assignment() {
                stats.orders_received += 1;
            }
            if stats.last_activity.map_or(true, |last| record.timestamp > last) {
                stats.last_activity = Some(record.timestamp);
            }
        }
        stats
    }

    pub fn count(&self, activity_type: ActivityType) -> usize {
        self.counts_by_type.get(&activity_type).copied().unwrap_or(0)
    }
}

impl GlobalActivityStats {
    /// Agents are listed by id
    pub fn from_records(records: &[ActivityRecord]) -> Self {
        let mut counts_by_type = HashMap::new();
        let mut agent_ids: Vec<AgentId> = Vec::new();
        for record in records {
            *counts_by_type.entry(record.activity_type).or_insert(0) += 1;
            if !agent_ids.contains(&record.agent_id) {
                agent_ids.push(record.agent_id.clone());
            }
        }
        agent_ids.sort();
        let agents = agent_ids
            .iter()
            .map(|id| AgentActivityStats::from_records(id, records))
            .collect();
        Self {
            total_records: records.len(),
            counts_by_type,
            agents,
        }
    }

    pub fn count(&self, activity_type: ActivityType) -> usize {
        self.counts_by_type.get(&activity_type).copied().unwrap_or(0)
    }
}

/// Best-effort activity writer and analytics reader
#[derive(Clone)]
pub struct ActivityLogger {
    sink: Arc<dyn ActivitySink>,
    timeout: Duration,
}

impl ActivityLogger {
    pub fn new(sink: Arc<dyn ActivitySink>, timeout: Duration) -> Self {
        Self { sink, timeout }
    }

    /// Append a record; failures are logged, never returned
    pub async fn record(&self, agent_id: &AgentId, activity_type: ActivityType, description: impl Into<String>) {
        let record = ActivityRecord::new(agent_id.clone(), activity_type, description);
        match bounded(self.timeout, "activity.append", self.sink.append(record)).await {
            Ok(()) => debug!("📝 Activity {} recorded for agent {}", activity_type, agent_id),
            Err(e) => warn!("⚠️ Failed to record {} activity for agent {}: {}", activity_type, agent_id, e),
        }
    }

    pub async fn agent_stats(&self, agent_id: &AgentId) -> Result<AgentActivityStats> {
        let records = bounded(self.timeout, "activity.list_for_agent", self.sink.list_for_agent(agent_id)).await?;
        Ok(AgentActivityStats::from_records(agent_id, &records))
    }

    pub async fn global_stats(&self) -> Result<GlobalActivityStats> {
        let records = bounded(self.timeout, "activity.list", self.sink.list(None)).await?;
        Ok(GlobalActivityStats::from_records(&records))
    }

    /// Most recent records first
    pub async fn recent(&self, limit: usize) -> Result<Vec<ActivityRecord>> {
        bounded(self.timeout, "activity.list", self.sink.list(Some(limit))).await
    }
}
