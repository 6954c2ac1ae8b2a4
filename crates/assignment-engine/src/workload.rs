//! # Workload Reader
//!
//! Per-agent order counts, capacity and utilization, plus the aggregate
//! view dashboards poll. All counting goes through [`WorkloadReader::count_for`],
//! which applies [`OrderStatus::WORKLOAD_EXCLUDED`]; nothing else in the
//! crate counts orders for capacity purposes.
//!
//! Reads only. Calling any method twice without an intervening mutation
//! returns the same figures.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::agent::{Agent, AgentId, AgentRole, PresenceState};
use crate::error::Result;
use crate::order::OrderStatus;
use crate::presence::PresenceTracker;
use crate::store::{bounded, AgentDirectory, OrderStore};

/// `assigned / max_orders`; an agent without capacity is always full
pub fn utilization_rate(assigned: u64, max_orders: u32) -> f64 {
    if max_orders == 0 {
        return 1.0;
    }
    assigned as f64 / f64::from(max_orders)
}

/// Workload of one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentWorkload {
    pub agent_id: AgentId,
    pub display_name: String,
    pub assigned_orders: u64,
    pub max_orders: u32,
    pub utilization_rate: f64,
    pub presence: PresenceState,
}

impl AgentWorkload {
    pub fn new(agent: &Agent, assigned_orders: u64, presence: PresenceState) -> Self {
        Self {
            agent_id: agent.id.clone(),
            display_name: agent.display_name.clone(),
            assigned_orders,
            max_orders: agent.max_orders,
            utilization_rate: utilization_rate(assigned_orders, agent.max_orders),
            presence,
        }
    }

    pub fn has_capacity(&self) -> bool {
        self.utilization_rate < 1.0
    }
}

/// Workload across all active follow-up agents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkloadSummary {
    pub total_agents: usize,
    /// Agents whose presence is ONLINE
    pub online_agents: usize,
    /// Every other agent, including BUSY and BREAK
    pub offline_agents: usize,
    /// Sorted by agent id
    pub agent_workloads: Vec<AgentWorkload>,
}

/// Reads workload figures from the order store
#[derive(Clone)]
pub struct WorkloadReader {
    orders: Arc<dyn OrderStore>,
    directory: Arc<dyn AgentDirectory>,
    presence: PresenceTracker,
    timeout: Duration,
}

impl WorkloadReader {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        directory: Arc<dyn AgentDirectory>,
        presence: PresenceTracker,
        timeout: Duration,
    ) -> Self {
        Self {
            orders,
            directory,
            presence,
            timeout,
        }
    }

    /// Orders that count toward `agent_id`'s capacity
    pub async fn count_for(&self, agent_id: &AgentId) -> Result<u64> {
        bounded(
            self.timeout,
            "orders.count_assigned_for_agent",
            self.orders.count_assigned_for_agent(agent_id, &OrderStatus::WORKLOAD_EXCLUDED),
        )
        .await
    }

    /// Workload of a single agent; `None` if the directory does not know it
    pub async fn agent_workload(&self, agent_id: &AgentId) -> Result<Option<AgentWorkload>> {
        let agent = bounded(self.timeout, "directory.get_agent", self.directory.get_agent(agent_id)).await?;
        let Some(agent) = agent else {
            return Ok(None);
        };
        let assigned = self.count_for(agent_id).await?;
        let presence = self.presence.state_of(agent_id).await?;
        Ok(Some(AgentWorkload::new(&agent, assigned, presence)))
    }

    pub async fn summary(&self) -> Result<WorkloadSummary> {
        let agents = bounded(
            self.timeout,
            "directory.list_eligible_agents",
            self.directory.list_eligible_agents(AgentRole::FollowUpAgent, true),
        )
        .await?;

        let presence: HashMap<AgentId, PresenceState> = self
            .presence
            .list_all()
            .await?
            .into_iter()
            .map(|record| (record.agent_id, record.state))
            .collect();

        let mut agent_workloads = Vec::with_capacity(agents.len());
        for agent in &agents {
            let assigned = self.count_for(&agent.id).await?;
            let state = presence.get(&agent.id).copied().unwrap_or(PresenceState::Offline);
            agent_workloads.push(AgentWorkload::new(agent, assigned, state));
        }

        let online_agents = agent_workloads
            .iter()
            .filter(|w| w.presence.accepts_orders())
            .count();
        debug!("📊 Workload summary: {} agents, {} online", agents.len(), online_agents);

        Ok(WorkloadSummary {
            total_agents: agent_workloads.len(),
            online_agents,
            offline_agents: agent_workloads.len() - online_agents,
            agent_workloads,
        })
    }
}
