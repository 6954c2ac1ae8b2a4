//! # Assignment Operations
//!
//! The four mutating components of the engine:
//!
//! - [`round_robin::AutoAssigner`]: places unassigned orders on the
//!   least-loaded eligible online agent
//! - [`manual::ManualReassigner`]: moves one order to a named agent
//! - [`bulk::BulkReassigner`]: spreads a batch of orders over target agents by
//!   exact percentage ratios
//! - [`redistribution::OfflineRedistributor`]: hands the untouched orders of a
//!   disconnected agent to the online pool
//!
//! All of them share one [`AssignmentContext`] and write through
//! [`OrderStore::conditional_assign`](crate::store::OrderStore::conditional_assign),
//! so no order is ever held by two agents whatever the interleaving.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::activity::ActivityLogger;
use crate::agent::{AgentId, AgentRole};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::events::EventSink;
use crate::presence::PresenceTracker;
use crate::store::{bounded, AgentDirectory, OrderStore};
use crate::workload::WorkloadReader;

pub mod bulk;
pub mod manual;
pub mod pool;
pub mod redistribution;
pub mod round_robin;
pub mod types;

pub use bulk::{ratio_sequence, BulkReassigner};
pub use manual::ManualReassigner;
pub use pool::AgentPool;
pub use redistribution::OfflineRedistributor;
pub use round_robin::AutoAssigner;
pub use types::{
    AssignmentRun, BulkReassignRequest, BulkReassignResult, OrderOutcome, RedistributionResult, SelectionType,
    TargetAgentSpec,
};

/// Collaborators shared by every assignment component
pub struct AssignmentContext {
    pub orders: Arc<dyn OrderStore>,
    pub directory: Arc<dyn AgentDirectory>,
    pub presence: PresenceTracker,
    pub workload: WorkloadReader,
    pub activity: ActivityLogger,
    pub events: Arc<dyn EventSink>,
    pub config: EngineConfig,
}

impl AssignmentContext {
    pub fn timeout(&self) -> Duration {
        self.config.store.operation_timeout()
    }

    /// Online, active follow-up agents with their current counts
    ///
    /// Agents at capacity are included; [`AgentPool::pick`] skips them.
    pub async fn load_pool(&self, exclude: Option<&AgentId>) -> Result<AgentPool> {
        let agents = bounded(
            self.timeout(),
            "directory.list_eligible_agents",
            self.directory.list_eligible_agents(AgentRole::FollowUpAgent, true),
        )
        .await?;
        let online = self.presence.list_online_agent_ids().await?;

        let mut pool = AgentPool::new(self.config.assignment.balance_strategy);
        for agent in agents {
            if !agent.can_receive_orders() || !online.contains(&agent.id) || Some(&agent.id) == exclude {
                continue;
            }
            let assigned = self.workload.count_for(&agent.id).await?;
            pool.push(agent.id, agent.max_orders, assigned);
        }

        debug!("Loaded pool of {} online agents", pool.len());
        Ok(pool)
    }
}
