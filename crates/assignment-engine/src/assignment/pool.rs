//! Least-loaded agent selection for one batch
//!
//! The pool is loaded once per batch from the store and then becomes the
//! authority for that batch: each successful assignment bumps the in-memory
//! count, so the next pick already sees it. Agents at or over capacity are
//! never picked.

use std::cmp::Ordering;

use crate::agent::AgentId;
use crate::config::BalanceStrategy;

#[derive(Debug, Clone)]
struct PoolSlot {
    agent_id: AgentId,
    max_orders: u32,
    assigned: u64,
}

impl PoolSlot {
    fn has_capacity(&self) -> bool {
        self.assigned < u64::from(self.max_orders)
    }
}

/// Candidate agents with their running counts
#[derive(Debug, Clone)]
pub struct AgentPool {
    slots: Vec<PoolSlot>,
    strategy: BalanceStrategy,
}

impl AgentPool {
    pub fn new(strategy: BalanceStrategy) -> Self {
        Self {
            slots: Vec::new(),
            strategy,
        }
    }

    pub fn push(&mut self, agent_id: AgentId, max_orders: u32, assigned: u64) {
        self.slots.push(PoolSlot {
            agent_id,
            max_orders,
            assigned,
        });
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Running count for `agent_id`, if it is in the pool
    pub fn assigned(&self, agent_id: &AgentId) -> Option<u64> {
        self.slots.iter().find(|s| &s.agent_id == agent_id).map(|s| s.assigned)
    }

    fn compare(&self, a: &PoolSlot, b: &PoolSlot) -> Ordering {
        let load = match self.strategy {
            BalanceStrategy::LeastAssigned => a.assigned.cmp(&b.assigned),
            // a/ma vs b/mb without floats; capacity is non-zero for eligible slots
            BalanceStrategy::LeastUtilized => {
                let lhs = u128::from(a.assigned) * u128::from(b.max_orders);
                let rhs = u128::from(b.assigned) * u128::from(a.max_orders);
                lhs.cmp(&rhs).then_with(|| a.assigned.cmp(&b.assigned))
            }
        };
        load.then_with(|| a.agent_id.cmp(&b.agent_id))
    }

    /// Least-loaded agent with remaining capacity
    pub fn pick(&self) -> Option<&AgentId> {
        self.slots
            .iter()
            .filter(|slot| slot.has_capacity())
            .min_by(|a, b| self.compare(a, b))
            .map(|slot| &slot.agent_id)
    }

    /// Count a committed assignment against `agent_id`
    pub fn record_assignment(&mut self, agent_id: &AgentId) {
        if let Some(slot) = self.slots.iter_mut().find(|s| &s.agent_id == agent_id) {
            slot.assigned += 1;
        }
    }
}
