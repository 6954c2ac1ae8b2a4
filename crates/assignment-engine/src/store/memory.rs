//! In-memory store implementations
//!
//! Backed by `DashMap` so concurrent assignment operations contend per
//! entry. [`InMemoryOrderStore::conditional_assign`] holds the entry's write
//! guard across the check and the write, which is what makes it atomic.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;

use crate::activity::ActivityRecord;
use crate::agent::{Agent, AgentId, AgentRole};
use crate::error::Result;
use crate::order::{AssigneeFilter, Order, OrderId, OrderQuery, OrderStatus};
use crate::store::{ActivitySink, AgentDirectory, OrderStore};

/// Order store held in memory
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    orders: Arc<DashMap<OrderId, Order>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_order(&self, order: Order) {
        self.orders.insert(order.id.clone(), order);
    }

    /// Status changes belong to fulfillment; exposed here for fixtures and tools
    pub fn set_status(&self, order_id: &OrderId, status: OrderStatus) -> bool {
        match self.orders.get_mut(order_id) {
            Some(mut order) => {
                order.status = status;
                true
            }
            None => false,
        }
    }

    pub fn snapshot(&self) -> Vec<Order> {
        let mut orders: Vec<Order> = self.orders.iter().map(|entry| entry.value().clone()).collect();
        orders.sort_by(|a, b| a.id.cmp(&b.id));
        orders
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    fn query(&self, query: &OrderQuery) -> Vec<Order> {
        query.apply(self.orders.iter().map(|entry| entry.value().clone()))
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn get_order(&self, order_id: &OrderId) -> Result<Option<Order>> {
        Ok(self.orders.get(order_id).map(|entry| entry.value().clone()))
    }

    async fn find_unassigned_orders(&self, query: &OrderQuery) -> Result<Vec<Order>> {
        let mut query = query.clone();
        query.assignee = AssigneeFilter::Unassigned;
        Ok(self.query(&query))
    }

    async fn find_assigned_orders(&self, query: &OrderQuery) -> Result<Vec<Order>> {
        let mut query = query.clone();
        if query.assignee == AssigneeFilter::Unassigned {
            query.assignee = AssigneeFilter::AnyAgent;
        }
        Ok(self.query(&query))
    }

    async fn conditional_assign(
        &self,
        order_id: &OrderId,
        agent_id: &AgentId,
        expected: Option<&AgentId>,
    ) -> Result<bool> {
        let Some(mut order) = self.orders.get_mut(order_id) else {
            return Ok(false);
        };
        if order.assigned_agent_id.as_ref() != expected {
            return Ok(false);
        }
        order.assigned_agent_id = Some(agent_id.clone());
        order.assigned_at = Some(Utc::now());
        Ok(true)
    }

    async fn count_assigned_for_agent(&self, agent_id: &AgentId, excluded: &[OrderStatus]) -> Result<u64> {
        let count = self
            .orders
            .iter()
            .filter(|entry| {
                let order = entry.value();
                order.assigned_agent_id.as_ref() == Some(agent_id) && !excluded.contains(&order.status)
            })
            .count();
        Ok(count as u64)
    }
}

/// Agent directory held in memory
#[derive(Clone, Default)]
pub struct InMemoryAgentDirectory {
    agents: Arc<DashMap<AgentId, Agent>>,
}

impl InMemoryAgentDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_agent(&self, agent: Agent) {
        self.agents.insert(agent.id.clone(), agent);
    }

    pub fn set_active(&self, agent_id: &AgentId, active: bool) -> bool {
        match self.agents.get_mut(agent_id) {
            Some(mut agent) => {
                agent.is_active = active;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl AgentDirectory for InMemoryAgentDirectory {
    async fn list_eligible_agents(&self, role: AgentRole, active_only: bool) -> Result<Vec<Agent>> {
        let mut agents: Vec<Agent> = self
            .agents
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|agent| agent.role == role && (!active_only || agent.is_active))
            .collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(agents)
    }

    async fn get_agent(&self, agent_id: &AgentId) -> Result<Option<Agent>> {
        Ok(self.agents.get(agent_id).map(|entry| entry.value().clone()))
    }
}

/// Activity log held in memory, in append order
#[derive(Clone, Default)]
pub struct InMemoryActivityLog {
    records: Arc<RwLock<Vec<ActivityRecord>>>,
}

impl InMemoryActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Records in append order
    pub fn records(&self) -> Vec<ActivityRecord> {
        self.records.read().clone()
    }
}

#[async_trait]
impl ActivitySink for InMemoryActivityLog {
    async fn append(&self, record: ActivityRecord) -> Result<()> {
        self.records.write().push(record);
        Ok(())
    }

    async fn list(&self, limit: Option<usize>) -> Result<Vec<ActivityRecord>> {
        let records = self.records.read();
        let take = limit.unwrap_or(records.len());
        Ok(records.iter().rev().take(take).cloned().collect())
    }

    async fn list_for_agent(&self, agent_id: &AgentId) -> Result<Vec<ActivityRecord>> {
        Ok(self
            .records
            .read()
            .iter()
            .rev()
            .filter(|record| &record.agent_id == agent_id)
            .cloned()
            .collect())
    }
}
