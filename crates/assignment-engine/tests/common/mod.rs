//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::broadcast;

use dispatch_assignment_engine::prelude::*;
use dispatch_assignment_engine::order::OrderQuery;
use dispatch_assignment_engine::presence::{PresenceRecord, PresenceTransition};

/// Engine over in-memory stores, with handles to every store
pub struct TestHarness {
    pub engine: AssignmentEngine,
    pub orders: InMemoryOrderStore,
    pub directory: InMemoryAgentDirectory,
    pub activity: InMemoryActivityLog,
    pub presence: InMemoryPresenceStore,
    pub events: BroadcastEventSink,
}

pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.store.operation_timeout_ms = 1_000;
    config
}

pub fn create_test_harness() -> TestHarness {
    create_test_harness_with(test_config())
}

pub fn create_test_harness_with(config: EngineConfig) -> TestHarness {
    let orders = InMemoryOrderStore::new();
    let harness_orders: Arc<dyn OrderStore> = Arc::new(orders.clone());
    build_harness(config, orders, harness_orders)
}

/// Harness whose engine talks to `order_store` while `orders` stays inspectable
pub fn build_harness(config: EngineConfig, orders: InMemoryOrderStore, order_store: Arc<dyn OrderStore>) -> TestHarness {
    let presence = InMemoryPresenceStore::new();
    assemble(config, orders, order_store, presence.clone(), Arc::new(presence))
}

/// Harness whose engine talks to `presence_store` while `presence` stays inspectable
pub fn build_harness_with_presence(
    config: EngineConfig,
    presence: InMemoryPresenceStore,
    presence_store: Arc<dyn PresenceStore>,
) -> TestHarness {
    let orders = InMemoryOrderStore::new();
    assemble(config, orders.clone(), Arc::new(orders), presence, presence_store)
}

fn assemble(
    config: EngineConfig,
    orders: InMemoryOrderStore,
    order_store: Arc<dyn OrderStore>,
    presence: InMemoryPresenceStore,
    presence_store: Arc<dyn PresenceStore>,
) -> TestHarness {
    let directory = InMemoryAgentDirectory::new();
    let activity = InMemoryActivityLog::new();
    let events = BroadcastEventSink::new(4096);

    let engine = AssignmentEngine::builder()
        .with_config(config)
        .with_order_store(order_store)
        .with_agent_directory(Arc::new(directory.clone()))
        .with_activity_sink(Arc::new(activity.clone()))
        .with_presence_store(presence_store)
        .with_event_sink(Arc::new(events.clone()))
        .build()
        .expect("Engine creation failed");

    TestHarness {
        engine,
        orders,
        directory,
        activity,
        presence,
        events,
    }
}

impl TestHarness {
    pub fn add_agent(&self, id: &str, max_orders: u32) -> AgentId {
        self.directory.upsert_agent(Agent::new(id, format!("Agent {}", id), max_orders));
        AgentId::from(id)
    }

    pub async fn add_online_agent(&self, id: &str, max_orders: u32) -> AgentId {
        let agent_id = self.add_agent(id, max_orders);
        self.engine.agent_login(&agent_id).await.expect("Login failed");
        agent_id
    }

    /// `count` unassigned pending orders, `o-000` oldest
    pub fn add_unassigned_orders(&self, count: usize) -> Vec<OrderId> {
        (0..count).map(|i| self.add_order(&format!("o-{:03}", i), i, None)).collect()
    }

    /// Pending order created `index` minutes after a fixed base, optionally assigned
    pub fn add_order(&self, id: &str, index: usize, agent: Option<&AgentId>) -> OrderId {
        let at = base_time() + ChronoDuration::minutes(index as i64);
        let mut order = Order::new(id, format!("#{}", id), at);
        if let Some(agent) = agent {
            order = order.assigned_to(agent.clone(), at);
        }
        self.orders.insert_order(order);
        OrderId::from(id)
    }

    pub fn insert(&self, order: Order) -> OrderId {
        let id = order.id.clone();
        self.orders.insert_order(order);
        id
    }

    pub fn assignee(&self, order_id: &OrderId) -> Option<AgentId> {
        self.orders
            .snapshot()
            .into_iter()
            .find(|o| &o.id == order_id)
            .and_then(|o| o.assigned_agent_id)
    }

    pub fn count_assigned_to(&self, agent_id: &AgentId) -> usize {
        self.orders
            .snapshot()
            .iter()
            .filter(|o| o.assigned_agent_id.as_ref() == Some(agent_id))
            .count()
    }

    pub fn activity_count(&self, activity_type: ActivityType) -> usize {
        self.activity
            .records()
            .iter()
            .filter(|r| r.activity_type == activity_type)
            .count()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }
}

pub fn base_time() -> DateTime<Utc> {
    Utc::now() - ChronoDuration::days(1)
}

/// Drain every event currently buffered
pub fn drain_events(rx: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Order store that delays selected calls past any reasonable timeout
pub struct SlowOrderStore {
    pub inner: InMemoryOrderStore,
    pub delay: Duration,
    pub slow_writes: AtomicBool,
    pub slow_reads: AtomicBool,
}

impl SlowOrderStore {
    pub fn new(inner: InMemoryOrderStore, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            slow_writes: AtomicBool::new(false),
            slow_reads: AtomicBool::new(false),
        }
    }

    async fn maybe_sleep(&self, flag: &AtomicBool) {
        if flag.load(Ordering::SeqCst) {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl OrderStore for SlowOrderStore {
    async fn get_order(&self, order_id: &OrderId) -> Result<Option<Order>> {
        self.maybe_sleep(&self.slow_reads).await;
        self.inner.get_order(order_id).await
    }

    async fn find_unassigned_orders(&self, query: &OrderQuery) -> Result<Vec<Order>> {
        self.maybe_sleep(&self.slow_reads).await;
        self.inner.find_unassigned_orders(query).await
    }

    async fn find_assigned_orders(&self, query: &OrderQuery) -> Result<Vec<Order>> {
        self.maybe_sleep(&self.slow_reads).await;
        self.inner.find_assigned_orders(query).await
    }

    async fn conditional_assign(&self, order_id: &OrderId, agent_id: &AgentId, expected: Option<&AgentId>) -> Result<bool> {
        self.maybe_sleep(&self.slow_writes).await;
        self.inner.conditional_assign(order_id, agent_id, expected).await
    }

    async fn count_assigned_for_agent(&self, agent_id: &AgentId, excluded: &[OrderStatus]) -> Result<u64> {
        self.inner.count_assigned_for_agent(agent_id, excluded).await
    }
}

/// Activity sink that rejects every append
pub struct FailingActivitySink;

#[async_trait]
impl ActivitySink for FailingActivitySink {
    async fn append(&self, _record: ActivityRecord) -> Result<()> {
        Err(AssignmentError::database("activity log unavailable"))
    }

    async fn list(&self, _limit: Option<usize>) -> Result<Vec<ActivityRecord>> {
        Err(AssignmentError::database("activity log unavailable"))
    }

    async fn list_for_agent(&self, _agent_id: &AgentId) -> Result<Vec<ActivityRecord>> {
        Err(AssignmentError::database("activity log unavailable"))
    }
}

/// Presence store where every agent reported stale sends a heartbeat
/// right after the stale listing returns
pub struct HeartbeatAfterListing {
    pub inner: InMemoryPresenceStore,
}

#[async_trait]
impl PresenceStore for HeartbeatAfterListing {
    async fn set_state(&self, agent_id: &AgentId, state: PresenceState) -> Result<PresenceTransition> {
        self.inner.set_state(agent_id, state).await
    }

    async fn get(&self, agent_id: &AgentId) -> Result<Option<PresenceRecord>> {
        self.inner.get(agent_id).await
    }

    async fn touch_activity(&self, agent_id: &AgentId) -> Result<bool> {
        self.inner.touch_activity(agent_id).await
    }

    async fn list_in_state(&self, state: PresenceState) -> Result<Vec<AgentId>> {
        self.inner.list_in_state(state).await
    }

    async fn list_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<AgentId>> {
        let stale = self.inner.list_stale(cutoff).await?;
        for agent_id in &stale {
            self.inner.touch_activity(agent_id).await?;
        }
        Ok(stale)
    }

    async fn mark_offline_if_stale(&self, agent_id: &AgentId, cutoff: DateTime<Utc>) -> Result<Option<PresenceTransition>> {
        self.inner.mark_offline_if_stale(agent_id, cutoff).await
    }

    async fn list_all(&self) -> Result<Vec<PresenceRecord>> {
        self.inner.list_all().await
    }
}
