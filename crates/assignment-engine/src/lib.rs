//! # Dispatch Assignment Engine
//!
//! Decides which follow-up agent owns which order, and keeps that
//! ownership balanced as agents come and go.
//!
//! This crate provides:
//! - Presence tracking with exactly-once disconnect detection
//! - Round-robin auto-assignment to the least-loaded online agent, capped by
//!   each agent's capacity
//! - Manual single-order reassignment with advisory capacity
//! - Bulk reassignment with exact percentage ratios and product filtering
//! - Offline-triggered redistribution of untouched orders
//! - Workload and activity statistics
//! - In-memory and SQLite store implementations
//!
//! ## Architecture
//!
//! The engine owns only the assignment decision. Orders, the agent directory,
//! presence and the activity log are reached through the traits in
//! [`store`] and [`presence`]; every order write is a conditional
//! compare-and-set on the current assignee, so concurrent operations can
//! never hand one order to two agents. Outbound notifications go through an
//! injected [`events::EventSink`].

pub mod activity;
pub mod agent;
pub mod assignment;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod logging;
pub mod order;
pub mod presence;
pub mod store;
pub mod workload;

use std::sync::Arc;

pub use engine::{AssignmentEngine, AssignmentEngineBuilder, PresenceChange, PresenceMonitorHandle, SweepReport};
pub use error::{AssignmentError, Result};

use crate::config::EngineConfig;
use crate::events::EventSink;
use crate::presence::SqlitePresenceStore;
use crate::store::SqliteStore;

/// Build an engine backed entirely by the SQLite database in `config`
///
/// Returns the store as well so callers can seed agents and orders.
pub async fn init(config: EngineConfig, events: Option<Arc<dyn EventSink>>) -> Result<(AssignmentEngine, SqliteStore)> {
    config.validate()?;
    let store = SqliteStore::new(&config.store.database_url).await?;
    let shared = Arc::new(store.clone());

    let mut builder = AssignmentEngine::builder()
        .with_config(config)
        .with_order_store(shared.clone())
        .with_agent_directory(shared.clone())
        .with_activity_sink(shared)
        .with_presence_store(Arc::new(SqlitePresenceStore::new(store.pool().clone())));
    if let Some(events) = events {
        builder = builder.with_event_sink(events);
    }

    Ok((builder.build()?, store))
}

/// Commonly used types
pub mod prelude {
    pub use crate::activity::{ActivityRecord, ActivityType, AgentActivityStats, GlobalActivityStats};
    pub use crate::agent::{Agent, AgentId, AgentRole, Capability, PresenceState};
    pub use crate::assignment::{
        AssignmentRun, BulkReassignRequest, BulkReassignResult, OrderOutcome, RedistributionResult, SelectionType,
        TargetAgentSpec,
    };
    pub use crate::config::{BalanceStrategy, EngineConfig};
    pub use crate::engine::{AssignmentEngine, PresenceChange, SweepReport};
    pub use crate::error::{AssignmentError, Result};
    pub use crate::events::{BroadcastEventSink, EngineEvent, EventSink, NoopEventSink};
    pub use crate::order::{FilterLogic, LineItem, Order, OrderId, OrderStatus, ProductFilter, ProductRef};
    pub use crate::presence::{InMemoryPresenceStore, PresenceStore, SqlitePresenceStore};
    pub use crate::store::{
        ActivitySink, AgentDirectory, InMemoryActivityLog, InMemoryAgentDirectory, InMemoryOrderStore, OrderStore,
        SqliteStore,
    };
    pub use crate::workload::{AgentWorkload, WorkloadSummary};
}
