//! # Store Interfaces
//!
//! The assignment engine does not own the order database, the user directory
//! or the activity log. It talks to them through the traits in this module:
//!
//! - [`OrderStore`]: candidate queries, workload counts and the conditional
//!   write that makes each order assignment atomic
//! - [`AgentDirectory`]: agent profiles with role and capacity
//! - [`ActivitySink`]: append-only activity records
//!
//! Two implementations ship with the crate: [`memory`] for tests and
//! embedded use, and [`sqlite`] for a persistent single-node deployment.
//!
//! Every call the engine makes through these traits is wrapped in
//! [`bounded`], so a hung store fails the affected order or request instead
//! of blocking the caller.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::activity::ActivityRecord;
use crate::agent::{Agent, AgentId, AgentRole};
use crate::error::{AssignmentError, Result};
use crate::order::{Order, OrderId, OrderQuery, OrderStatus};

pub mod memory;
pub mod sqlite;

pub use memory::{InMemoryActivityLog, InMemoryAgentDirectory, InMemoryOrderStore};
pub use sqlite::SqliteStore;

/// Authoritative order storage
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn get_order(&self, order_id: &OrderId) -> Result<Option<Order>>;

    /// Unassigned orders in the requested statuses, sorted and limited per the query
    async fn find_unassigned_orders(&self, query: &OrderQuery) -> Result<Vec<Order>>;

    /// Assigned orders matching the query, sorted and limited per the query
    async fn find_assigned_orders(&self, query: &OrderQuery) -> Result<Vec<Order>>;

    /// Assign `order_id` to `agent_id` only if its current assignee is `expected`
    ///
    /// `expected = None` means "only if unassigned". Returns `false` when the
    /// order is missing or its assignee no longer matches; at most one of
    /// several competing writers with the same expectation observes `true`.
    async fn conditional_assign(
        &self,
        order_id: &OrderId,
        agent_id: &AgentId,
        expected: Option<&AgentId>,
    ) -> Result<bool>;

    /// Orders assigned to `agent_id` whose status is not in `excluded`
    async fn count_assigned_for_agent(&self, agent_id: &AgentId, excluded: &[OrderStatus]) -> Result<u64>;
}

/// User directory view of agents
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    /// Agents with `role`, optionally only administratively active ones, sorted by id
    async fn list_eligible_agents(&self, role: AgentRole, active_only: bool) -> Result<Vec<Agent>>;

    async fn get_agent(&self, agent_id: &AgentId) -> Result<Option<Agent>>;
}

/// Append-only activity log
#[async_trait]
pub trait ActivitySink: Send + Sync {
    async fn append(&self, record: ActivityRecord) -> Result<()>;

    /// Most recent first, optionally limited
    async fn list(&self, limit: Option<usize>) -> Result<Vec<ActivityRecord>>;

    /// Most recent first
    async fn list_for_agent(&self, agent_id: &AgentId) -> Result<Vec<ActivityRecord>>;
}

/// Run a store call with an upper time bound
///
/// On expiry the future is dropped and a [`AssignmentError::Timeout`] naming
/// `operation` is returned.
pub async fn bounded<T, F>(timeout: Duration, operation: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(AssignmentError::timeout(operation, timeout.as_millis() as u64)),
    }
}
