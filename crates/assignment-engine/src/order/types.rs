//! Order types shared by the stores and the assignment components

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::AgentId;

/// Order identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        OrderId(s)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        OrderId(s.to_string())
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for OrderId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Fulfillment status of an order
///
/// The status lifecycle is owned by the fulfillment side. The engine only
/// reads it to decide what counts as workload and what may still move
/// between agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    NoAnswer,
    Postponed,
    Shipped,
    Delivered,
    Cancelled,
    Returned,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 8] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::NoAnswer,
        OrderStatus::Postponed,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::Returned,
    ];

    /// Statuses that never count toward an agent's workload
    ///
    /// This is the only definition of the workload rule. Every store
    /// implementation and every reader derives its counting from it.
    pub const WORKLOAD_EXCLUDED: [OrderStatus; 3] = [
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::Returned,
    ];

    /// Unassigned orders in these statuses are picked up by auto-assignment,
    /// and assigned orders in these statuses may be moved by an operator
    pub fn is_reassignable(&self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::Confirmed | OrderStatus::NoAnswer | OrderStatus::Postponed
        )
    }

    /// The agent has not acted on the order yet, so it may follow the
    /// online pool when its agent disconnects
    pub fn is_redistributable(&self) -> bool {
        matches!(self, OrderStatus::Pending)
    }

    pub fn reassignable_statuses() -> Vec<OrderStatus> {
        Self::ALL.iter().copied().filter(|s| s.is_reassignable()).collect()
    }

    pub fn redistributable_statuses() -> Vec<OrderStatus> {
        Self::ALL.iter().copied().filter(|s| s.is_redistributable()).collect()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::NoAnswer => "NO_ANSWER",
            OrderStatus::Postponed => "POSTPONED",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Returned => "RETURNED",
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        OrderStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown order status: {}", s))
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One product line of an order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub title: String,
    pub sku: Option<String>,
    pub quantity: u32,
}

impl LineItem {
    pub fn new(title: impl Into<String>, sku: Option<&str>, quantity: u32) -> Self {
        Self {
            title: title.into(),
            sku: sku.map(str::to_string),
            quantity,
        }
    }
}

/// Order as seen by the assignment engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,

    /// Customer-facing order number
    pub reference: String,

    pub status: OrderStatus,

    /// Owned by the engine once set
    pub assigned_agent_id: Option<AgentId>,

    pub assigned_at: Option<DateTime<Utc>>,

    /// When the order entered the system; auto-assignment serves oldest first
    pub created_at: DateTime<Utc>,

    /// Business date of the order; bulk selection takes the most recent
    pub order_date: DateTime<Utc>,

    pub line_items: Vec<LineItem>,
}

impl Order {
    /// Build an unassigned pending order created and dated `at`
    pub fn new(id: impl Into<OrderId>, reference: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            reference: reference.into(),
            status: OrderStatus::Pending,
            assigned_agent_id: None,
            assigned_at: None,
            created_at: at,
            order_date: at,
            line_items: Vec::new(),
        }
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_line_item(mut self, item: LineItem) -> Self {
        self.line_items.push(item);
        self
    }

    pub fn assigned_to(mut self, agent_id: impl Into<AgentId>, at: DateTime<Utc>) -> Self {
        self.assigned_agent_id = Some(agent_id.into());
        self.assigned_at = Some(at);
        self
    }

    pub fn is_assigned(&self) -> bool {
        self.assigned_agent_id.is_some()
    }
}
