//! # Engine Events
//!
//! Outbound notifications for dashboards and socket fan-out. Events are
//! emitted after the state they describe has been committed, through an
//! [`EventSink`] injected into the engine. Delivery is fire-and-forget: a
//! sink that drops or fails to deliver an event has no effect on any
//! assignment.
//!
//! ## Subscribing
//!
//! ```
//! use dispatch_assignment_engine::events::{BroadcastEventSink, EngineEvent, EventSink};
//!
//! # async fn example() {
//! let sink = BroadcastEventSink::new(64);
//! let mut rx = sink.subscribe();
//!
//! sink.emit(EngineEvent::AssignmentCompleted { total_processed: 3, successful: 3, failed: 0 });
//!
//! let event = rx.recv().await.unwrap();
//! assert_eq!(event.name(), "assignment_completed");
//! # }
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use crate::agent::{AgentId, PresenceState};
use crate::order::OrderId;

/// Notification emitted by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// An auto-assignment run finished
    AssignmentCompleted {
        total_processed: usize,
        successful: usize,
        failed: usize,
    },

    /// An unassigned order received its first agent
    OrderAssigned { order_id: OrderId, agent_id: AgentId },

    /// An assigned order moved to another agent
    OrderReassigned {
        order_id: OrderId,
        from_agent_id: Option<AgentId>,
        to_agent_id: AgentId,
        acting_user_id: AgentId,
    },

    /// A bulk percentage reassignment finished
    BulkReassignmentCompleted {
        total_orders: usize,
        successful: usize,
        failed: usize,
    },

    /// An agent's presence state changed
    AgentAvailabilityChanged {
        agent_id: AgentId,
        previous: Option<PresenceState>,
        current: PresenceState,
    },

    /// Orders of an agent that went offline were moved to the online pool
    OrdersRedistributed {
        agent_id: AgentId,
        redistributed: usize,
        retained: usize,
    },
}

impl EngineEvent {
    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::AssignmentCompleted { .. } => "assignment_completed",
            EngineEvent::OrderAssigned { .. } => "order_assigned",
            EngineEvent::OrderReassigned { .. } => "order_reassigned",
            EngineEvent::BulkReassignmentCompleted { .. } => "bulk_reassignment_completed",
            EngineEvent::AgentAvailabilityChanged { .. } => "agent_availability_changed",
            EngineEvent::OrdersRedistributed { .. } => "orders_redistributed",
        }
    }
}

/// Destination for engine events
pub trait EventSink: Send + Sync {
    /// Must not block and must not fail the caller
    fn emit(&self, event: EngineEvent);
}

/// Fans events out to any number of tokio broadcast subscribers
///
/// Slow subscribers lag and lose the oldest events; emitting with no
/// subscribers is not an error.
#[derive(Clone)]
pub struct BroadcastEventSink {
    sender: broadcast::Sender<EngineEvent>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastEventSink {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventSink for BroadcastEventSink {
    fn emit(&self, event: EngineEvent) {
        let name = event.name();
        if self.sender.send(event).is_err() {
            trace!("No subscribers for {} event", name);
        }
    }
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: EngineEvent) {}
}
