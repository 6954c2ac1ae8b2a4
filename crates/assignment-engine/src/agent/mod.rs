//! # Agent Module
//!
//! Agent identity, directory roles and presence states. The engine never
//! creates or deactivates agents; it reads them from the
//! [`AgentDirectory`](crate::store::AgentDirectory) and tracks their
//! presence through the [`PresenceTracker`](crate::presence::PresenceTracker).

pub mod roles;
pub mod types;

pub use roles::{AgentRole, Capability};
pub use types::{Agent, AgentId, PresenceState};
