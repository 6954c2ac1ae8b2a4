//! Core types for agent management

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::agent::roles::{AgentRole, Capability};

/// Agent identifier type for strongly-typed agent references
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub String);

impl From<String> for AgentId {
    fn from(s: String) -> Self {
        AgentId(s)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        AgentId(s.to_string())
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for AgentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Agent presence state as tracked by the presence store
///
/// Only `Online` agents receive automatic assignments. `Busy` and `Break`
/// agents are still connected, so moving them to `Offline` is a
/// disconnect edge just like leaving `Online`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PresenceState {
    Online,
    Busy,
    Break,
    Offline,
}

impl PresenceState {
    /// Whether the agent has a live connection
    pub fn is_connected(&self) -> bool {
        !matches!(self, PresenceState::Offline)
    }

    /// Whether the agent may receive automatic assignments
    pub fn accepts_orders(&self) -> bool {
        matches!(self, PresenceState::Online)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceState::Online => "ONLINE",
            PresenceState::Busy => "BUSY",
            PresenceState::Break => "BREAK",
            PresenceState::Offline => "OFFLINE",
        }
    }
}

impl std::str::FromStr for PresenceState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ONLINE" | "AVAILABLE" => Ok(PresenceState::Online),
            "BUSY" => Ok(PresenceState::Busy),
            "BREAK" => Ok(PresenceState::Break),
            "OFFLINE" => Ok(PresenceState::Offline),
            _ => Err(format!("Unknown presence state: {}", s)),
        }
    }
}

impl fmt::Display for PresenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Agent profile as provided by the user directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    /// Unique agent identifier
    pub id: AgentId,

    /// Human-readable agent name
    pub display_name: String,

    /// Directory role, checked through its capability table
    pub role: AgentRole,

    /// Administratively enabled
    pub is_active: bool,

    /// Capacity ceiling enforced by automatic assignment
    pub max_orders: u32,
}

impl Agent {
    pub fn new(id: impl Into<AgentId>, display_name: impl Into<String>, max_orders: u32) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            role: AgentRole::FollowUpAgent,
            is_active: true,
            max_orders,
        }
    }

    pub fn with_role(mut self, role: AgentRole) -> Self {
        self.role = role;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Active and allowed to own orders; presence and capacity are checked elsewhere
    pub fn can_receive_orders(&self) -> bool {
        self.is_active && self.role.has(Capability::ReceiveOrders)
    }
}
