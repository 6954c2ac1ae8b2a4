//! Directory roles and the capability table
//!
//! Roles are a closed set. Operations ask for a [`Capability`] instead of
//! comparing role names, so adding a role means adding one row to
//! [`AgentRole::capabilities`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Role of a directory user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Admin,
    Supervisor,
    FollowUpAgent,
    Viewer,
}

/// Something a role is allowed to do within the assignment engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// May own orders for follow-up
    ReceiveOrders,
    /// May move a single order between agents
    ReassignOrders,
    /// May run percentage-based bulk reassignment
    BulkReassign,
}

impl AgentRole {
    pub fn capabilities(&self) -> &'static [Capability] {
        use Capability::*;
        match self {
            AgentRole::Admin | AgentRole::Supervisor => &[ReassignOrders, BulkReassign],
            AgentRole::FollowUpAgent => &[ReceiveOrders],
            // Read-only dashboard users
            AgentRole::Viewer => &[],
        }
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Admin => "admin",
            AgentRole::Supervisor => "supervisor",
            AgentRole::FollowUpAgent => "follow_up_agent",
            AgentRole::Viewer => "viewer",
        }
    }
}

impl std::str::FromStr for AgentRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "admin" => Ok(AgentRole::Admin),
            "supervisor" => Ok(AgentRole::Supervisor),
            "follow_up_agent" | "followup" => Ok(AgentRole::FollowUpAgent),
            "viewer" => Ok(AgentRole::Viewer),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_follow_up_agents_receive_orders() {
        assert!(AgentRole::FollowUpAgent.has(Capability::ReceiveOrders));
        assert!(!AgentRole::Admin.has(Capability::ReceiveOrders));
        assert!(!AgentRole::Viewer.has(Capability::ReceiveOrders));
        assert!(!AgentRole::Viewer.has(Capability::ReassignOrders));
    }

    #[test]
    fn test_role_round_trips_through_str() {
        for role in [AgentRole::Admin, AgentRole::Supervisor, AgentRole::FollowUpAgent, AgentRole::Viewer] {
            assert_eq!(role.as_str().parse::<AgentRole>().unwrap(), role);
        }
    }
}
