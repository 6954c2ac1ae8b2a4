//! Request and result types of the assignment operations

use serde::{Deserialize, Serialize};

use crate::agent::AgentId;
use crate::config::BulkConfig;
use crate::error::{AssignmentError, Result};
use crate::order::{OrderId, ProductFilter};

/// Added to the percentage tolerance when checking a target sum
const PERCENTAGE_SUM_SLACK: f64 = 1e-9;

/// Outcome of one order inside an operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderOutcome {
    pub order_id: OrderId,
    pub success: bool,
    /// Agent holding the order after the operation, when it moved
    pub agent_id: Option<AgentId>,
    /// Assignee before the operation
    pub previous_agent_id: Option<AgentId>,
    pub message: String,
}

impl OrderOutcome {
    pub fn assigned(
        order_id: OrderId,
        agent_id: AgentId,
        previous_agent_id: Option<AgentId>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            order_id,
            success: true,
            agent_id: Some(agent_id),
            previous_agent_id,
            message: message.into(),
        }
    }

    pub fn failed(order_id: OrderId, previous_agent_id: Option<AgentId>, reason: impl Into<String>) -> Self {
        Self {
            order_id,
            success: false,
            agent_id: None,
            previous_agent_id,
            message: reason.into(),
        }
    }
}

/// Result of an auto-assignment run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssignmentRun {
    pub total_processed: usize,
    pub successful_assignments: usize,
    pub failed_assignments: usize,
    pub results: Vec<OrderOutcome>,
}

impl AssignmentRun {
    pub fn from_outcomes(results: Vec<OrderOutcome>) -> Self {
        let successful_assignments = results.iter().filter(|r| r.success).count();
        Self {
            total_processed: results.len(),
            successful_assignments,
            failed_assignments: results.len() - successful_assignments,
            results,
        }
    }
}

/// Where bulk candidates come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionType {
    /// Most recent assigned orders system-wide
    Global,
    /// Most recent assigned orders of the listed source agents
    Agents,
}

impl std::str::FromStr for SelectionType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "global" => Ok(SelectionType::Global),
            "agents" => Ok(SelectionType::Agents),
            _ => Err(format!("Unknown selection type: {}", s)),
        }
    }
}

/// One target of a bulk reassignment and its share
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetAgentSpec {
    pub agent_id: AgentId,
    pub percentage: f64,
}

impl TargetAgentSpec {
    pub fn new(agent_id: impl Into<AgentId>, percentage: f64) -> Self {
        Self {
            agent_id: agent_id.into(),
            percentage,
        }
    }
}

/// Bulk percentage reassignment request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkReassignRequest {
    pub selection: SelectionType,
    pub order_count: usize,
    #[serde(default)]
    pub source_agent_ids: Vec<AgentId>,
    pub target_agents: Vec<TargetAgentSpec>,
    #[serde(default)]
    pub product_filter: Option<ProductFilter>,
    pub acting_user_id: AgentId,
}

impl BulkReassignRequest {
    pub fn global(order_count: usize, target_agents: Vec<TargetAgentSpec>, acting_user_id: impl Into<AgentId>) -> Self {
        Self {
            selection: SelectionType::Global,
            order_count,
            source_agent_ids: Vec::new(),
            target_agents,
            product_filter: None,
            acting_user_id: acting_user_id.into(),
        }
    }

    pub fn from_agents(
        source_agent_ids: Vec<AgentId>,
        order_count: usize,
        target_agents: Vec<TargetAgentSpec>,
        acting_user_id: impl Into<AgentId>,
    ) -> Self {
        Self {
            selection: SelectionType::Agents,
            order_count,
            source_agent_ids,
            target_agents,
            product_filter: None,
            acting_user_id: acting_user_id.into(),
        }
    }

    pub fn with_product_filter(mut self, filter: ProductFilter) -> Self {
        self.product_filter = Some(filter);
        self
    }

    /// Reject malformed requests before anything is read or written
    pub fn validate(&self, limits: &BulkConfig) -> Result<()> {
        if self.order_count == 0 {
            return Err(AssignmentError::validation("order_count must be greater than zero"));
        }
        if self.order_count > limits.max_order_count {
            return Err(AssignmentError::validation(format!(
                "order_count {} exceeds the maximum of {}",
                self.order_count, limits.max_order_count
            )));
        }
        if self.selection == SelectionType::Agents && self.source_agent_ids.is_empty() {
            return Err(AssignmentError::validation(
                "agents selection requires at least one source agent",
            ));
        }
        if self.target_agents.is_empty() {
            return Err(AssignmentError::validation("at least one target agent is required"));
        }

        let mut seen: Vec<&AgentId> = Vec::with_capacity(self.target_agents.len());
        for target in &self.target_agents {
            if !target.percentage.is_finite() || target.percentage < 0.0 {
                return Err(AssignmentError::validation(format!(
                    "percentage for agent {} must be a finite non-negative number",
                    target.agent_id
                )));
            }
            if seen.contains(&&target.agent_id) {
                return Err(AssignmentError::validation(format!(
                    "agent {} is listed more than once as a target",
                    target.agent_id
                )));
            }
            seen.push(&target.agent_id);
        }

        let total: f64 = self.target_agents.iter().map(|t| t.percentage).sum();
        // The tolerance is inclusive; the slack absorbs float summation error
        if (total - 100.0).abs() > limits.percentage_tolerance + PERCENTAGE_SUM_SLACK {
            return Err(AssignmentError::validation(format!(
                "target percentages must sum to 100, got {:.2}",
                total
            )));
        }

        if let Some(filter) = &self.product_filter {
            filter.validate()?;
        }
        Ok(())
    }
}

/// Result of a bulk reassignment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkReassignResult {
    pub total_orders: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<OrderOutcome>,
    pub message: String,
}

impl BulkReassignResult {
    pub fn from_outcomes(results: Vec<OrderOutcome>) -> Self {
        let successful = results.iter().filter(|r| r.success).count();
        let failed = results.len() - successful;
        Self {
            total_orders: results.len(),
            successful,
            failed,
            message: format!("{} of {} orders reassigned", successful, results.len()),
            results,
        }
    }

    pub fn no_candidates() -> Self {
        Self {
            message: "No orders found matching the selection".to_string(),
            ..Default::default()
        }
    }
}

/// Result of redistributing an offline agent's orders
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RedistributionResult {
    pub agent_id: AgentId,
    /// Orders moved to an online agent
    pub redistributed: usize,
    /// Orders left with the offline agent
    pub retained: usize,
    pub results: Vec<OrderOutcome>,
}

impl RedistributionResult {
    pub fn from_outcomes(agent_id: AgentId, results: Vec<OrderOutcome>) -> Self {
        let redistributed = results.iter().filter(|r| r.success).count();
        Self {
            agent_id,
            redistributed,
            retained: results.len() - redistributed,
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(targets: Vec<TargetAgentSpec>) -> BulkReassignRequest {
        BulkReassignRequest::global(10, targets, "admin")
    }

    #[test]
    fn test_percentages_must_sum_to_hundred() {
        let limits = BulkConfig::default();
        let ok = request(vec![TargetAgentSpec::new("a", 70.0), TargetAgentSpec::new("b", 30.0)]);
        assert!(ok.validate(&limits).is_ok());

        let within_tolerance = request(vec![TargetAgentSpec::new("a", 66.67), TargetAgentSpec::new("b", 33.33)]);
        assert!(within_tolerance.validate(&limits).is_ok());

        let short = request(vec![TargetAgentSpec::new("a", 70.0), TargetAgentSpec::new("b", 29.0)]);
        assert!(matches!(short.validate(&limits), Err(AssignmentError::Validation(_))));
    }

    #[test]
    fn test_tolerance_boundary_is_inclusive() {
        let limits = BulkConfig::default();
        let thirds = |last: f64| {
            request(vec![
                TargetAgentSpec::new("a", 33.33),
                TargetAgentSpec::new("b", 33.33),
                TargetAgentSpec::new("c", last),
            ])
        };

        // 99.99 and 100.01 sit exactly on the boundary
        assert!(thirds(33.33).validate(&limits).is_ok());
        assert!(thirds(33.35).validate(&limits).is_ok());

        assert!(matches!(thirds(33.32).validate(&limits), Err(AssignmentError::Validation(_))));
        assert!(matches!(thirds(33.36).validate(&limits), Err(AssignmentError::Validation(_))));
    }

    #[test]
    fn test_rejects_malformed_targets() {
        let limits = BulkConfig::default();
        assert!(request(vec![]).validate(&limits).is_err());
        assert!(request(vec![TargetAgentSpec::new("a", 50.0), TargetAgentSpec::new("a", 50.0)])
            .validate(&limits)
            .is_err());
        assert!(request(vec![TargetAgentSpec::new("a", 110.0), TargetAgentSpec::new("b", -10.0)])
            .validate(&limits)
            .is_err());
        assert!(request(vec![TargetAgentSpec::new("a", f64::NAN)]).validate(&limits).is_err());
    }

    #[test]
    fn test_rejects_bad_selection() {
        let limits = BulkConfig::default();
        let targets = vec![TargetAgentSpec::new("a", 100.0)];

        assert!(BulkReassignRequest::from_agents(vec![], 5, targets.clone(), "admin")
            .validate(&limits)
            .is_err());
        assert!(BulkReassignRequest::global(0, targets.clone(), "admin").validate(&limits).is_err());
        assert!(BulkReassignRequest::global(limits.max_order_count + 1, targets, "admin")
            .validate(&limits)
            .is_err());
    }

    #[test]
    fn test_run_counts() {
        let run = AssignmentRun::from_outcomes(vec![
            OrderOutcome::assigned(OrderId::from("o-1"), AgentId::from("a"), None, "ok"),
            OrderOutcome::failed(OrderId::from("o-2"), None, "no agent"),
        ]);
        assert_eq!(run.total_processed, 2);
        assert_eq!(run.successful_assignments, 1);
        assert_eq!(run.failed_assignments, 1);
    }
}
