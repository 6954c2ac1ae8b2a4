//! Bulk percentage reassignment
//!
//! Percentages are rounded to integers and reduced by their greatest common
//! divisor. The reduced ratios expand into a fixed sequence of target
//! indexes in declaration order, and the j-th selected order goes to
//! `sequence[j % sequence.len()]`. For 70/30 the sequence is
//! `[0, 0, 0, 0, 0, 0, 0, 1, 1, 1]`, so any multiple of ten orders splits
//! exactly 70/30 and the same input always yields the same placement.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::agent::{Agent, AgentId, Capability};
use crate::assignment::manual::{apply_reassignment, ManualReassigner};
use crate::assignment::types::{BulkReassignRequest, BulkReassignResult, OrderOutcome, SelectionType};
use crate::assignment::AssignmentContext;
use crate::error::{AssignmentError, Result};
use crate::events::EngineEvent;
use crate::order::{AssigneeFilter, OrderQuery, OrderSort, OrderStatus};
use crate::store::bounded;

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Expand percentages into the reduced target index sequence
///
/// Targets whose percentage rounds to zero get no slot.
pub fn ratio_sequence(percentages: &[f64]) -> Result<Vec<usize>> {
    let mut rounded = Vec::with_capacity(percentages.len());
    for &p in percentages {
        if !p.is_finite() || p < 0.0 {
            return Err(AssignmentError::validation(format!("invalid percentage {}", p)));
        }
        rounded.push(p.round() as u64);
    }

    let divisor = rounded.iter().copied().filter(|&r| r > 0).fold(0, gcd);
    if divisor == 0 {
        return Err(AssignmentError::validation("all target percentages round to zero"));
    }

    let mut sequence = Vec::new();
    for (index, r) in rounded.iter().enumerate() {
        sequence.extend(std::iter::repeat(index).take((r / divisor) as usize));
    }
    Ok(sequence)
}

pub struct BulkReassigner {
    ctx: Arc<AssignmentContext>,
    manual: ManualReassigner,
}

impl BulkReassigner {
    pub fn new(ctx: Arc<AssignmentContext>) -> Self {
        let manual = ManualReassigner::new(ctx.clone());
        Self { ctx, manual }
    }

    /// Validate, select and distribute
    ///
    /// Request validation and candidate selection are all-or-nothing and
    /// happen before any write. After that every order is attempted and
    /// fails on its own; store faults on one order do not stop the batch.
    pub async fn reassign(&self, request: &BulkReassignRequest) -> Result<BulkReassignResult> {
        let ctx = &self.ctx;
        request.validate(&ctx.config.bulk)?;

        if let Some(reason) = self
            .manual
            .actor_rejection(&request.acting_user_id, Capability::BulkReassign)
            .await?
        {
            return Err(AssignmentError::validation(reason));
        }

        let percentages: Vec<f64> = request.target_agents.iter().map(|t| t.percentage).collect();
        let sequence = ratio_sequence(&percentages)?;

        let assignee = match request.selection {
            SelectionType::Global => AssigneeFilter::AnyAgent,
            SelectionType::Agents => AssigneeFilter::Agents(request.source_agent_ids.clone()),
        };
        let query = OrderQuery::new(assignee, OrderSort::OrderDateDesc)
            .with_statuses(OrderStatus::reassignable_statuses())
            .with_products(request.product_filter.clone())
            .with_limit(Some(request.order_count));

        let candidates = bounded(
            ctx.timeout(),
            "orders.find_assigned_orders",
            ctx.orders.find_assigned_orders(&query),
        )
        .await?;

        if candidates.is_empty() {
            info!("📦 Bulk reassignment found no matching orders");
            let result = BulkReassignResult::no_candidates();
            self.emit_completed(&result);
            return Ok(result);
        }

        let targets = self.load_targets(request).await?;
        info!(
            "📦 Bulk reassigning {} orders over {} targets (sequence length {})",
            candidates.len(),
            request.target_agents.len(),
            sequence.len()
        );

        let mut outcomes = Vec::with_capacity(candidates.len());
        for (j, order) in candidates.iter().enumerate() {
            let target_id = &request.target_agents[sequence[j % sequence.len()]].agent_id;
            let target = targets.get(target_id).and_then(Option::as_ref);

            let outcome = match apply_reassignment(ctx, order, target_id, target, &request.acting_user_id).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("⚠️ Bulk reassignment of order {} failed: {}", order.id, e);
                    OrderOutcome::failed(order.id.clone(), order.assigned_agent_id.clone(), e.to_string())
                }
            };
            outcomes.push(outcome);
        }

        let result = BulkReassignResult::from_outcomes(outcomes);
        info!("✅ Bulk reassignment finished: {} succeeded, {} failed", result.successful, result.failed);
        self.emit_completed(&result);
        Ok(result)
    }

    async fn load_targets(&self, request: &BulkReassignRequest) -> Result<HashMap<AgentId, Option<Agent>>> {
        let mut targets = HashMap::with_capacity(request.target_agents.len());
        for spec in &request.target_agents {
            let agent = bounded(
                self.ctx.timeout(),
                "directory.get_agent",
                self.ctx.directory.get_agent(&spec.agent_id),
            )
            .await?;
            targets.insert(spec.agent_id.clone(), agent);
        }
        Ok(targets)
    }

    fn emit_completed(&self, result: &BulkReassignResult) {
        self.ctx.events.emit(EngineEvent::BulkReassignmentCompleted {
            total_orders: result.total_orders,
            successful: result.successful,
            failed: result.failed,
        });
    }
}
