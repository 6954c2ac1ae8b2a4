//! Offline-triggered redistribution
//!
//! When an agent disconnects, its orders that nobody has worked on yet are
//! placed on the remaining online pool with the auto-assignment rules.
//! Orders for which no eligible agent exists stay where they are: an order
//! is moved only by a conditional write naming the offline agent as the
//! expected assignee, and is never cleared.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::activity::ActivityType;
use crate::agent::AgentId;
use crate::assignment::types::{OrderOutcome, RedistributionResult};
use crate::assignment::AssignmentContext;
use crate::error::Result;
use crate::events::EngineEvent;
use crate::order::{AssigneeFilter, OrderQuery, OrderSort, OrderStatus};
use crate::store::bounded;

pub struct OfflineRedistributor {
    ctx: Arc<AssignmentContext>,
}

impl OfflineRedistributor {
    pub fn new(ctx: Arc<AssignmentContext>) -> Self {
        Self { ctx }
    }

    pub async fn redistribute(&self, offline_agent_id: &AgentId) -> Result<RedistributionResult> {
        let ctx = &self.ctx;
        let query = OrderQuery::new(
            AssigneeFilter::Agents(vec![offline_agent_id.clone()]),
            OrderSort::CreatedAtAsc,
        )
        .with_statuses(OrderStatus::redistributable_statuses());

        let orders = bounded(
            ctx.timeout(),
            "orders.find_assigned_orders",
            ctx.orders.find_assigned_orders(&query),
        )
        .await?;

        if orders.is_empty() {
            debug!("Agent {} went offline with no orders to redistribute", offline_agent_id);
            return Ok(RedistributionResult::from_outcomes(offline_agent_id.clone(), Vec::new()));
        }

        let mut pool = ctx.load_pool(Some(offline_agent_id)).await?;
        info!(
            "🔄 Redistributing {} orders of offline agent {} across {} online agents",
            orders.len(),
            offline_agent_id,
            pool.len()
        );

        let previous = Some(offline_agent_id.clone());
        let mut outcomes = Vec::with_capacity(orders.len());
        for order in orders {
            let Some(agent_id) = pool.pick().cloned() else {
                outcomes.push(OrderOutcome::failed(
                    order.id,
                    previous.clone(),
                    "No eligible online agent; order stays with its agent",
                ));
                continue;
            };

            let write = bounded(
                ctx.timeout(),
                "orders.conditional_assign",
                ctx.orders.conditional_assign(&order.id, &agent_id, Some(offline_agent_id)),
            )
            .await;

            match write {
                Ok(true) => {
                    pool.record_assignment(&agent_id);
                    ctx.activity
                        .record(
                            &agent_id,
                            ActivityType::OrderRedistributed,
                            format!("Order {} redistributed from offline agent {}", order.reference, offline_agent_id),
                        )
                        .await;
                    let message = format!("Order {} moved to {}", order.reference, agent_id);
                    outcomes.push(OrderOutcome::assigned(order.id, agent_id, previous.clone(), message));
                }
                Ok(false) => {
                    outcomes.push(OrderOutcome::failed(
                        order.id,
                        previous.clone(),
                        "Order changed hands before it could be redistributed",
                    ));
                }
                Err(e) => {
                    warn!("⚠️ Failed to redistribute order {}: {}", order.id, e);
                    outcomes.push(OrderOutcome::failed(order.id, previous.clone(), e.to_string()));
                }
            }
        }

        let result = RedistributionResult::from_outcomes(offline_agent_id.clone(), outcomes);
        info!(
            "✅ Redistribution for {} finished: {} moved, {} retained",
            offline_agent_id, result.redistributed, result.retained
        );
        ctx.events.emit(EngineEvent::OrdersRedistributed {
            agent_id: offline_agent_id.clone(),
            redistributed: result.redistributed,
            retained: result.retained,
        });
        Ok(result)
    }
}
