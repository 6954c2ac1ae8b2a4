//! Round-robin auto-assignment
//!
//! Unassigned orders are served oldest first. Each order goes to the
//! least-loaded eligible agent of the batch pool, so consecutive orders
//! rotate over agents with equal load and fill lighter agents first.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::activity::ActivityType;
use crate::assignment::types::{AssignmentRun, OrderOutcome};
use crate::assignment::AssignmentContext;
use crate::error::Result;
use crate::events::EngineEvent;
use crate::order::{AssigneeFilter, OrderQuery, OrderSort, OrderStatus};
use crate::store::bounded;

pub struct AutoAssigner {
    ctx: Arc<AssignmentContext>,
}

impl AutoAssigner {
    pub fn new(ctx: Arc<AssignmentContext>) -> Self {
        Self { ctx }
    }

    /// Assign every currently unassigned assignable order it can
    ///
    /// Fails as a whole only when the candidate orders or the agent pool
    /// cannot be read. Per-order problems land in the run's results.
    pub async fn run(&self) -> Result<AssignmentRun> {
        let ctx = &self.ctx;
        let query = OrderQuery::new(AssigneeFilter::Unassigned, OrderSort::CreatedAtAsc)
            .with_statuses(OrderStatus::reassignable_statuses())
            .with_limit(ctx.config.assignment.max_batch_size);

        let orders = bounded(
            ctx.timeout(),
            "orders.find_unassigned_orders",
            ctx.orders.find_unassigned_orders(&query),
        )
        .await?;

        if orders.is_empty() {
            debug!("No unassigned orders to distribute");
            let run = AssignmentRun::default();
            self.emit_completed(&run);
            return Ok(run);
        }

        let mut pool = ctx.load_pool(None).await?;
        info!("🔄 Auto-assigning {} orders across {} online agents", orders.len(), pool.len());

        let mut outcomes = Vec::with_capacity(orders.len());
        for order in orders {
            let Some(agent_id) = pool.pick().cloned() else {
                outcomes.push(OrderOutcome::failed(
                    order.id,
                    None,
                    "No eligible online agent with remaining capacity",
                ));
                continue;
            };

            let write = bounded(
                ctx.timeout(),
                "orders.conditional_assign",
                ctx.orders.conditional_assign(&order.id, &agent_id, None),
            )
            .await;

            match write {
                Ok(true) => {
                    pool.record_assignment(&agent_id);
                    ctx.activity
                        .record(
                            &agent_id,
                            ActivityType::OrderAssigned,
                            format!("Order {} auto-assigned", order.reference),
                        )
                        .await;
                    ctx.events.emit(EngineEvent::OrderAssigned {
                        order_id: order.id.clone(),
                        agent_id: agent_id.clone(),
                    });
                    let message = format!("Order {} assigned to {}", order.reference, agent_id);
                    outcomes.push(OrderOutcome::assigned(order.id, agent_id, None, message));
                }
                Ok(false) => {
                    outcomes.push(OrderOutcome::failed(order.id, None, "Order was assigned concurrently"));
                }
                Err(e) => {
                    warn!("⚠️ Failed to assign order {}: {}", order.id, e);
                    outcomes.push(OrderOutcome::failed(order.id, None, e.to_string()));
                }
            }
        }

        let run = AssignmentRun::from_outcomes(outcomes);
        info!(
            "✅ Auto-assignment finished: {} assigned, {} failed",
            run.successful_assignments, run.failed_assignments
        );
        self.emit_completed(&run);
        Ok(run)
    }

    fn emit_completed(&self, run: &AssignmentRun) {
        self.ctx.events.emit(EngineEvent::AssignmentCompleted {
            total_processed: run.total_processed,
            successful: run.successful_assignments,
            failed: run.failed_assignments,
        });
    }
}
