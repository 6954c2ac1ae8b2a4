//! Manual single-order reassignment
//!
//! Capacity is advisory here: an operator may push an agent past
//! `max_orders`, which is logged but allowed. Every business rejection is
//! an unsuccessful [`OrderOutcome`], never an `Err`.

use std::sync::Arc;

use tracing::{info, warn};

use crate::activity::ActivityType;
use crate::agent::{Agent, AgentId, Capability};
use crate::assignment::types::OrderOutcome;
use crate::assignment::AssignmentContext;
use crate::error::Result;
use crate::events::EngineEvent;
use crate::order::{Order, OrderId};
use crate::store::bounded;

pub struct ManualReassigner {
    ctx: Arc<AssignmentContext>,
}

impl ManualReassigner {
    pub fn new(ctx: Arc<AssignmentContext>) -> Self {
        Self { ctx }
    }

    /// Move `order_id` to `target_agent_id` on behalf of `acting_user_id`
    ///
    /// `Err` only for store faults and timeouts.
    pub async fn reassign(
        &self,
        order_id: &OrderId,
        target_agent_id: &AgentId,
        acting_user_id: &AgentId,
    ) -> Result<OrderOutcome> {
        let ctx = &self.ctx;

        if let Some(reason) = self.actor_rejection(acting_user_id, Capability::ReassignOrders).await? {
            return Ok(OrderOutcome::failed(order_id.clone(), None, reason));
        }

        let order = bounded(ctx.timeout(), "orders.get_order", ctx.orders.get_order(order_id)).await?;
        let Some(order) = order else {
            return Ok(OrderOutcome::failed(
                order_id.clone(),
                None,
                format!("Order {} not found", order_id),
            ));
        };

        let target = bounded(
            ctx.timeout(),
            "directory.get_agent",
            ctx.directory.get_agent(target_agent_id),
        )
        .await?;

        apply_reassignment(ctx, &order, target_agent_id, target.as_ref(), acting_user_id).await
    }

    /// Reason the acting user may not perform `capability`, if any
    ///
    /// Callers unknown to the directory are integrations and are allowed.
    pub(crate) async fn actor_rejection(&self, acting_user_id: &AgentId, capability: Capability) -> Result<Option<String>> {
        let actor = bounded(
            self.ctx.timeout(),
            "directory.get_agent",
            self.ctx.directory.get_agent(acting_user_id),
        )
        .await?;
        Ok(actor
            .filter(|actor| !actor.role.has(capability))
            .map(|actor| format!("User {} with role {} lacks the {:?} capability", actor.id, actor.role, capability)))
    }
}

/// Validate and commit one reassignment of an already loaded order
///
/// Shared by manual and bulk reassignment. The write is conditional on the
/// assignee recorded in `order`, so a concurrent change fails this order
/// instead of being overwritten.
pub(crate) async fn apply_reassignment(
    ctx: &AssignmentContext,
    order: &Order,
    target_agent_id: &AgentId,
    target: Option<&Agent>,
    acting_user_id: &AgentId,
) -> Result<OrderOutcome> {
    let previous = order.assigned_agent_id.clone();
    let fail = |reason: String| -> Result<OrderOutcome> {
        Ok(OrderOutcome::failed(order.id.clone(), previous.clone(), reason))
    };

    if !order.status.is_reassignable() {
        return fail(format!(
            "Order {} is {} and can no longer be reassigned",
            order.reference, order.status
        ));
    }

    let Some(target) = target else {
        return fail(format!("Agent {} not found", target_agent_id));
    };
    if !target.is_active {
        return fail(format!("Agent {} is inactive", target.id));
    }
    if !target.role.has(Capability::ReceiveOrders) {
        return fail(format!("Agent {} with role {} cannot receive orders", target.id, target.role));
    }

    if previous.as_ref() == Some(&target.id) {
        return Ok(OrderOutcome::assigned(
            order.id.clone(),
            target.id.clone(),
            previous.clone(),
            format!("Order {} is already assigned to {}", order.reference, target.display_name),
        ));
    }

    let assigned = ctx.workload.count_for(&target.id).await?;
    if assigned >= u64::from(target.max_orders) {
        warn!(
            "⚠️ Agent {} is at {}/{} orders; manual assignment of {} exceeds capacity",
            target.id, assigned, target.max_orders, order.reference
        );
    }

    let committed = bounded(
        ctx.timeout(),
        "orders.conditional_assign",
        ctx.orders.conditional_assign(&order.id, &target.id, previous.as_ref()),
    )
    .await?;
    if !committed {
        return fail(format!("Order {} was modified concurrently", order.reference));
    }

    let from = previous
        .as_ref()
        .map_or_else(|| "unassigned".to_string(), |id| id.to_string());
    ctx.activity
        .record(
            &target.id,
            ActivityType::OrderAssigned,
            format!("Order {} reassigned from {} by {}", order.reference, from, acting_user_id),
        )
        .await;
    ctx.events.emit(EngineEvent::OrderReassigned {
        order_id: order.id.clone(),
        from_agent_id: previous.clone(),
        to_agent_id: target.id.clone(),
        acting_user_id: acting_user_id.clone(),
    });
    info!("🔀 Order {} reassigned {} -> {}", order.reference, from, target.id);

    Ok(OrderOutcome::assigned(
        order.id.clone(),
        target.id.clone(),
        previous,
        format!("Order {} reassigned to {}", order.reference, target.display_name),
    ))
}
