//! # Assignment Engine
//!
//! [`AssignmentEngine`] is the single entry point embedding applications
//! use. It wires the stores, the presence tracker, the activity logger and
//! the event sink into the assignment components and adds the presence
//! lifecycle on top: every presence write that takes a connected agent
//! offline triggers exactly one redistribution of that agent's orders.
//!
//! ## Building an engine
//!
//! ```
//! use std::sync::Arc;
//! use dispatch_assignment_engine::prelude::*;
//!
//! # tokio_test::block_on(async {
//! let orders = Arc::new(InMemoryOrderStore::new());
//! let directory = Arc::new(InMemoryAgentDirectory::new());
//! directory.upsert_agent(Agent::new("alice", "Alice", 5));
//!
//! let engine = AssignmentEngine::builder()
//!     .with_config(EngineConfig::default())
//!     .with_order_store(orders.clone())
//!     .with_agent_directory(directory)
//!     .with_activity_sink(Arc::new(InMemoryActivityLog::new()))
//!     .with_presence_store(Arc::new(InMemoryPresenceStore::new()))
//!     .build()?;
//!
//! engine.agent_login(&AgentId::from("alice")).await?;
//! let run = engine.auto_assign().await?;
//! assert_eq!(run.total_processed, 0);
//! # Ok::<(), dispatch_assignment_engine::AssignmentError>(())
//! # }).unwrap();
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::activity::{ActivityLogger, ActivityRecord, ActivityType, AgentActivityStats, GlobalActivityStats};
use crate::agent::{AgentId, PresenceState};
use crate::assignment::{
    AssignmentContext, AssignmentRun, AutoAssigner, BulkReassignRequest, BulkReassignResult, BulkReassigner,
    ManualReassigner, OfflineRedistributor, OrderOutcome, RedistributionResult,
};
use crate::config::EngineConfig;
use crate::error::{AssignmentError, Result};
use crate::events::{EngineEvent, EventSink, NoopEventSink};
use crate::order::OrderId;
use crate::presence::{PresenceStore, PresenceTracker, PresenceTransition};
use crate::store::{bounded, ActivitySink, AgentDirectory, OrderStore};
use crate::workload::{AgentWorkload, WorkloadReader, WorkloadSummary};

/// Outcome of a presence operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceChange {
    pub agent_id: AgentId,
    pub previous: Option<PresenceState>,
    pub current: PresenceState,
    /// Set when this change was the agent's disconnect edge
    pub redistribution: Option<RedistributionResult>,
    /// Set when the redistribution triggered by this change could not run
    pub redistribution_error: Option<String>,
    /// Set when the login triggered an auto-assignment run
    pub auto_assignment: Option<AssignmentRun>,
}

impl PresenceChange {
    fn new(agent_id: &AgentId, transition: PresenceTransition) -> Self {
        Self {
            agent_id: agent_id.clone(),
            previous: transition.previous,
            current: transition.current,
            redistribution: None,
            redistribution_error: None,
            auto_assignment: None,
        }
    }
}

/// Agents swept offline by one stale-presence pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub swept: Vec<PresenceChange>,
}

/// Handle to the background presence monitor
///
/// Dropping the handle also stops the monitor.
pub struct PresenceMonitorHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl PresenceMonitorHandle {
    /// Stop the monitor and wait for its current pass to finish
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = self.task.await {
            warn!("Presence monitor ended abnormally: {}", e);
        }
    }
}

/// Agent assignment and workload distribution engine
#[derive(Clone)]
pub struct AssignmentEngine {
    ctx: Arc<AssignmentContext>,
    auto: Arc<AutoAssigner>,
    manual: Arc<ManualReassigner>,
    bulk: Arc<BulkReassigner>,
    redistributor: Arc<OfflineRedistributor>,
}

impl AssignmentEngine {
    pub fn builder() -> AssignmentEngineBuilder {
        AssignmentEngineBuilder::new()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.ctx.config
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.ctx.presence
    }

    // Assignment operations

    /// Round-robin assignment of all unassigned assignable orders
    pub async fn auto_assign(&self) -> Result<AssignmentRun> {
        self.auto.run().await
    }

    /// Move one order to a named agent
    pub async fn reassign(
        &self,
        order_id: &OrderId,
        target_agent_id: &AgentId,
        acting_user_id: &AgentId,
    ) -> Result<OrderOutcome> {
        self.manual.reassign(order_id, target_agent_id, acting_user_id).await
    }

    /// Percentage-based reassignment of a batch of orders
    pub async fn bulk_reassign(&self, request: &BulkReassignRequest) -> Result<BulkReassignResult> {
        self.bulk.reassign(request).await
    }

    /// Hand an agent's untouched orders to the online pool
    ///
    /// Normally driven by presence edges; exposed for operators who need to
    /// re-run it after a failed trigger.
    pub async fn redistribute_from(&self, agent_id: &AgentId) -> Result<RedistributionResult> {
        self.redistributor.redistribute(agent_id).await
    }

    // Presence lifecycle

    /// Mark an agent online and log the login
    pub async fn agent_login(&self, agent_id: &AgentId) -> Result<PresenceChange> {
        self.require_agent(agent_id).await?;
        let transition = self.ctx.presence.set_online(agent_id).await?;
        let mut change = self
            .apply_transition(agent_id, transition, Some((ActivityType::Login, "Agent logged in".to_string())))
            .await;

        if self.ctx.config.assignment.auto_assign_on_login && transition.came_online() {
            match self.auto_assign().await {
                Ok(run) => change.auto_assignment = Some(run),
                Err(e) => warn!("⚠️ Auto-assignment after login of {} failed: {}", agent_id, e),
            }
        }
        Ok(change)
    }

    /// Mark an agent offline and log the logout
    pub async fn agent_logout(&self, agent_id: &AgentId) -> Result<PresenceChange> {
        let transition = self.ctx.presence.set_offline(agent_id).await?;
        Ok(self
            .apply_transition(agent_id, transition, Some((ActivityType::Logout, "Agent logged out".to_string())))
            .await)
    }

    pub async fn set_online(&self, agent_id: &AgentId) -> Result<PresenceChange> {
        self.set_availability(agent_id, PresenceState::Online).await
    }

    pub async fn set_offline(&self, agent_id: &AgentId) -> Result<PresenceChange> {
        self.set_availability(agent_id, PresenceState::Offline).await
    }

    /// Explicit availability update
    pub async fn set_availability(&self, agent_id: &AgentId, state: PresenceState) -> Result<PresenceChange> {
        let transition = self.ctx.presence.set_state(agent_id, state).await?;
        let activity = transition.changed().then(|| {
            let kind = if state == PresenceState::Break {
                ActivityType::BreakStarted
            } else {
                ActivityType::StatusChanged
            };
            (kind, format!("Availability changed to {}", state))
        });
        Ok(self.apply_transition(agent_id, transition, activity).await)
    }

    /// Refresh an agent's last activity; `false` if it has no presence entry
    pub async fn record_heartbeat(&self, agent_id: &AgentId) -> Result<bool> {
        self.ctx.presence.touch_activity(agent_id).await
    }

    pub async fn is_online(&self, agent_id: &AgentId) -> Result<bool> {
        self.ctx.presence.is_online(agent_id).await
    }

    pub async fn list_online_agent_ids(&self) -> Result<BTreeSet<AgentId>> {
        self.ctx.presence.list_online_agent_ids().await
    }

    /// Take agents silent for longer than `presence.stale_after_secs` offline
    pub async fn sweep_stale_presence(&self) -> Result<SweepReport> {
        let stale_after = chrono::Duration::from_std(self.ctx.config.presence.stale_after())
            .map_err(|e| AssignmentError::configuration(format!("stale_after out of range: {}", e)))?;
        let cutoff = Utc::now() - stale_after;
        let stale = self.ctx.presence.list_stale(cutoff).await?;

        let mut report = SweepReport::default();
        for agent_id in stale {
            let transition = match self.ctx.presence.mark_offline_if_stale(&agent_id, cutoff).await {
                Ok(Some(transition)) => transition,
                Ok(None) => {
                    debug!("Agent {} was active again before the sweep reached it", agent_id);
                    continue;
                }
                Err(e) => {
                    warn!("⚠️ Could not mark stale agent {} offline: {}", agent_id, e);
                    continue;
                }
            };
            let activity = Some((ActivityType::StatusChanged, "Marked offline after inactivity".to_string()));
            report.swept.push(self.apply_transition(&agent_id, transition, activity).await);
        }

        if !report.swept.is_empty() {
            info!("🧹 Swept {} stale agents offline", report.swept.len());
        }
        Ok(report)
    }

    /// Run [`sweep_stale_presence`](Self::sweep_stale_presence) every heartbeat interval
    ///
    /// Fails with a configuration error when `presence.monitor_enabled` is
    /// off; deployments that sweep from elsewhere turn it off so two
    /// monitors never race.
    pub fn spawn_presence_monitor(&self) -> Result<PresenceMonitorHandle> {
        if !self.ctx.config.presence.monitor_enabled {
            return Err(AssignmentError::configuration(
                "presence monitor is disabled (presence.monitor_enabled = false)",
            ));
        }

        let engine = self.clone();
        let (tx, mut rx) = oneshot::channel();
        let period = self.ctx.config.presence.heartbeat_interval();

        let task = tokio::spawn(async move {
            info!("👀 Presence monitor started (every {:?})", period);
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut rx => break,
                    _ = ticker.tick() => {
                        if let Err(e) = engine.sweep_stale_presence().await {
                            error!("Presence sweep failed: {}", e);
                        }
                    }
                }
            }
            info!("🛑 Presence monitor stopped");
        });

        Ok(PresenceMonitorHandle {
            shutdown: Some(tx),
            task,
        })
    }

    // Stats

    pub async fn workload_summary(&self) -> Result<WorkloadSummary> {
        self.ctx.workload.summary().await
    }

    pub async fn agent_workload(&self, agent_id: &AgentId) -> Result<Option<AgentWorkload>> {
        self.ctx.workload.agent_workload(agent_id).await
    }

    pub async fn agent_activity_stats(&self, agent_id: &AgentId) -> Result<AgentActivityStats> {
        self.ctx.activity.agent_stats(agent_id).await
    }

    pub async fn global_activity_stats(&self) -> Result<GlobalActivityStats> {
        self.ctx.activity.global_stats().await
    }

    pub async fn recent_activity(&self, limit: usize) -> Result<Vec<ActivityRecord>> {
        self.ctx.activity.recent(limit).await
    }

    async fn require_agent(&self, agent_id: &AgentId) -> Result<()> {
        let agent = bounded(
            self.ctx.timeout(),
            "directory.get_agent",
            self.ctx.directory.get_agent(agent_id),
        )
        .await?;
        match agent {
            Some(_) => Ok(()),
            None => Err(AssignmentError::not_found(format!("Agent {} not found", agent_id))),
        }
    }

    /// Log, notify and redistribute after a committed presence write
    async fn apply_transition(
        &self,
        agent_id: &AgentId,
        transition: PresenceTransition,
        activity: Option<(ActivityType, String)>,
    ) -> PresenceChange {
        let mut change = PresenceChange::new(agent_id, transition);

        if let Some((kind, description)) = activity {
            self.ctx.activity.record(agent_id, kind, description).await;
        }

        if transition.changed() {
            debug!("Agent {} presence {:?} -> {}", agent_id, transition.previous, transition.current);
            self.ctx.events.emit(EngineEvent::AgentAvailabilityChanged {
                agent_id: agent_id.clone(),
                previous: transition.previous,
                current: transition.current,
            });
        }

        if transition.went_offline() {
            match self.redistributor.redistribute(agent_id).await {
                Ok(result) => change.redistribution = Some(result),
                Err(e) => {
                    error!("❌ Redistribution for offline agent {} failed: {}", agent_id, e);
                    change.redistribution_error = Some(e.to_string());
                }
            }
        }
        change
    }
}

/// Builder for [`AssignmentEngine`]
pub struct AssignmentEngineBuilder {
    config: Option<EngineConfig>,
    orders: Option<Arc<dyn OrderStore>>,
    directory: Option<Arc<dyn AgentDirectory>>,
    activity: Option<Arc<dyn ActivitySink>>,
    presence: Option<Arc<dyn PresenceStore>>,
    events: Option<Arc<dyn EventSink>>,
}

impl AssignmentEngineBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            orders: None,
            directory: None,
            activity: None,
            presence: None,
            events: None,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_order_store(mut self, orders: Arc<dyn OrderStore>) -> Self {
        self.orders = Some(orders);
        self
    }

    pub fn with_agent_directory(mut self, directory: Arc<dyn AgentDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn with_activity_sink(mut self, activity: Arc<dyn ActivitySink>) -> Self {
        self.activity = Some(activity);
        self
    }

    pub fn with_presence_store(mut self, presence: Arc<dyn PresenceStore>) -> Self {
        self.presence = Some(presence);
        self
    }

    /// Defaults to [`NoopEventSink`]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> Result<AssignmentEngine> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let missing = |what: &str| AssignmentError::configuration(format!("{} not provided", what));
        let orders = self.orders.ok_or_else(|| missing("Order store"))?;
        let directory = self.directory.ok_or_else(|| missing("Agent directory"))?;
        let activity = self.activity.ok_or_else(|| missing("Activity sink"))?;
        let presence = self.presence.ok_or_else(|| missing("Presence store"))?;
        let events = self.events.unwrap_or_else(|| Arc::new(NoopEventSink) as Arc<dyn EventSink>);

        let timeout = config.store.operation_timeout();
        let presence = PresenceTracker::new(presence, timeout);
        let workload = WorkloadReader::new(orders.clone(), directory.clone(), presence.clone(), timeout);

        let ctx = Arc::new(AssignmentContext {
            orders,
            directory,
            presence,
            workload,
            activity: ActivityLogger::new(activity, timeout),
            events,
            config,
        });

        info!("✅ Assignment engine ready");
        Ok(AssignmentEngine {
            auto: Arc::new(AutoAssigner::new(ctx.clone())),
            manual: Arc::new(ManualReassigner::new(ctx.clone())),
            bulk: Arc::new(BulkReassigner::new(ctx.clone())),
            redistributor: Arc::new(OfflineRedistributor::new(ctx.clone())),
            ctx,
        })
    }
}

impl Default for AssignmentEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
