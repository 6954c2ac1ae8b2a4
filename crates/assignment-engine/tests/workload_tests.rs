//! Workload and activity statistics tests

mod common;

use common::*;
use dispatch_assignment_engine::prelude::*;

#[tokio::test]
async fn test_stats_reads_are_idempotent() {
    let harness = create_test_harness();
    harness.add_online_agent("a", 10).await;
    harness.add_online_agent("b", 10).await;
    harness.add_unassigned_orders(5);
    harness.engine.auto_assign().await.unwrap();

    let first = harness.engine.workload_summary().await.unwrap();
    let second = harness.engine.workload_summary().await.unwrap();
    assert_eq!(first, second);

    let activity_before = harness.activity.len();
    harness.engine.global_activity_stats().await.unwrap();
    harness.engine.agent_activity_stats(&AgentId::from("a")).await.unwrap();
    assert_eq!(harness.activity.len(), activity_before);
}

#[tokio::test]
async fn test_summary_counts_online_and_offline() {
    let harness = create_test_harness();
    harness.add_online_agent("online", 10).await;
    let busy = harness.add_online_agent("busy", 10).await;
    harness.engine.set_availability(&busy, PresenceState::Busy).await.unwrap();
    harness.add_agent("never", 10);
    harness.directory.upsert_agent(Agent::new("inactive", "Inactive", 10).inactive());
    harness
        .directory
        .upsert_agent(Agent::new("admin", "Admin", 0).with_role(AgentRole::Admin));

    let summary = harness.engine.workload_summary().await.unwrap();

    assert_eq!(summary.total_agents, 3);
    assert_eq!(summary.online_agents, 1);
    assert_eq!(summary.offline_agents, 2);
    let ids: Vec<String> = summary.agent_workloads.iter().map(|w| w.agent_id.to_string()).collect();
    assert_eq!(ids, vec!["busy", "never", "online"]);
    assert_eq!(summary.agent_workloads[0].presence, PresenceState::Busy);
    assert_eq!(summary.agent_workloads[1].presence, PresenceState::Offline);
}

#[tokio::test]
async fn test_workload_excludes_finished_orders() {
    let harness = create_test_harness();
    let a = harness.add_agent("a", 4);
    let at = base_time();
    for (id, status) in [
        ("pending", OrderStatus::Pending),
        ("shipped", OrderStatus::Shipped),
        ("delivered", OrderStatus::Delivered),
        ("cancelled", OrderStatus::Cancelled),
        ("returned", OrderStatus::Returned),
    ] {
        harness.insert(Order::new(id, id, at).assigned_to(a.clone(), at).with_status(status));
    }

    let workload = harness.engine.agent_workload(&a).await.unwrap().unwrap();

    // Shipped orders still need follow-up, so they count
    assert_eq!(workload.assigned_orders, 2);
    assert_eq!(workload.utilization_rate, 0.5);
}

#[tokio::test]
async fn test_unknown_agent_has_no_workload() {
    let harness = create_test_harness();
    assert!(harness
        .engine
        .agent_workload(&AgentId::from("ghost"))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_zero_capacity_reports_full_utilization() {
    let harness = create_test_harness();
    let a = harness.add_agent("zero", 0);

    let workload = harness.engine.agent_workload(&a).await.unwrap().unwrap();
    assert_eq!(workload.utilization_rate, 1.0);
    assert!(!workload.has_capacity());
}

#[tokio::test]
async fn test_activity_stats_by_agent_and_globally() {
    let harness = create_test_harness();
    let a = harness.add_online_agent("a", 10).await;
    let b = harness.add_online_agent("b", 10).await;
    harness.add_unassigned_orders(4);
    harness.engine.auto_assign().await.unwrap();
    harness.engine.agent_logout(&a).await.unwrap();

    let a_stats = harness.engine.agent_activity_stats(&a).await.unwrap();
    assert_eq!(a_stats.count(ActivityType::Login), 1);
    assert_eq!(a_stats.count(ActivityType::Logout), 1);
    assert_eq!(a_stats.count(ActivityType::OrderAssigned), 2);
    assert!(a_stats.last_activity.is_some());

    // a's two pending orders moved to b on logout
    let b_stats = harness.engine.agent_activity_stats(&b).await.unwrap();
    assert_eq!(b_stats.count(ActivityType::OrderRedistributed), 2);
    assert_eq!(b_stats.orders_received, 4);

    let global = harness.engine.global_activity_stats().await.unwrap();
    assert_eq!(global.total_records, harness.activity.len());
    assert_eq!(global.count(ActivityType::Login), 2);
    assert_eq!(global.agents.len(), 2);
    assert_eq!(global.agents[0].agent_id, a);
}

#[tokio::test]
async fn test_recent_activity_is_newest_first() {
    let harness = create_test_harness();
    let a = harness.add_online_agent("a", 10).await;
    harness.engine.agent_logout(&a).await.unwrap();

    let recent = harness.engine.recent_activity(1).await.unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].activity_type, ActivityType::Logout);
}
