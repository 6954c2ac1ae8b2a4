//! Round-robin auto-assignment tests

mod common;

use common::*;
use dispatch_assignment_engine::prelude::*;

#[tokio::test]
async fn test_single_agent_receives_all_orders_within_capacity() {
    let harness = create_test_harness();
    let alice = harness.add_online_agent("alice", 5).await;
    harness.add_unassigned_orders(3);

    let run = harness.engine.auto_assign().await.unwrap();

    assert_eq!(run.total_processed, 3);
    assert_eq!(run.successful_assignments, 3);
    assert_eq!(run.failed_assignments, 0);

    let workload = harness.engine.agent_workload(&alice).await.unwrap().unwrap();
    assert_eq!(workload.assigned_orders, 3);
    assert_eq!(workload.utilization_rate, 0.6);
}

#[tokio::test]
async fn test_capacity_is_never_exceeded() {
    let harness = create_test_harness();
    let a = harness.add_online_agent("a", 2).await;
    let b = harness.add_online_agent("b", 2).await;
    harness.add_unassigned_orders(6);

    let run = harness.engine.auto_assign().await.unwrap();

    assert_eq!(run.successful_assignments, 4);
    assert_eq!(run.failed_assignments, 2);
    assert_eq!(harness.count_assigned_to(&a), 2);
    assert_eq!(harness.count_assigned_to(&b), 2);
    for outcome in run.results.iter().filter(|r| !r.success) {
        assert!(outcome.message.contains("No eligible"));
    }

    let summary = harness.engine.workload_summary().await.unwrap();
    for workload in &summary.agent_workloads {
        assert!(workload.assigned_orders <= u64::from(workload.max_orders));
    }
}

#[tokio::test]
async fn test_orders_rotate_across_equally_loaded_agents() {
    let harness = create_test_harness();
    harness.add_online_agent("a", 10).await;
    harness.add_online_agent("b", 10).await;
    harness.add_online_agent("c", 10).await;
    harness.add_unassigned_orders(6);

    let run = harness.engine.auto_assign().await.unwrap();

    // Oldest order first, ties broken by agent id
    let placed: Vec<String> = run
        .results
        .iter()
        .map(|r| r.agent_id.as_ref().unwrap().to_string())
        .collect();
    assert_eq!(placed, vec!["a", "b", "c", "a", "b", "c"]);
    assert_eq!(run.results[0].order_id, OrderId::from("o-000"));
}

#[tokio::test]
async fn test_lighter_agents_fill_first() {
    let harness = create_test_harness();
    let a = harness.add_online_agent("a", 10).await;
    let b = harness.add_online_agent("b", 10).await;
    for i in 0..3 {
        harness.add_order(&format!("existing-{}", i), i, Some(&a));
    }
    harness.add_unassigned_orders(4);

    harness.engine.auto_assign().await.unwrap();

    // b catches up to 3, then they alternate
    assert_eq!(harness.count_assigned_to(&b), 3);
    assert_eq!(harness.count_assigned_to(&a), 4);
}

#[tokio::test]
async fn test_least_utilized_strategy_weighs_capacity() {
    let mut config = test_config();
    config.assignment.balance_strategy = BalanceStrategy::LeastUtilized;
    let harness = create_test_harness_with(config);
    let small = harness.add_online_agent("small", 2).await;
    let large = harness.add_online_agent("large", 8).await;
    harness.add_unassigned_orders(5);

    harness.engine.auto_assign().await.unwrap();

    assert_eq!(harness.count_assigned_to(&large), 4);
    assert_eq!(harness.count_assigned_to(&small), 1);
}

#[tokio::test]
async fn test_only_online_active_follow_up_agents_are_eligible() {
    let harness = create_test_harness();
    let online = harness.add_online_agent("online", 10).await;

    harness.add_agent("never-logged-in", 10);

    let on_break = harness.add_online_agent("on-break", 10).await;
    harness.engine.set_availability(&on_break, PresenceState::Break).await.unwrap();

    harness.directory.upsert_agent(Agent::new("inactive", "Inactive", 10).inactive());
    harness.engine.set_online(&AgentId::from("inactive")).await.unwrap();

    harness
        .directory
        .upsert_agent(Agent::new("supervisor", "Supervisor", 10).with_role(AgentRole::Supervisor));
    harness.engine.set_online(&AgentId::from("supervisor")).await.unwrap();

    harness.add_unassigned_orders(4);
    let run = harness.engine.auto_assign().await.unwrap();

    assert_eq!(run.successful_assignments, 4);
    assert_eq!(harness.count_assigned_to(&online), 4);
}

#[tokio::test]
async fn test_no_online_agents_fails_every_order() {
    let harness = create_test_harness();
    harness.add_agent("offline", 10);
    let ids = harness.add_unassigned_orders(3);

    let run = harness.engine.auto_assign().await.unwrap();

    assert_eq!(run.total_processed, 3);
    assert_eq!(run.failed_assignments, 3);
    for id in &ids {
        assert_eq!(harness.assignee(id), None);
    }
}

#[tokio::test]
async fn test_zero_capacity_agent_never_receives_orders() {
    let harness = create_test_harness();
    harness.add_online_agent("zero", 0).await;
    harness.add_unassigned_orders(1);

    let run = harness.engine.auto_assign().await.unwrap();
    assert_eq!(run.failed_assignments, 1);
}

#[tokio::test]
async fn test_terminal_and_shipped_orders_are_not_picked_up() {
    let harness = create_test_harness();
    harness.add_online_agent("a", 10).await;
    let now = base_time();
    harness.insert(Order::new("shipped", "#s", now).with_status(OrderStatus::Shipped));
    harness.insert(Order::new("cancelled", "#c", now).with_status(OrderStatus::Cancelled));
    harness.insert(Order::new("postponed", "#p", now).with_status(OrderStatus::Postponed));

    let run = harness.engine.auto_assign().await.unwrap();

    assert_eq!(run.total_processed, 1);
    assert_eq!(run.results[0].order_id, OrderId::from("postponed"));
}

#[tokio::test]
async fn test_terminal_orders_do_not_consume_capacity() {
    let harness = create_test_harness();
    let a = harness.add_online_agent("a", 1).await;
    harness.insert(
        Order::new("done", "#done", base_time())
            .assigned_to(a.clone(), base_time())
            .with_status(OrderStatus::Delivered),
    );
    harness.add_unassigned_orders(1);

    let run = harness.engine.auto_assign().await.unwrap();
    assert_eq!(run.successful_assignments, 1);
}

#[tokio::test]
async fn test_max_batch_size_limits_one_run() {
    let mut config = test_config();
    config.assignment.max_batch_size = Some(2);
    let harness = create_test_harness_with(config);
    harness.add_online_agent("a", 10).await;
    harness.add_unassigned_orders(5);

    let first = harness.engine.auto_assign().await.unwrap();
    assert_eq!(first.total_processed, 2);
    assert_eq!(first.results[0].order_id, OrderId::from("o-000"));

    let second = harness.engine.auto_assign().await.unwrap();
    assert_eq!(second.results[0].order_id, OrderId::from("o-002"));
}

#[tokio::test]
async fn test_assignments_are_logged_and_announced() {
    let harness = create_test_harness();
    harness.add_online_agent("a", 10).await;
    harness.add_unassigned_orders(2);
    let mut rx = harness.subscribe();

    harness.engine.auto_assign().await.unwrap();

    assert_eq!(harness.activity_count(ActivityType::OrderAssigned), 2);
    let names: Vec<&str> = drain_events(&mut rx).iter().map(|e| e.name()).collect::<Vec<_>>();
    assert_eq!(names, vec!["order_assigned", "order_assigned", "assignment_completed"]);
}

#[tokio::test]
async fn test_empty_run() {
    let harness = create_test_harness();
    harness.add_online_agent("a", 10).await;

    let run = harness.engine.auto_assign().await.unwrap();
    assert_eq!(run.total_processed, 0);
    assert!(run.results.is_empty());
}
