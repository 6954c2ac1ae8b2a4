//! End-to-end flows over the SQLite stores

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use serial_test::serial;
use tempfile::TempDir;

use dispatch_assignment_engine::prelude::*;

fn file_config(dir: &TempDir) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.store.database_url = format!("sqlite://{}?mode=rwc", dir.path().join("dispatch.db").display());
    config.store.operation_timeout_ms = 2_000;
    config
}

async fn seed(store: &SqliteStore, agents: &[(&str, u32)], unassigned: usize) {
    for (id, max) in agents {
        store.upsert_agent(&Agent::new(*id, format!("Agent {}", id), *max)).await.unwrap();
    }
    let base = Utc::now() - ChronoDuration::days(1);
    for i in 0..unassigned {
        let at = base + ChronoDuration::minutes(i as i64);
        store
            .insert_order(
                &Order::new(format!("o-{:03}", i), format!("#{}", i), at)
                    .with_line_item(LineItem::new("Kettle", Some("K-1"), 1)),
            )
            .await
            .unwrap();
    }
}

#[tokio::test]
#[serial]
async fn test_full_flow_on_file_database() {
    let dir = TempDir::new().unwrap();
    let events = BroadcastEventSink::new(256);
    let mut rx = events.subscribe();
    let (engine, store) = dispatch_assignment_engine::init(file_config(&dir), Some(Arc::new(events)))
        .await
        .unwrap();
    seed(&store, &[("a", 5), ("b", 5)], 6).await;

    engine.agent_login(&AgentId::from("a")).await.unwrap();
    engine.agent_login(&AgentId::from("b")).await.unwrap();

    let run = engine.auto_assign().await.unwrap();
    assert_eq!(run.successful_assignments, 6);

    let summary = engine.workload_summary().await.unwrap();
    assert_eq!(summary.online_agents, 2);
    assert!(summary.agent_workloads.iter().all(|w| w.assigned_orders == 3));

    let logout = engine.agent_logout(&AgentId::from("a")).await.unwrap();
    assert_eq!(logout.redistribution.unwrap().redistributed, 3);

    let b = engine.agent_workload(&AgentId::from("b")).await.unwrap().unwrap();
    assert_eq!(b.assigned_orders, 6);

    let stats = engine.global_activity_stats().await.unwrap();
    assert_eq!(stats.count(ActivityType::OrderAssigned), 6);
    assert_eq!(stats.count(ActivityType::OrderRedistributed), 3);

    let mut names = Vec::new();
    while let Ok(event) = rx.try_recv() {
        names.push(event.name());
    }
    assert!(names.contains(&"assignment_completed"));
    assert!(names.contains(&"orders_redistributed"));
}

#[tokio::test]
#[serial]
async fn test_state_survives_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let (engine, store) = dispatch_assignment_engine::init(file_config(&dir), None).await.unwrap();
        seed(&store, &[("a", 10)], 3).await;
        engine.agent_login(&AgentId::from("a")).await.unwrap();
        engine.auto_assign().await.unwrap();
        store.pool().close().await;
    }

    let (engine, _store) = dispatch_assignment_engine::init(file_config(&dir), None).await.unwrap();
    assert!(engine.is_online(&AgentId::from("a")).await.unwrap());
    let workload = engine.agent_workload(&AgentId::from("a")).await.unwrap().unwrap();
    assert_eq!(workload.assigned_orders, 3);
    assert_eq!(engine.recent_activity(10).await.unwrap().len(), 4);
}

#[tokio::test]
#[serial]
async fn test_bulk_reassign_with_product_filter_on_sqlite() {
    let dir = TempDir::new().unwrap();
    let (engine, store) = dispatch_assignment_engine::init(file_config(&dir), None).await.unwrap();
    seed(&store, &[("source", 100), ("x", 100), ("y", 100)], 0).await;

    let base = Utc::now() - ChronoDuration::days(1);
    for i in 0..10 {
        let at = base + ChronoDuration::minutes(i);
        let sku = if i % 2 == 0 { "K-1" } else { "T-1" };
        store
            .insert_order(
                &Order::new(format!("o-{}", i), format!("#{}", i), at)
                    .assigned_to("source", at)
                    .with_line_item(LineItem::new("Item", Some(sku), 1)),
            )
            .await
            .unwrap();
    }

    let request = BulkReassignRequest::from_agents(
        vec![AgentId::from("source")],
        10,
        vec![TargetAgentSpec::new("x", 60.0), TargetAgentSpec::new("y", 40.0)],
        "admin",
    )
    .with_product_filter(ProductFilter::new(FilterLogic::Any, vec![ProductRef::sku("K-1")]));
    let result = engine.bulk_reassign(&request).await.unwrap();

    assert_eq!(result.total_orders, 5);
    assert_eq!(result.successful, 5);
    let x = engine.agent_workload(&AgentId::from("x")).await.unwrap().unwrap();
    let y = engine.agent_workload(&AgentId::from("y")).await.unwrap().unwrap();
    assert_eq!(x.assigned_orders, 3);
    assert_eq!(y.assigned_orders, 2);
}

#[tokio::test]
#[serial]
async fn test_concurrent_offline_edge_on_sqlite_presence() {
    let dir = TempDir::new().unwrap();
    let (engine, store) = dispatch_assignment_engine::init(file_config(&dir), None).await.unwrap();
    seed(&store, &[("a", 10), ("b", 10)], 0).await;
    engine.agent_login(&AgentId::from("a")).await.unwrap();
    engine.agent_login(&AgentId::from("b")).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..6 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move { engine.set_offline(&AgentId::from("a")).await }));
    }

    let mut edges = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap().redistribution.is_some() {
            edges += 1;
        }
    }
    assert_eq!(edges, 1);
}
