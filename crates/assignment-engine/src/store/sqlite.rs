//! SQLite-backed store
//!
//! One [`SqliteStore`] implements [`OrderStore`], [`AgentDirectory`] and
//! [`ActivitySink`] over a single `sqlx` pool. Schema lives in
//! `migrations/` and is applied on connect.
//!
//! Timestamps are stored as UTC milliseconds. Line items are stored as a
//! JSON array on the order row.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::{debug, info};

use crate::activity::{ActivityRecord, ActivityType};
use crate::agent::{Agent, AgentId, AgentRole};
use crate::error::{AssignmentError, Result};
use crate::order::{AssigneeFilter, LineItem, Order, OrderId, OrderQuery, OrderSort, OrderStatus};
use crate::store::{ActivitySink, AgentDirectory, OrderStore};

const ORDER_COLUMNS: &str =
    "SELECT id, reference, status, assigned_agent_id, assigned_at, created_at, order_date, line_items FROM orders";

pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| AssignmentError::database(format!("invalid stored timestamp: {}", ms)))
}

fn is_in_memory(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

/// Order store, agent directory and activity log on SQLite
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to `database_url` and run migrations
    pub async fn new(database_url: &str) -> Result<Self> {
        info!("🔌 Connecting assignment store at {}", database_url);

        let mut options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = if is_in_memory(database_url) {
            // Every connection to :memory: is a separate database
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            options = options.journal_mode(SqliteJournalMode::Wal);
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };

        let store = Self { pool };
        store.migrate().await?;
        info!("✅ Assignment store ready");
        Ok(store)
    }

    /// Private in-memory database
    pub async fn new_in_memory() -> Result<Self> {
        Self::new("sqlite::memory:").await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        debug!("Database migrations applied");
        Ok(())
    }

    /// Insert or replace an agent profile
    pub async fn upsert_agent(&self, agent: &Agent) -> Result<()> {
        sqlx::query(
            "INSERT INTO agents (id, display_name, role, is_active, max_orders)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                display_name = excluded.display_name,
                role = excluded.role,
                is_active = excluded.is_active,
                max_orders = excluded.max_orders",
        )
        .bind(&agent.id.0)
        .bind(&agent.display_name)
        .bind(agent.role.as_str())
        .bind(agent.is_active)
        .bind(i64::from(agent.max_orders))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert or replace an order
    pub async fn insert_order(&self, order: &Order) -> Result<()> {
        let line_items = serde_json::to_string(&order.line_items)?;
        sqlx::query(
            "INSERT OR REPLACE INTO orders
                (id, reference, status, assigned_agent_id, assigned_at, created_at, order_date, line_items)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&order.id.0)
        .bind(&order.reference)
        .bind(order.status.as_str())
        .bind(order.assigned_agent_id.as_ref().map(|id| id.0.clone()))
        .bind(order.assigned_at.map(to_millis))
        .bind(to_millis(order.created_at))
        .bind(to_millis(order.order_date))
        .bind(line_items)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Returns `false` when the order does not exist
    pub async fn set_order_status(&self, order_id: &OrderId, status: OrderStatus) -> Result<bool> {
        let result = sqlx::query("UPDATE orders SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(&order_id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn fetch_orders(&self, query: &OrderQuery) -> Result<Vec<Order>> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(ORDER_COLUMNS);
        builder.push(" WHERE 1 = 1");

        match &query.assignee {
            AssigneeFilter::Unassigned => {
                builder.push(" AND assigned_agent_id IS NULL");
            }
            AssigneeFilter::AnyAgent => {
                builder.push(" AND assigned_agent_id IS NOT NULL");
            }
            AssigneeFilter::Agents(ids) => {
                if ids.is_empty() {
                    return Ok(Vec::new());
                }
                builder.push(" AND assigned_agent_id IN (");
                let mut separated = builder.separated(", ");
                for id in ids {
                    separated.push_bind(id.0.clone());
                }
                separated.push_unseparated(")");
            }
        }

        if let Some(statuses) = &query.statuses {
            if statuses.is_empty() {
                return Ok(Vec::new());
            }
            builder.push(" AND status IN (");
            let mut separated = builder.separated(", ");
            for status in statuses {
                separated.push_bind(status.as_str());
            }
            separated.push_unseparated(")");
        }

        builder.push(match query.sort {
            OrderSort::CreatedAtAsc => " ORDER BY created_at ASC, id ASC",
            OrderSort::OrderDateDesc => " ORDER BY order_date DESC, id ASC",
        });

        // Product matching runs on decoded line items, so the limit can only
        // be pushed down when no product filter applies
        if query.products.is_none() {
            if let Some(limit) = query.limit {
                builder.push(" LIMIT ");
                builder.push_bind(limit as i64);
            }
        }

        let rows = builder.build().fetch_all(&self.pool).await?;
        let orders = rows.iter().map(order_from_row).collect::<Result<Vec<_>>>()?;

        if query.products.is_some() {
            Ok(query.apply(orders))
        } else {
            Ok(orders)
        }
    }
}

fn agent_from_row(row: &SqliteRow) -> Result<Agent> {
    let role: String = row.try_get("role")?;
    let max_orders: i64 = row.try_get("max_orders")?;
    Ok(Agent {
        id: AgentId(row.try_get("id")?),
        display_name: row.try_get("display_name")?,
        role: AgentRole::from_str(&role).map_err(AssignmentError::database)?,
        is_active: row.try_get("is_active")?,
        max_orders: u32::try_from(max_orders.max(0)).unwrap_or(u32::MAX),
    })
}

fn order_from_row(row: &SqliteRow) -> Result<Order> {
    let status: String = row.try_get("status")?;
    let assigned_agent_id: Option<String> = row.try_get("assigned_agent_id")?;
    let assigned_at: Option<i64> = row.try_get("assigned_at")?;
    let line_items: String = row.try_get("line_items")?;
    let line_items: Vec<LineItem> = serde_json::from_str(&line_items)?;

    Ok(Order {
        id: OrderId(row.try_get("id")?),
        reference: row.try_get("reference")?,
        status: OrderStatus::from_str(&status).map_err(AssignmentError::database)?,
        assigned_agent_id: assigned_agent_id.map(AgentId),
        assigned_at: assigned_at.map(from_millis).transpose()?,
        created_at: from_millis(row.try_get("created_at")?)?,
        order_date: from_millis(row.try_get("order_date")?)?,
        line_items,
    })
}

fn activity_from_row(row: &SqliteRow) -> Result<ActivityRecord> {
    let activity_type: String = row.try_get("activity_type")?;
    Ok(ActivityRecord {
        id: row.try_get("id")?,
        agent_id: AgentId(row.try_get("agent_id")?),
        activity_type: ActivityType::from_str(&activity_type).map_err(AssignmentError::database)?,
        description: row.try_get("description")?,
        timestamp: from_millis(row.try_get("timestamp")?)?,
    })
}

#[async_trait]
impl OrderStore for SqliteStore {
    async fn get_order(&self, order_id: &OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", ORDER_COLUMNS))
            .bind(&order_id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(order_from_row).transpose()
    }

    async fn find_unassigned_orders(&self, query: &OrderQuery) -> Result<Vec<Order>> {
        let mut query = query.clone();
        query.assignee = AssigneeFilter::Unassigned;
        self.fetch_orders(&query).await
    }

    async fn find_assigned_orders(&self, query: &OrderQuery) -> Result<Vec<Order>> {
        let mut query = query.clone();
        if query.assignee == AssigneeFilter::Unassigned {
            query.assignee = AssigneeFilter::AnyAgent;
        }
        self.fetch_orders(&query).await
    }

    async fn conditional_assign(
        &self,
        order_id: &OrderId,
        agent_id: &AgentId,
        expected: Option<&AgentId>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE orders
             SET assigned_agent_id = ?, assigned_at = ?
             WHERE id = ? AND assigned_agent_id IS ?",
        )
        .bind(&agent_id.0)
        .bind(to_millis(Utc::now()))
        .bind(&order_id.0)
        .bind(expected.map(|id| id.0.clone()))
        .execute(&self.pool)
        .await?;

        let success = result.rows_affected() > 0;
        if success {
            debug!("Order {} assigned to {}", order_id, agent_id);
        }
        Ok(success)
    }

    async fn count_assigned_for_agent(&self, agent_id: &AgentId, excluded: &[OrderStatus]) -> Result<u64> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) AS total FROM orders WHERE assigned_agent_id = ");
        builder.push_bind(agent_id.0.clone());
        if !excluded.is_empty() {
            builder.push(" AND status NOT IN (");
            let mut separated = builder.separated(", ");
            for status in excluded {
                separated.push_bind(status.as_str());
            }
            separated.push_unseparated(")");
        }
        let row = builder.build().fetch_one(&self.pool).await?;
        let total: i64 = row.try_get("total")?;
        Ok(total.max(0) as u64)
    }
}

#[async_trait]
impl AgentDirectory for SqliteStore {
    async fn list_eligible_agents(&self, role: AgentRole, active_only: bool) -> Result<Vec<Agent>> {
        let rows = sqlx::query(
            "SELECT id, display_name, role, is_active, max_orders FROM agents
             WHERE role = ? AND (? = 0 OR is_active = 1)
             ORDER BY id",
        )
        .bind(role.as_str())
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(agent_from_row).collect()
    }

    async fn get_agent(&self, agent_id: &AgentId) -> Result<Option<Agent>> {
        let row = sqlx::query("SELECT id, display_name, role, is_active, max_orders FROM agents WHERE id = ?")
            .bind(&agent_id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(agent_from_row).transpose()
    }
}

#[async_trait]
impl ActivitySink for SqliteStore {
    async fn append(&self, record: ActivityRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO activity_log (id, agent_id, activity_type, description, timestamp)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.agent_id.0)
        .bind(record.activity_type.as_str())
        .bind(&record.description)
        .bind(to_millis(record.timestamp))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list(&self, limit: Option<usize>) -> Result<Vec<ActivityRecord>> {
        // LIMIT -1 is unbounded in SQLite
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let rows = sqlx::query(
            "SELECT id, agent_id, activity_type, description, timestamp FROM activity_log
             ORDER BY rowid DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(activity_from_row).collect()
    }

    async fn list_for_agent(&self, agent_id: &AgentId) -> Result<Vec<ActivityRecord>> {
        let rows = sqlx::query(
            "SELECT id, agent_id, activity_type, description, timestamp FROM activity_log
             WHERE agent_id = ? ORDER BY rowid DESC",
        )
        .bind(&agent_id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(activity_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{FilterLogic, ProductFilter, ProductRef};
    use chrono::Duration as ChronoDuration;

    #[tokio::test]
    async fn test_agent_round_trip() {
        let store = SqliteStore::new_in_memory().await.unwrap();
        store.upsert_agent(&Agent::new("a-2", "Bob", 4)).await.unwrap();
        store.upsert_agent(&Agent::new("a-1", "Alice", 10)).await.unwrap();
        store
            .upsert_agent(&Agent::new("s-1", "Sam", 0).with_role(AgentRole::Supervisor))
            .await
            .unwrap();
        store.upsert_agent(&Agent::new("a-3", "Cleo", 2).inactive()).await.unwrap();

        let active = store.list_eligible_agents(AgentRole::FollowUpAgent, true).await.unwrap();
        let ids: Vec<_> = active.iter().map(|a| a.id.0.as_str()).collect();
        assert_eq!(ids, vec!["a-1", "a-2"]);

        let all = store.list_eligible_agents(AgentRole::FollowUpAgent, false).await.unwrap();
        assert_eq!(all.len(), 3);

        let alice = store.get_agent(&AgentId::from("a-1")).await.unwrap().unwrap();
        assert_eq!(alice.max_orders, 10);
        assert_eq!(alice.display_name, "Alice");
    }

    #[tokio::test]
    async fn test_conditional_assign_is_compare_and_set() {
        let store = SqliteStore::new_in_memory().await.unwrap();
        store.insert_order(&Order::new("o-1", "#1", Utc::now())).await.unwrap();
        let order_id = OrderId::from("o-1");
        let a = AgentId::from("a");
        let b = AgentId::from("b");

        assert!(store.conditional_assign(&order_id, &a, None).await.unwrap());
        assert!(!store.conditional_assign(&order_id, &b, None).await.unwrap());
        assert!(store.conditional_assign(&order_id, &b, Some(&a)).await.unwrap());

        let order = store.get_order(&order_id).await.unwrap().unwrap();
        assert_eq!(order.assigned_agent_id, Some(b));
    }

    #[tokio::test]
    async fn test_queries_filter_sort_and_limit() {
        let store = SqliteStore::new_in_memory().await.unwrap();
        let now = Utc::now();
        for i in 0..5 {
            let at = now - ChronoDuration::minutes(10 - i);
            let mut order = Order::new(format!("o-{}", i), format!("#{}", i), at)
                .with_line_item(LineItem::new("Kettle", Some(if i % 2 == 0 { "K-1" } else { "K-2" }), 1));
            if i >= 3 {
                order = order.assigned_to("a", at);
            }
            store.insert_order(&order).await.unwrap();
        }
        store.set_order_status(&OrderId::from("o-1"), OrderStatus::Cancelled).await.unwrap();

        let query = OrderQuery::new(AssigneeFilter::Unassigned, OrderSort::CreatedAtAsc)
            .with_statuses(OrderStatus::reassignable_statuses());
        let unassigned = store.find_unassigned_orders(&query).await.unwrap();
        let ids: Vec<_> = unassigned.iter().map(|o| o.id.0.as_str()).collect();
        assert_eq!(ids, vec!["o-0", "o-2"]);

        let query = OrderQuery::new(AssigneeFilter::AnyAgent, OrderSort::OrderDateDesc)
            .with_products(Some(ProductFilter::new(FilterLogic::Any, vec![ProductRef::sku("K-1")])))
            .with_limit(Some(1));
        let assigned = store.find_assigned_orders(&query).await.unwrap();
        assert_eq!(assigned.len(), 1);
        assert_eq!(assigned[0].id, OrderId::from("o-4"));
        assert_eq!(assigned[0].line_items[0].sku.as_deref(), Some("K-1"));
    }

    #[tokio::test]
    async fn test_count_assigned_excludes_statuses() {
        let store = SqliteStore::new_in_memory().await.unwrap();
        let now = Utc::now();
        store.insert_order(&Order::new("o-1", "#1", now).assigned_to("a", now)).await.unwrap();
        store
            .insert_order(&Order::new("o-2", "#2", now).assigned_to("a", now).with_status(OrderStatus::Returned))
            .await
            .unwrap();

        let a = AgentId::from("a");
        assert_eq!(store.count_assigned_for_agent(&a, &OrderStatus::WORKLOAD_EXCLUDED).await.unwrap(), 1);
        assert_eq!(store.count_assigned_for_agent(&a, &[]).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_activity_log_order() {
        let store = SqliteStore::new_in_memory().await.unwrap();
        let a = AgentId::from("a");
        store.append(ActivityRecord::new(a.clone(), ActivityType::Login, "in")).await.unwrap();
        store.append(ActivityRecord::new(a.clone(), ActivityType::OrderAssigned, "o-1")).await.unwrap();

        let recent = store.list(Some(1)).await.unwrap();
        assert_eq!(recent[0].activity_type, ActivityType::OrderAssigned);
        assert_eq!(store.list(None).await.unwrap().len(), 2);
        assert_eq!(store.list_for_agent(&a).await.unwrap().len(), 2);
    }
}
