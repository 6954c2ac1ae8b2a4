//! SQLite presence store
//!
//! Shares the pool of a [`SqliteStore`](crate::store::SqliteStore). State
//! changes are compare-and-set updates keyed on the state that was read, so
//! the previous state returned to a writer is the one it actually replaced.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use tracing::debug;

use crate::agent::{AgentId, PresenceState};
use crate::error::{AssignmentError, Result};
use crate::presence::{PresenceRecord, PresenceStore, PresenceTransition};
use crate::store::sqlite::{from_millis, to_millis};

const MAX_CAS_ATTEMPTS: usize = 8;

#[derive(Clone)]
pub struct SqlitePresenceStore {
    pool: SqlitePool,
}

impl SqlitePresenceStore {
    /// The `presence` table must exist; it is created by the store migrations
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn current_state(&self, agent_id: &AgentId) -> Result<Option<PresenceState>> {
        let row = sqlx::query("SELECT state FROM presence WHERE agent_id = ?")
            .bind(&agent_id.0)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let state: String = row.try_get("state")?;
                Ok(Some(PresenceState::from_str(&state).map_err(AssignmentError::presence)?))
            }
            None => Ok(None),
        }
    }
}

fn agent_id_from_row(row: &SqliteRow) -> Result<AgentId> {
    Ok(AgentId(row.try_get("agent_id")?))
}

fn record_from_row(row: &SqliteRow) -> Result<PresenceRecord> {
    let state: String = row.try_get("state")?;
    Ok(PresenceRecord {
        agent_id: AgentId(row.try_get("agent_id")?),
        state: PresenceState::from_str(&state).map_err(AssignmentError::presence)?,
        last_activity: from_millis(row.try_get("last_activity")?)?,
        state_since: from_millis(row.try_get("state_since")?)?,
    })
}

#[async_trait]
impl PresenceStore for SqlitePresenceStore {
    async fn set_state(&self, agent_id: &AgentId, state: PresenceState) -> Result<PresenceTransition> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let now = to_millis(Utc::now());
            let previous = self.current_state(agent_id).await?;

            let rows = match previous {
                None => {
                    sqlx::query(
                        "INSERT INTO presence (agent_id, state, last_activity, state_since)
                         VALUES (?, ?, ?, ?)
                         ON CONFLICT(agent_id) DO NOTHING",
                    )
                    .bind(&agent_id.0)
                    .bind(state.as_str())
                    .bind(now)
                    .bind(now)
                    .execute(&self.pool)
                    .await?
                    .rows_affected()
                }
                Some(prev) if prev == state => {
                    sqlx::query("UPDATE presence SET last_activity = ? WHERE agent_id = ? AND state = ?")
                        .bind(now)
                        .bind(&agent_id.0)
                        .bind(prev.as_str())
                        .execute(&self.pool)
                        .await?
                        .rows_affected()
                }
                Some(prev) => {
                    sqlx::query(
                        "UPDATE presence SET state = ?, state_since = ?, last_activity = ?
                         WHERE agent_id = ? AND state = ?",
                    )
                    .bind(state.as_str())
                    .bind(now)
                    .bind(now)
                    .bind(&agent_id.0)
                    .bind(prev.as_str())
                    .execute(&self.pool)
                    .await?
                    .rows_affected()
                }
            };

            if rows > 0 {
                return Ok(PresenceTransition { previous, current: state });
            }
            debug!("Presence of {} changed concurrently, retrying", agent_id);
        }

        Err(AssignmentError::presence(format!(
            "presence of {} kept changing during update",
            agent_id
        )))
    }

    async fn get(&self, agent_id: &AgentId) -> Result<Option<PresenceRecord>> {
        let row = sqlx::query("SELECT agent_id, state, last_activity, state_since FROM presence WHERE agent_id = ?")
            .bind(&agent_id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn touch_activity(&self, agent_id: &AgentId) -> Result<bool> {
        let result = sqlx::query("UPDATE presence SET last_activity = ? WHERE agent_id = ?")
            .bind(to_millis(Utc::now()))
            .bind(&agent_id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_in_state(&self, state: PresenceState) -> Result<Vec<AgentId>> {
        let rows = sqlx::query("SELECT agent_id FROM presence WHERE state = ? ORDER BY agent_id")
            .bind(state.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(agent_id_from_row).collect()
    }

    async fn list_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<AgentId>> {
        let rows = sqlx::query(
            "SELECT agent_id FROM presence
             WHERE state != 'OFFLINE' AND last_activity < ?
             ORDER BY agent_id",
        )
        .bind(to_millis(cutoff))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(agent_id_from_row).collect()
    }

    async fn mark_offline_if_stale(&self, agent_id: &AgentId, cutoff: DateTime<Utc>) -> Result<Option<PresenceTransition>> {
        // Stored timestamps are whole milliseconds
        let cutoff = to_millis(cutoff);
        for _ in 0..MAX_CAS_ATTEMPTS {
            let Some(record) = self.get(agent_id).await? else {
                return Ok(None);
            };
            if !record.state.is_connected() || to_millis(record.last_activity) >= cutoff {
                return Ok(None);
            }

            let rows = sqlx::query(
                "UPDATE presence SET state = 'OFFLINE', state_since = ?
                 WHERE agent_id = ? AND state = ? AND last_activity < ?",
            )
            .bind(to_millis(Utc::now()))
            .bind(&agent_id.0)
            .bind(record.state.as_str())
            .bind(cutoff)
            .execute(&self.pool)
            .await?
            .rows_affected();

            if rows > 0 {
                return Ok(Some(PresenceTransition {
                    previous: Some(record.state),
                    current: PresenceState::Offline,
                }));
            }
            debug!("Presence of {} changed during stale check, re-reading", agent_id);
        }

        Err(AssignmentError::presence(format!(
            "presence of {} kept changing during stale check",
            agent_id
        )))
    }

    async fn list_all(&self) -> Result<Vec<PresenceRecord>> {
        let rows = sqlx::query("SELECT agent_id, state, last_activity, state_since FROM presence ORDER BY agent_id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(record_from_row).collect()
    }
}
