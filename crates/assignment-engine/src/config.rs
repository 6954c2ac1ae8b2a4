//! # Engine Configuration
//!
//! Configuration for the assignment engine, split into sections that mirror
//! the engine's collaborators. Every section has sensible defaults so an
//! embedded deployment can start from [`EngineConfig::default`] and override
//! only what it needs; operators usually load a TOML file instead.
//!
//! ```toml
//! [store]
//! operation_timeout_ms = 5000
//! database_url = "sqlite://dispatch.db?mode=rwc"
//!
//! [presence]
//! heartbeat_interval_secs = 30
//! stale_after_secs = 120
//! monitor_enabled = true
//!
//! [assignment]
//! balance_strategy = "least_assigned"
//! auto_assign_on_login = false
//!
//! [bulk]
//! percentage_tolerance = 0.01
//! max_order_count = 10000
//!
//! [logging]
//! level = "info"
//! format = "compact"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AssignmentError, Result};

/// Complete assignment engine configuration
///
/// # Examples
///
/// ```
/// use dispatch_assignment_engine::config::{EngineConfig, BalanceStrategy};
///
/// let mut config = EngineConfig::default();
/// config.assignment.balance_strategy = BalanceStrategy::LeastUtilized;
/// config.validate().expect("default-derived configuration should be valid");
/// assert_eq!(config.store.operation_timeout(), std::time::Duration::from_millis(5000));
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Order store, directory and activity log access
    pub store: StoreConfig,

    /// Presence tracking and stale-agent detection
    pub presence: PresenceConfig,

    /// Auto-assignment behaviour
    pub assignment: AssignmentConfig,

    /// Bulk percentage reassignment limits
    pub bulk: BulkConfig,

    /// Log output of binaries; the engine never installs a subscriber itself
    pub logging: LoggingConfig,
}

/// Store access configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Upper bound for every single call into an external store
    ///
    /// When a call exceeds this bound the enclosing order (inside a batch)
    /// or request (outside a batch) fails with a timeout.
    pub operation_timeout_ms: u64,

    /// Connection URL for the SQLite-backed deployment
    pub database_url: String,
}

/// Presence tracking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// Expected interval between agent heartbeats
    pub heartbeat_interval_secs: u64,

    /// Agents silent for longer than this are swept offline
    pub stale_after_secs: u64,

    /// Allow `spawn_presence_monitor`; off when another process sweeps
    pub monitor_enabled: bool,
}

/// Auto-assignment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssignmentConfig {
    /// How the next agent is chosen among eligible agents
    pub balance_strategy: BalanceStrategy,

    /// Run an auto-assignment pass whenever an agent logs in
    pub auto_assign_on_login: bool,

    /// Optional cap on orders considered by one auto-assignment run
    pub max_batch_size: Option<usize>,
}

/// Bulk reassignment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkConfig {
    /// Allowed deviation of the target percentage sum from 100
    pub percentage_tolerance: f64,

    /// Largest `order_count` a single bulk request may ask for
    pub max_order_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level for the engine and the binary; dependencies only log warnings
    pub level: String,

    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Single-line human-readable records
    Compact,
    /// One JSON object per line
    Json,
}

/// Load balancing strategy for choosing the next agent
///
/// Both strategies break ties by agent id so a run is deterministic for a
/// given starting workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceStrategy {
    /// Fewest currently assigned orders first
    LeastAssigned,
    /// Lowest `assigned / max_orders` first
    LeastUtilized,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            operation_timeout_ms: 5000,
            database_url: "sqlite://dispatch.db?mode=rwc".to_string(),
        }
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 30,
            stale_after_secs: 120,
            monitor_enabled: true,
        }
    }
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            balance_strategy: BalanceStrategy::LeastAssigned,
            auto_assign_on_login: false,
            max_batch_size: None,
        }
    }
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            percentage_tolerance: 0.01,
            max_order_count: 10_000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

impl Default for BalanceStrategy {
    fn default() -> Self {
        BalanceStrategy::LeastAssigned
    }
}

impl StoreConfig {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

impl PresenceConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

impl EngineConfig {
    /// Parse a configuration from TOML text
    ///
    /// Missing sections and fields fall back to their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            AssignmentError::configuration(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&text)
    }

    /// Check the configuration for values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.store.operation_timeout_ms == 0 {
            return Err(AssignmentError::configuration(
                "store.operation_timeout_ms must be greater than zero",
            ));
        }
        if self.store.database_url.trim().is_empty() {
            return Err(AssignmentError::configuration(
                "store.database_url must not be empty",
            ));
        }
        if self.presence.heartbeat_interval_secs == 0 {
            return Err(AssignmentError::configuration(
                "presence.heartbeat_interval_secs must be greater than zero",
            ));
        }
        if self.presence.stale_after_secs <= self.presence.heartbeat_interval_secs {
            return Err(AssignmentError::configuration(format!(
                "presence.stale_after_secs ({}) must exceed heartbeat_interval_secs ({})",
                self.presence.stale_after_secs, self.presence.heartbeat_interval_secs
            )));
        }
        if let Some(0) = self.assignment.max_batch_size {
            return Err(AssignmentError::configuration(
                "assignment.max_batch_size must be greater than zero when set",
            ));
        }
        let tolerance = self.bulk.percentage_tolerance;
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(AssignmentError::configuration(
                "bulk.percentage_tolerance must be a finite non-negative number",
            ));
        }
        if self.bulk.max_order_count == 0 {
            return Err(AssignmentError::configuration(
                "bulk.max_order_count must be greater than zero",
            ));
        }
        crate::logging::parse_level(&self.logging.level)?;
        Ok(())
    }
}
