//! # Error Types for the Assignment Engine
//!
//! Errors in this crate are reserved for conditions the caller cannot treat as
//! a normal business outcome: rejected batch input, unreachable stores and
//! bounded calls that ran out of time. Expected outcomes such as "order not
//! found" or "agent not eligible" are reported through structured results
//! (see [`crate::assignment::types`]) and never surface as an `Err`.

use thiserror::Error;

/// Error types for assignment engine operations
///
/// # Examples
///
/// ```
/// use dispatch_assignment_engine::{AssignmentError, Result};
///
/// fn check_count(count: usize) -> Result<()> {
///     if count == 0 {
///         return Err(AssignmentError::validation("order_count must be greater than zero"));
///     }
///     Ok(())
/// }
///
/// match check_count(0) {
///     Err(AssignmentError::Validation(msg)) => println!("rejected: {}", msg),
///     _ => unreachable!(),
/// }
/// ```
#[derive(Error, Debug)]
pub enum AssignmentError {
    /// Caller input rejected before any mutation took place
    ///
    /// # Examples
    /// - Target percentages that do not sum to 100
    /// - `agents` selection without source agents
    /// - Zero order count
    #[error("Validation error: {0}")]
    Validation(String),

    /// A referenced entity does not exist where its absence is not a
    /// business outcome (for example an unknown agent on login)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Order store, agent directory or activity log failure
    #[error("Database error: {0}")]
    Database(String),

    /// Presence store failure
    #[error("Presence error: {0}")]
    Presence(String),

    /// A bounded external call did not complete in time
    #[error("Operation '{operation}' timed out after {timeout_ms}ms")]
    Timeout {
        /// Name of the store operation that timed out
        operation: String,
        /// Configured bound in milliseconds
        timeout_ms: u64,
    },

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type alias for assignment engine operations
pub type Result<T> = std::result::Result<T, AssignmentError>;

impl From<sqlx::Error> for AssignmentError {
    fn from(err: sqlx::Error) -> Self {
        AssignmentError::Database(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for AssignmentError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AssignmentError::Database(format!("Migration failed: {}", err))
    }
}

impl From<toml::de::Error> for AssignmentError {
    fn from(err: toml::de::Error) -> Self {
        AssignmentError::Configuration(err.to_string())
    }
}

impl From<serde_json::Error> for AssignmentError {
    fn from(err: serde_json::Error) -> Self {
        AssignmentError::Database(format!("Serialization failed: {}", err))
    }
}

impl AssignmentError {
    /// Create a validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        AssignmentError::Validation(msg.into())
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        AssignmentError::NotFound(msg.into())
    }

    /// Create a database error
    pub fn database<S: Into<String>>(msg: S) -> Self {
        AssignmentError::Database(msg.into())
    }

    /// Create a presence error
    pub fn presence<S: Into<String>>(msg: S) -> Self {
        AssignmentError::Presence(msg.into())
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(operation: S, timeout_ms: u64) -> Self {
        AssignmentError::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        AssignmentError::Configuration(msg.into())
    }

    /// Whether the error came from a bounded call running out of time
    pub fn is_timeout(&self) -> bool {
        matches!(self, AssignmentError::Timeout { .. })
    }
}
