//! Subscriber installation for dispatch binaries
//!
//! The engine only emits `tracing` events. A binary calls [`init_logging`]
//! once with the `[logging]` section of its [`EngineConfig`]. When
//! `RUST_LOG` is set it replaces the configured directives entirely.
//!
//! [`EngineConfig`]: crate::config::EngineConfig

use std::str::FromStr;

use tracing::{debug, Level};
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{AssignmentError, Result};

/// Parse a level name such as `info` or `DEBUG`
pub fn parse_level(level: &str) -> Result<Level> {
    Level::from_str(level.trim()).map_err(|_| AssignmentError::configuration(format!("Invalid log level: {}", level)))
}

/// Filter used when `RUST_LOG` is unset
///
/// The engine and `binary` log at `level`. Everything else, sqlx included,
/// only reports warnings.
pub fn default_directives(level: Level, binary: &str) -> String {
    let level = level.to_string().to_ascii_lowercase();
    format!("warn,dispatch_assignment_engine={},{}={}", level, binary, level)
}

/// Install the global subscriber writing to stderr
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig, binary: &str) -> Result<()> {
    let level = parse_level(&config.level)?;
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directives(level, binary))
            .map_err(|e| AssignmentError::configuration(format!("Invalid log filter: {}", e)))?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let installed = match config.format {
        LogFormat::Compact => builder.compact().with_target(false).try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| AssignmentError::configuration(format!("Failed to install logger: {}", e)))?;

    debug!("🚚 {} running dispatch engine {}", binary, env!("CARGO_PKG_VERSION"));
    Ok(())
}
