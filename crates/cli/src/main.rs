//! dispatchctl
//!
//! Operator CLI for the dispatch assignment engine, running directly
//! against the SQLite database.
//!
//! # Usage
//!
//! ```bash
//! dispatchctl init --seed seed.json
//! dispatchctl login agent-1
//! dispatchctl auto-assign
//! dispatchctl bulk --count 20 --target agent-1=70 --target agent-2=30 --actor admin
//! dispatchctl stats --format json
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use dispatch_assignment_engine::agent::PresenceState;
use dispatch_assignment_engine::assignment::TargetAgentSpec;
use dispatch_assignment_engine::order::FilterLogic;

mod commands;
mod output;

use output::OutputFormat;

#[derive(Parser)]
#[command(name = "dispatchctl")]
#[command(version)]
#[command(about = "Operate the dispatch order assignment engine", long_about = None)]
pub struct Cli {
    /// Engine configuration file (TOML)
    #[arg(long, short, env = "DISPATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Database URL, overriding the configuration file
    #[arg(long, env = "DISPATCH_DATABASE_URL")]
    database: Option<String>,

    /// Log level (error, warn, info, debug, trace), overriding `[logging]`
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON lines, overriding `[logging]`
    #[arg(long)]
    json_logs: bool,

    /// Output format
    #[arg(long, short, value_enum, default_value = "table")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the database and optionally load agents and orders
    Init {
        /// JSON file with `agents` and `orders` arrays
        #[arg(long)]
        seed: Option<PathBuf>,
    },
    /// Assign every unassigned order to online agents
    AutoAssign,
    /// Move one order to another agent
    Reassign {
        #[arg(long)]
        order: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        actor: String,
    },
    /// Percentage-based reassignment of a batch of orders
    Bulk {
        /// Number of most recent orders to move
        #[arg(long)]
        count: usize,
        /// Target as `agent=percentage`, repeatable
        #[arg(long = "target", required = true, value_parser = parse_target)]
        targets: Vec<TargetAgentSpec>,
        /// Only take orders from these agents, repeatable
        #[arg(long = "from")]
        sources: Vec<String>,
        /// Product SKU filter, repeatable
        #[arg(long = "sku")]
        skus: Vec<String>,
        /// Product title filter, repeatable
        #[arg(long = "title")]
        titles: Vec<String>,
        /// Whether orders need all or any of the products
        #[arg(long = "match", value_parser = parse_logic, default_value = "any")]
        logic: FilterLogic,
        #[arg(long)]
        actor: String,
    },
    /// Workload summary, or one agent's workload and activity
    Stats {
        #[arg(long)]
        agent: Option<String>,
    },
    /// Log an agent in
    Login { agent: String },
    /// Log an agent out, redistributing its untouched orders
    Logout { agent: String },
    /// Set an agent's availability (online, busy, break, offline)
    Availability {
        agent: String,
        #[arg(value_parser = parse_state)]
        state: PresenceState,
    },
    /// Refresh an agent's last activity
    Heartbeat { agent: String },
    /// Take agents without recent activity offline
    Sweep,
    /// Run the presence monitor until interrupted, printing engine events
    Monitor,
    /// Recent activity records
    Activity {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

fn parse_target(value: &str) -> Result<TargetAgentSpec, String> {
    let (agent, percentage) = value
        .split_once('=')
        .ok_or_else(|| format!("expected agent=percentage, got '{}'", value))?;
    let percentage: f64 = percentage
        .trim()
        .parse()
        .map_err(|_| format!("invalid percentage '{}'", percentage))?;
    Ok(TargetAgentSpec::new(agent.trim(), percentage))
}

fn parse_logic(value: &str) -> Result<FilterLogic, String> {
    match value.to_ascii_lowercase().as_str() {
        "all" => Ok(FilterLogic::All),
        "any" => Ok(FilterLogic::Any),
        other => Err(format!("expected 'all' or 'any', got '{}'", other)),
    }
}

fn parse_state(value: &str) -> Result<PresenceState, String> {
    value.parse()
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = commands::run(cli).await {
        eprintln!("❌ Error: {:#}", e);
        std::process::exit(1);
    }
}
