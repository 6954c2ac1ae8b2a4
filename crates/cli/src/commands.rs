//! Command handlers

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use colored::Colorize;
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

use dispatch_assignment_engine::agent::{Agent, AgentId};
use dispatch_assignment_engine::assignment::BulkReassignRequest;
use dispatch_assignment_engine::config::{EngineConfig, LogFormat, LoggingConfig};
use dispatch_assignment_engine::events::BroadcastEventSink;
use dispatch_assignment_engine::logging::init_logging;
use dispatch_assignment_engine::order::{Order, OrderId, ProductFilter, ProductRef};
use dispatch_assignment_engine::store::SqliteStore;
use dispatch_assignment_engine::{AssignmentEngine, PresenceChange};

use crate::output::{self, ActivityRow, OutcomeRow, OutputFormat, WorkloadRow};
use crate::{Cli, Commands};

/// Contents of an `init --seed` file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SeedFile {
    agents: Vec<Agent>,
    orders: Vec<Order>,
}

struct Session {
    engine: AssignmentEngine,
    store: SqliteStore,
    events: BroadcastEventSink,
    format: OutputFormat,
}

pub async fn run(cli: Cli) -> Result<()> {
    let mut config = load_config(cli.config.as_deref(), cli.database)?;
    apply_log_flags(&mut config.logging, cli.log_level, cli.json_logs);
    init_logging(&config.logging, "dispatchctl")?;
    debug!("Using database {}", config.store.database_url);

    let events = BroadcastEventSink::default();
    let (engine, store) = dispatch_assignment_engine::init(config, Some(Arc::new(events.clone())))
        .await
        .context("failed to open the assignment store")?;

    let session = Session {
        engine,
        store,
        events,
        format: cli.format,
    };
    session.execute(cli.command).await
}

fn load_config(path: Option<&Path>, database: Option<String>) -> Result<EngineConfig> {
    let mut config = match path {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(url) = database {
        config.store.database_url = url;
    }
    config.validate()?;
    Ok(config)
}

/// Command-line logging flags take precedence over the `[logging]` section
fn apply_log_flags(logging: &mut LoggingConfig, level: Option<String>, json: bool) {
    if let Some(level) = level {
        logging.level = level;
    }
    if json {
        logging.format = LogFormat::Json;
    }
}

impl Session {
    async fn execute(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Init { seed } => self.init(seed.as_deref()).await,
            Commands::AutoAssign => self.auto_assign().await,
            Commands::Reassign { order, to, actor } => self.reassign(order, to, actor).await,
            Commands::Bulk {
                count,
                targets,
                sources,
                skus,
                titles,
                logic,
                actor,
            } => {
                let mut request = if sources.is_empty() {
                    BulkReassignRequest::global(count, targets, actor)
                } else {
                    let sources = sources.into_iter().map(AgentId::from).collect();
                    BulkReassignRequest::from_agents(sources, count, targets, actor)
                };
                let products: Vec<ProductRef> = skus
                    .into_iter()
                    .map(ProductRef::sku)
                    .chain(titles.into_iter().map(ProductRef::title))
                    .collect();
                if !products.is_empty() {
                    request = request.with_product_filter(ProductFilter::new(logic, products));
                }
                self.bulk(&request).await
            }
            Commands::Stats { agent } => match agent {
                Some(agent) => self.agent_stats(AgentId::from(agent)).await,
                None => self.summary().await,
            },
            Commands::Login { agent } => {
                let change = self.engine.agent_login(&AgentId::from(agent)).await?;
                self.print_change(&change)
            }
            Commands::Logout { agent } => {
                let change = self.engine.agent_logout(&AgentId::from(agent)).await?;
                self.print_change(&change)
            }
            Commands::Availability { agent, state } => {
                let change = self.engine.set_availability(&AgentId::from(agent), state).await?;
                self.print_change(&change)
            }
            Commands::Heartbeat { agent } => {
                let agent = AgentId::from(agent);
                if !self.engine.record_heartbeat(&agent).await? {
                    bail!("agent {} has no presence entry; log it in first", agent);
                }
                println!("💓 Heartbeat recorded for {}", agent);
                Ok(())
            }
            Commands::Sweep => {
                let report = self.engine.sweep_stale_presence().await?;
                if self.format.is_json() {
                    return output::print_json(&report);
                }
                println!("🧹 {} agents swept offline", report.swept.len());
                for change in &report.swept {
                    self.print_change(change)?;
                }
                Ok(())
            }
            Commands::Monitor => self.monitor().await,
            Commands::Activity { limit } => {
                let records = self.engine.recent_activity(limit).await?;
                if self.format.is_json() {
                    return output::print_json(&records);
                }
                output::print_table(records.iter().map(ActivityRow::from).collect());
                Ok(())
            }
        }
    }

    async fn init(&self, seed: Option<&Path>) -> Result<()> {
        let Some(path) = seed else {
            println!("✅ Database ready");
            return Ok(());
        };

        let text = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
        let seed: SeedFile =
            serde_json::from_str(&text).with_context(|| format!("invalid seed file {}", path.display()))?;

        for agent in &seed.agents {
            self.store.upsert_agent(agent).await?;
        }
        for order in &seed.orders {
            self.store.insert_order(order).await?;
        }
        info!("🌱 Seeded {} agents and {} orders", seed.agents.len(), seed.orders.len());
        println!(
            "✅ Database ready: {} agents, {} orders loaded",
            seed.agents.len(),
            seed.orders.len()
        );
        Ok(())
    }

    async fn auto_assign(&self) -> Result<()> {
        let run = self.engine.auto_assign().await?;
        if self.format.is_json() {
            return output::print_json(&run);
        }
        output::print_table(run.results.iter().map(OutcomeRow::from).collect());
        println!(
            "🔄 Processed {} orders: {}",
            run.total_processed,
            output::tally(run.successful_assignments, run.failed_assignments)
        );
        Ok(())
    }

    async fn reassign(&self, order: String, to: String, actor: String) -> Result<()> {
        let outcome = self
            .engine
            .reassign(&OrderId::from(order), &AgentId::from(to), &AgentId::from(actor))
            .await?;
        if self.format.is_json() {
            return output::print_json(&outcome);
        }
        output::print_table(vec![OutcomeRow::from(&outcome)]);
        if !outcome.success {
            bail!("{}", outcome.message);
        }
        Ok(())
    }

    async fn bulk(&self, request: &BulkReassignRequest) -> Result<()> {
        let result = self.engine.bulk_reassign(request).await?;
        if self.format.is_json() {
            return output::print_json(&result);
        }
        output::print_table(result.results.iter().map(OutcomeRow::from).collect());
        println!(
            "📦 {}: {}",
            result.message,
            output::tally(result.successful, result.failed)
        );
        Ok(())
    }

    async fn summary(&self) -> Result<()> {
        let summary = self.engine.workload_summary().await?;
        if self.format.is_json() {
            return output::print_json(&summary);
        }
        output::print_table(summary.agent_workloads.iter().map(WorkloadRow::from).collect());
        println!(
            "📊 {} agents: {} online, {} offline",
            summary.total_agents,
            summary.online_agents.to_string().green(),
            summary.offline_agents
        );
        Ok(())
    }

    async fn agent_stats(&self, agent_id: AgentId) -> Result<()> {
        let Some(workload) = self.engine.agent_workload(&agent_id).await? else {
            bail!("agent {} not found", agent_id);
        };
        let stats = self.engine.agent_activity_stats(&agent_id).await?;

        if self.format.is_json() {
            return output::print_json(&serde_json::json!({
                "workload": workload,
                "activity": stats,
            }));
        }
        output::print_table(vec![WorkloadRow::from(&workload)]);
        output::print_table(output::count_rows(&stats));
        if let Some(last) = stats.last_activity {
            println!("🕒 Last activity {}", last.format("%Y-%m-%d %H:%M:%S"));
        }
        Ok(())
    }

    async fn monitor(&self) -> Result<()> {
        let mut rx = self.events.subscribe();
        let monitor = self.engine.spawn_presence_monitor()?;
        println!(
            "👀 Monitoring presence every {}s (press Ctrl+C to exit)",
            self.engine.config().presence.heartbeat_interval_secs
        );

        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Ok(event) => {
                        if self.format.is_json() {
                            println!("{}", serde_json::to_string(&event)?);
                        } else {
                            println!("📣 {} {:?}", event.name().cyan(), event);
                        }
                    }
                    Err(RecvError::Lagged(missed)) => println!("{}", format!("⚠️ {} events missed", missed).yellow()),
                    Err(RecvError::Closed) => break,
                },
                _ = tokio::signal::ctrl_c() => break,
            }
        }

        monitor.shutdown().await;
        info!("🛑 Monitor stopped");
        Ok(())
    }

    fn print_change(&self, change: &PresenceChange) -> Result<()> {
        if self.format.is_json() {
            return output::print_json(change);
        }
        let previous = change
            .previous
            .map(|p| p.to_string())
            .unwrap_or_else(|| "UNKNOWN".to_string());
        println!("👤 {}: {} -> {}", change.agent_id, previous, change.current);

        if let Some(redistribution) = &change.redistribution {
            println!(
                "🔄 Redistributed {} orders, {} stayed with {}",
                redistribution.redistributed, redistribution.retained, change.agent_id
            );
        }
        if let Some(error) = &change.redistribution_error {
            println!("{}", format!("⚠️ Redistribution failed: {}", error).red());
        }
        if let Some(run) = &change.auto_assignment {
            println!(
                "📥 Auto-assignment on login: {}",
                output::tally(run.successful_assignments, run.failed_assignments)
            );
        }
        Ok(())
    }
}
