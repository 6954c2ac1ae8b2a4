//! Output formatting

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use dispatch_assignment_engine::activity::{ActivityRecord, AgentActivityStats};
use dispatch_assignment_engine::assignment::OrderOutcome;
use dispatch_assignment_engine::workload::AgentWorkload;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

impl OutputFormat {
    pub fn is_json(&self) -> bool {
        matches!(self, OutputFormat::Json)
    }
}

/// Print `data` as pretty JSON
pub fn print_json<T: Serialize>(data: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(data)?);
    Ok(())
}

pub fn print_table<R: Tabled>(rows: Vec<R>) {
    if rows.is_empty() {
        println!("{}", "(nothing to show)".dimmed());
        return;
    }
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{}", table);
}

#[derive(Tabled)]
pub struct OutcomeRow {
    #[tabled(rename = "Order")]
    order: String,
    #[tabled(rename = "")]
    status: String,
    #[tabled(rename = "From")]
    from: String,
    #[tabled(rename = "To")]
    to: String,
    #[tabled(rename = "Message")]
    message: String,
}

impl From<&OrderOutcome> for OutcomeRow {
    fn from(outcome: &OrderOutcome) -> Self {
        let status = if outcome.success {
            "✓".green().to_string()
        } else {
            "✗".red().to_string()
        };
        Self {
            order: outcome.order_id.to_string(),
            status,
            from: display_opt(outcome.previous_agent_id.as_ref()),
            to: display_opt(outcome.agent_id.as_ref()),
            message: outcome.message.clone(),
        }
    }
}

#[derive(Tabled)]
pub struct WorkloadRow {
    #[tabled(rename = "Agent")]
    agent: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Presence")]
    presence: String,
    #[tabled(rename = "Orders")]
    orders: String,
    #[tabled(rename = "Utilization")]
    utilization: String,
}

impl From<&AgentWorkload> for WorkloadRow {
    fn from(workload: &AgentWorkload) -> Self {
        let utilization = format!("{:.0}%", workload.utilization_rate * 100.0);
        let utilization = if workload.has_capacity() {
            utilization.normal().to_string()
        } else {
            utilization.yellow().to_string()
        };
        let presence = if workload.presence.accepts_orders() {
            workload.presence.to_string().green().to_string()
        } else {
            workload.presence.to_string().dimmed().to_string()
        };
        Self {
            agent: workload.agent_id.to_string(),
            name: workload.display_name.clone(),
            presence,
            orders: format!("{}/{}", workload.assigned_orders, workload.max_orders),
            utilization,
        }
    }
}

#[derive(Tabled)]
pub struct ActivityRow {
    #[tabled(rename = "When")]
    when: String,
    #[tabled(rename = "Agent")]
    agent: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Description")]
    description: String,
}

impl From<&ActivityRecord> for ActivityRow {
    fn from(record: &ActivityRecord) -> Self {
        Self {
            when: record.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            agent: record.agent_id.to_string(),
            kind: record.activity_type.to_string(),
            description: record.description.clone(),
        }
    }
}

#[derive(Tabled)]
pub struct CountRow {
    #[tabled(rename = "Activity")]
    kind: String,
    #[tabled(rename = "Count")]
    count: usize,
}

/// Per-type counts, sorted by type name
pub fn count_rows(stats: &AgentActivityStats) -> Vec<CountRow> {
    let mut rows: Vec<CountRow> = stats
        .counts_by_type
        .iter()
        .map(|(kind, count)| CountRow {
            kind: kind.to_string(),
            count: *count,
        })
        .collect();
    rows.sort_by(|a, b| a.kind.cmp(&b.kind));
    rows
}

/// One-line summary such as `3 succeeded, 1 failed`
pub fn tally(successful: usize, failed: usize) -> String {
    let failed = if failed > 0 {
        format!("{} failed", failed).red().to_string()
    } else {
        format!("{} failed", failed)
    };
    format!("{}, {}", format!("{} succeeded", successful).green(), failed)
}

fn display_opt<T: std::fmt::Display>(value: Option<&T>) -> String {
    value.map(ToString::to_string).unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_assignment_engine::agent::{Agent, PresenceState};

    #[test]
    fn test_workload_row_shows_load() {
        colored::control::set_override(false);
        let workload = AgentWorkload::new(&Agent::new("a", "Alice", 4), 3, PresenceState::Online);
        let row = WorkloadRow::from(&workload);
        assert_eq!(row.orders, "3/4");
        assert_eq!(row.utilization, "75%");
        assert_eq!(row.presence, "ONLINE");
    }

    #[test]
    fn test_outcome_row_fills_missing_agents() {
        colored::control::set_override(false);
        let outcome = OrderOutcome::failed("o-1".into(), None, "No eligible online agent");
        let row = OutcomeRow::from(&outcome);
        assert_eq!(row.from, "-");
        assert_eq!(row.to, "-");
        assert_eq!(row.status, "✗");
    }
}
