//! `eoctl status`

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use tabled::Tabled;

use crate::client::{ApiClient, ControllerStatus, HealthReport};
use crate::output::{
    color_action, color_delta, color_status, format_watts, print_json, print_table, print_warning,
    OutputFormat,
};

#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Failures")]
    failures: u32,
    #[tabled(rename = "Message")]
    message: String,
}

#[derive(Serialize)]
struct StatusOutput<'a> {
    status: &'a ControllerStatus,
    health: &'a HealthReport,
}

/// Show the controller's latest cycle and component health
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let status: ControllerStatus = client.get("status").await?;
    let health: HealthReport = client.probe("healthz").await?;

    match format {
        OutputFormat::Json => print_json(&StatusOutput {
            status: &status,
            health: &health,
        })?,
        OutputFormat::Table => print_status(&status, &health),
    }

    Ok(())
}

fn print_status(status: &ControllerStatus, health: &HealthReport) {
    println!("{}", "Energy Optimiser".bold());
    println!("{}", "=".repeat(50));
    println!("Health:           {}", color_status(&health.status));
    if status.dry_run {
        println!("Mode:             {}", "dry run".yellow());
    }
    println!("Started:          {}", status.started_at.to_rfc3339());
    println!("Cycle:            {}", status.cycle);
    if let Some(at) = status.last_cycle_at {
        println!("Last cycle at:    {}", at.to_rfc3339());
    }
    println!();

    println!("{}", "Last Cycle".bold());
    let action = status.last_action.as_deref().unwrap_or("-");
    println!("  Action:         {}", color_action(action));
    println!(
        "  Target:         {}",
        status.last_target.as_deref().unwrap_or("-").cyan()
    );
    println!("  Cluster power:  {}", format_watts(status.last_power_watts));
    println!("  Power saved:    {}", color_delta(status.last_delta_watts));
    println!();

    println!(
        "Total saved:      {}",
        format!("{:.1} W", status.saved_watts_total).green().bold()
    );
    println!(
        "Policy updates:   {} ({} of {} transitions buffered)",
        status.policy_updates, status.buffered_transitions, status.update_timestep
    );
    println!(
        "Models:           family={} target={}",
        status.family_model, status.target_model
    );
    println!();

    if let Some(error) = &status.last_error {
        print_warning(&format!("Last cycle degraded: {}", error));
        println!();
    }

    let rows: Vec<ComponentRow> = health
        .components
        .iter()
        .map(|(name, c)| ComponentRow {
            name: name.clone(),
            status: color_status(&c.status),
            failures: c.consecutive_failures,
            message: c.message.clone().unwrap_or_default(),
        })
        .collect();
    print_table(&rows);
}
