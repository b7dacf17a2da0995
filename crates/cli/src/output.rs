//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a table from a list of items
pub fn print_table<T: Tabled>(items: &[T]) {
    if items.is_empty() {
        println!("{}", "No items found".yellow());
        return;
    }
    let table = Table::new(items).with(Style::rounded()).to_string();
    println!("{}", table);
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Watts with one decimal, or "-" when unknown
pub fn format_watts(watts: Option<f64>) -> String {
    match watts {
        Some(w) => format!("{:.1} W", w),
        None => "-".to_string(),
    }
}

/// Signed power change; positive means power went down
pub fn color_delta(delta: Option<f64>) -> String {
    match delta {
        Some(d) if d > 0.0 => format!("+{:.1} W", d).green().to_string(),
        Some(d) if d < 0.0 => format!("{:.1} W", d).red().to_string(),
        Some(_) => "0.0 W".to_string(),
        None => "-".dimmed().to_string(),
    }
}

/// Color an action family name
pub fn color_action(action: &str) -> String {
    match action {
        "DO_NOTHING" => action.dimmed().to_string(),
        "CONSOLIDATE" => action.cyan().to_string(),
        "DEFRAGMENT" => action.blue().to_string(),
        "HARDWARE_TUNE" => action.magenta().to_string(),
        _ => action.to_string(),
    }
}

/// Color status based on value
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "healthy" | "ready" => status.green().to_string(),
        "degraded" => status.yellow().to_string(),
        "unhealthy" | "error" => status.red().to_string(),
        _ => status.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_watts() {
        assert_eq!(format_watts(Some(412.345)), "412.3 W");
        assert_eq!(format_watts(None), "-");
    }

    #[test]
    fn test_color_delta_sign() {
        colored::control::set_override(false);
        assert_eq!(color_delta(Some(20.0)), "+20.0 W");
        assert_eq!(color_delta(Some(-3.5)), "-3.5 W");
        assert_eq!(color_delta(Some(0.0)), "0.0 W");
        assert_eq!(color_delta(None), "-");
    }
}
