//! `eoctl suggestions`: read the controller's per-cycle records from disk

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tabled::Tabled;
use thiserror::Error;

use crate::output::{color_action, print_info, print_json, print_table, print_warning, OutputFormat};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionRecord {
    pub cycle: u64,
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub action_id: usize,
    pub target: Option<String>,
}

#[derive(Debug, Error)]
pub enum SuggestionError {
    #[error("no suggestion recorded for cycle {cycle} in {dir}")]
    NotFound { cycle: u64, dir: PathBuf },
}

#[derive(Tabled)]
struct SuggestionRow {
    #[tabled(rename = "Cycle")]
    cycle: u64,
    #[tabled(rename = "Time")]
    timestamp: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Target")]
    target: String,
}

impl From<&SuggestionRecord> for SuggestionRow {
    fn from(r: &SuggestionRecord) -> Self {
        Self {
            cycle: r.cycle,
            timestamp: r.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            action: color_action(&r.action),
            target: r.target.clone().unwrap_or_else(|| "-".to_string()),
        }
    }
}

fn record_path(dir: &Path, cycle: u64) -> PathBuf {
    dir.join(format!("sug_{}.json", cycle))
}

fn cycle_of(file_name: &str) -> Option<u64> {
    file_name
        .strip_prefix("sug_")?
        .strip_suffix(".json")?
        .parse()
        .ok()
}

/// Records found in `dir`, newest cycle first, plus the count of unreadable files
pub fn load_records(dir: &Path) -> Result<(Vec<SuggestionRecord>, usize)> {
    if !dir.exists() {
        return Ok((Vec::new(), 0));
    }

    let mut records = Vec::new();
    let mut unreadable = 0;

    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read {}", dir.display()))?
    {
        let entry = entry?;
        let name = entry.file_name();
        if name.to_str().and_then(cycle_of).is_none() {
            continue;
        }

        match std::fs::read_to_string(entry.path())
            .map_err(anyhow::Error::from)
            .and_then(|body| serde_json::from_str::<SuggestionRecord>(&body).map_err(Into::into))
        {
            Ok(record) => records.push(record),
            Err(_) => unreadable += 1,
        }
    }

    records.sort_by(|a, b| b.cycle.cmp(&a.cycle));
    Ok((records, unreadable))
}

pub fn load_record(dir: &Path, cycle: u64) -> Result<SuggestionRecord> {
    let path = record_path(dir, cycle);
    if !path.exists() {
        return Err(SuggestionError::NotFound {
            cycle,
            dir: dir.to_path_buf(),
        }
        .into());
    }

    let body = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&body).with_context(|| format!("Malformed record {}", path.display()))
}

/// List the most recent suggestions
pub fn list_suggestions(dir: &Path, limit: usize, format: OutputFormat) -> Result<()> {
    let (mut records, unreadable) = load_records(dir)?;
    records.truncate(limit);

    match format {
        OutputFormat::Json => print_json(&records)?,
        OutputFormat::Table => {
            println!("{}", "Suggestions".bold());
            println!("Directory: {}", dir.display().to_string().cyan());
            println!();

            if records.is_empty() {
                print_info("No suggestions recorded yet");
            } else {
                let rows: Vec<SuggestionRow> = records.iter().map(SuggestionRow::from).collect();
                print_table(&rows);
            }
            if unreadable > 0 {
                print_warning(&format!("Skipped {} unreadable record(s)", unreadable));
            }
        }
    }

    Ok(())
}

/// Show the suggestion recorded for one cycle
pub fn show_suggestion(dir: &Path, cycle: u64, format: OutputFormat) -> Result<()> {
    let record = load_record(dir, cycle)?;

    match format {
        OutputFormat::Json => print_json(&record)?,
        OutputFormat::Table => {
            println!("{}", format!("Suggestion for cycle {}", record.cycle).bold());
            println!("{}", "=".repeat(40));
            println!("Recorded:  {}", record.timestamp.to_rfc3339());
            println!(
                "Action:    {} (id {})",
                color_action(&record.action),
                record.action_id
            );
            println!(
                "Target:    {}",
                record.target.as_deref().unwrap_or("-").cyan()
            );
        }
    }

    Ok(())
}
