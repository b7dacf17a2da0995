//! Energy optimiser operator CLI
//!
//! Reads the controller's status endpoint and the per-cycle suggestion
//! records it leaves on disk.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{status, suggestions};
use std::path::PathBuf;

/// Energy optimiser CLI
#[derive(Parser)]
#[command(name = "eoctl")]
#[command(author, version, about = "CLI for the cluster energy optimiser", long_about = None)]
pub struct Cli {
    /// Controller API URL [default: http://localhost:9105]
    #[arg(long, env = "EOCTL_CONTROLLER_URL")]
    pub controller_url: Option<String>,

    /// Directory holding sug_<cycle>.json records [default: /tmp/k8s_optimizer_suggestions]
    #[arg(long, env = "EOCTL_SUGGESTION_DIR")]
    pub suggestion_dir: Option<PathBuf>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the controller's latest cycle and component health
    Status,

    /// Inspect per-cycle suggestion records
    #[command(subcommand)]
    Suggestions(SuggestionCommands),
}

#[derive(Subcommand)]
pub enum SuggestionCommands {
    /// List the most recent suggestions
    List {
        /// Number of records to show
        #[arg(long, short, default_value = "20")]
        limit: usize,
    },

    /// Show the suggestion recorded for one cycle
    Show {
        /// Cycle number
        cycle: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let file_config = config::Config::load()?;
    let settings = config::Settings::resolve(
        cli.controller_url,
        cli.suggestion_dir,
        cli.format,
        file_config,
    );

    match cli.command {
        Commands::Status => {
            let client = client::ApiClient::new(&settings.controller_url)?;
            status::show_status(&client, settings.format).await?;
        }
        Commands::Suggestions(cmd) => match cmd {
            SuggestionCommands::List { limit } => {
                suggestions::list_suggestions(&settings.suggestion_dir, limit, settings.format)?;
            }
            SuggestionCommands::Show { cycle } => {
                suggestions::show_suggestion(&settings.suggestion_dir, cycle, settings.format)?;
            }
        },
    }

    Ok(())
}
