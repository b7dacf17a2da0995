//! Configuration management for the CLI
//!
//! Flags and environment variables win over `~/.config/eoctl/config.json`,
//! which wins over the built-in defaults.

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::output::OutputFormat;

pub const DEFAULT_CONTROLLER_URL: &str = "http://localhost:9105";
pub const DEFAULT_SUGGESTION_DIR: &str = "/tmp/k8s_optimizer_suggestions";

/// CLI configuration file
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Controller API URL
    pub controller_url: Option<String>,
    /// Directory the controller writes suggestion records to
    pub suggestion_dir: Option<PathBuf>,
    /// Default output format ("table" or "json")
    pub default_format: Option<String>,
}

impl Config {
    /// Load configuration from file, or defaults when there is none
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        serde_json::from_str(&content).context("Failed to parse config file")
    }

    fn config_path() -> Option<PathBuf> {
        dirs_next::home_dir().map(|home| home.join(".config").join("eoctl").join("config.json"))
    }
}

/// Effective settings for one invocation
#[derive(Debug, Clone)]
pub struct Settings {
    pub controller_url: String,
    pub suggestion_dir: PathBuf,
    pub format: OutputFormat,
}

impl Settings {
    pub fn resolve(
        controller_url: Option<String>,
        suggestion_dir: Option<PathBuf>,
        format: Option<OutputFormat>,
        file: Config,
    ) -> Self {
        let file_format = file
            .default_format
            .as_deref()
            .and_then(|f| OutputFormat::from_str(f, true).ok());

        Self {
            controller_url: controller_url
                .or(file.controller_url)
                .unwrap_or_else(|| DEFAULT_CONTROLLER_URL.to_string()),
            suggestion_dir: suggestion_dir
                .or(file.suggestion_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SUGGESTION_DIR)),
            format: format.or(file_format).unwrap_or_default(),
        }
    }
}
