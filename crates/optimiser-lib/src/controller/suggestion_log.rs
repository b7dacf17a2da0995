//! Per-cycle suggestion records for operators
//!
//! One JSON file per cycle, `sug_<cycle>.json`, written atomically.

use crate::models::{ActionFamily, Suggestion};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionRecord {
    pub cycle: u64,
    pub timestamp: DateTime<Utc>,
    pub action: ActionFamily,
    pub action_id: usize,
    pub target: Option<String>,
}

impl SuggestionRecord {
    pub fn new(cycle: u64, suggestion: &Suggestion) -> Self {
        Self {
            cycle,
            timestamp: Utc::now(),
            action: suggestion.effective_action(),
            action_id: suggestion.effective_action().id(),
            target: suggestion.target.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SuggestionLog {
    dir: PathBuf,
}

impl SuggestionLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, cycle: u64) -> PathBuf {
        self.dir.join(format!("sug_{}.json", cycle))
    }

    /// Write the record for `cycle`, replacing any previous one
    pub async fn write(&self, cycle: u64, suggestion: &Suggestion) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        let record = SuggestionRecord::new(cycle, suggestion);
        let body = serde_json::to_vec_pretty(&record)?;

        let path = self.path_for(cycle);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &body)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("Failed to move {} into place", path.display()))?;
        Ok(path)
    }
}
