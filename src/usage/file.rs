//! Usage figures read from a JSON file maintained by the daemon.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{UsageReading, UsageStats, UsageStatsProvider};
use crate::error::Result;

/// On-disk shape of the usage file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageDocument {
    #[serde(flatten)]
    pub usage: UsageStats,
    pub active_tasks: usize,
    /// Overrides the configured budget when present.
    pub daily_budget: Option<f64>,
}

/// Provider that re-reads a JSON usage document on every call.
#[derive(Debug, Clone)]
pub struct FileUsageProvider {
    path: PathBuf,
    fallback_budget: f64,
}

impl FileUsageProvider {
    /// Read from `path`, using `fallback_budget` when the file has no budget.
    pub fn new(path: impl Into<PathBuf>, fallback_budget: f64) -> Self {
        Self {
            path: path.into(),
            fallback_budget,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse the current document.
    pub fn read(&self) -> Result<UsageDocument> {
        let content = fs::read_to_string(&self.path)?;
        let doc: UsageDocument = serde_json::from_str(&content)?;
        Ok(doc)
    }

    /// Write a document, replacing the file atomically.
    pub fn write(&self, doc: &UsageDocument) -> Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(doc)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl UsageStatsProvider for FileUsageProvider {
    fn current_usage(&self) -> Result<UsageStats> {
        Ok(self.read()?.usage)
    }

    fn active_task_count(&self) -> Result<usize> {
        Ok(self.read()?.active_tasks)
    }

    fn daily_budget(&self) -> Result<f64> {
        Ok(self.read()?.daily_budget.unwrap_or(self.fallback_budget))
    }

    fn reading(&self) -> Result<UsageReading> {
        let doc = self.read()?;
        Ok(UsageReading {
            usage: doc.usage,
            daily_budget: doc.daily_budget.unwrap_or(self.fallback_budget),
        })
    }
}
