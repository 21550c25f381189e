//! Attempt history persistence.
//!
//! Every sealed `ServiceRunResult` is written as pretty JSON to
//! `<dir>/<service file stem>.json`, overwriting the previous run.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tracing::debug;

use crate::domain::models::ServiceRunResult;

/// Writes sealed session results to a history directory.
#[derive(Debug, Clone)]
pub struct HistoryWriter {
    dir: PathBuf,
}

impl HistoryWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path a result for `service_id` is written to.
    pub fn path_for(&self, result: &ServiceRunResult) -> PathBuf {
        self.dir
            .join(format!("{}.json", result.service().file_stem()))
    }

    /// Persist a result and return the file path.
    pub async fn write(&self, result: &ServiceRunResult) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create history dir {}", self.dir.display()))?;

        let path = self.path_for(result);
        let body = serde_json::to_vec_pretty(result).context("Failed to serialize run result")?;
        fs::write(&path, body)
            .await
            .with_context(|| format!("Failed to write history file {}", path.display()))?;

        debug!(service_id = %result.service_id(), path = %path.display(), "attempt history written");
        Ok(path)
    }

    /// Load a previously written result.
    pub async fn read(path: &Path) -> Result<ServiceRunResult> {
        let body = fs::read(path)
            .await
            .with_context(|| format!("Failed to read history file {}", path.display()))?;
        serde_json::from_slice(&body).context("Failed to parse history file")
    }
}
