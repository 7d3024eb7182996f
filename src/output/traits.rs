//! Output sink trait and types
//!
//! A sink receives the finished crawl once, after both phases completed.

use crate::crawler::ResultSnapshot;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Metadata of the run being written
#[derive(Debug, Clone)]
pub struct RunInfo {
    /// SHA-256 of the configuration file
    pub config_hash: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunInfo {
    /// Duration of the run in whole seconds
    pub fn duration_seconds(&self) -> i64 {
        (self.finished_at - self.started_at).num_seconds()
    }
}

/// Destination of a finished crawl
pub trait OutputSink {
    /// Short name used in log messages
    fn name(&self) -> &str;

    /// Writes the snapshot of one completed run
    ///
    /// # Arguments
    ///
    /// * `snapshot` - Everything the run collected
    /// * `run` - Run metadata
    fn write(&mut self, snapshot: &ResultSnapshot, run: &RunInfo) -> OutputResult<()>;
}
