//! Output module for persisting crawl results
//!
//! This module handles:
//! - Writing detail documents as a JSON array file
//! - Recording runs and full result sets in SQLite

mod json;
mod schema;
mod sqlite_output;
mod traits;

pub use json::JsonFileOutput;
pub use schema::{initialize_schema, SCHEMA_SQL};
pub use sqlite_output::SqliteOutput;
pub use traits::{OutputError, OutputResult, OutputSink, RunInfo};

use crate::config::OutputConfig;
use crate::crawler::ResultSnapshot;
use std::path::Path;

/// Opens every sink the output configuration asks for
///
/// The JSON file is always written; the database only when a path is set.
pub fn open_sinks(config: &OutputConfig) -> OutputResult<Vec<Box<dyn OutputSink>>> {
    let mut sinks: Vec<Box<dyn OutputSink>> = vec![Box::new(JsonFileOutput::new(&config.json_path))];

    if let Some(database_path) = &config.database_path {
        sinks.push(Box::new(SqliteOutput::new(Path::new(database_path))?));
    }

    Ok(sinks)
}

/// Writes the snapshot to every sink, stopping at the first failure
pub fn write_all(
    sinks: &mut [Box<dyn OutputSink>],
    snapshot: &ResultSnapshot,
    run: &RunInfo,
) -> OutputResult<()> {
    for sink in sinks.iter_mut() {
        tracing::debug!("Writing {} output", sink.name());
        sink.write(snapshot, run)?;
    }
    Ok(())
}
