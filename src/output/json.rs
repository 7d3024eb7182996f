//! JSON array output
//!
//! Writes the detail documents, in the order they were fetched, as one
//! pretty-printed JSON array.

use crate::crawler::ResultSnapshot;
use crate::output::traits::{OutputResult, OutputSink, RunInfo};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Writes detail documents to a JSON file, replacing any previous content
#[derive(Debug, Clone)]
pub struct JsonFileOutput {
    path: PathBuf,
}

impl JsonFileOutput {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OutputSink for JsonFileOutput {
    fn name(&self) -> &str {
        "json"
    }

    fn write(&mut self, snapshot: &ResultSnapshot, _run: &RunInfo) -> OutputResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let documents: Vec<&serde_json::Value> =
            snapshot.documents.iter().map(|document| &document.body).collect();

        let mut writer = BufWriter::new(File::create(&self.path)?);
        serde_json::to_writer_pretty(&mut writer, &documents)?;
        writer.write_all(b"\n")?;
        writer.flush()?;

        tracing::info!(
            "Wrote {} documents to {}",
            documents.len(),
            self.path.display()
        );
        Ok(())
    }
}
