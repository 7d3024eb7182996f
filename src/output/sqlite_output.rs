//! SQLite-based output implementation
//!
//! Records the run and its full result set (leaves, clusters, detail
//! documents) in one transaction, so a database never holds half a run.

use crate::crawler::ResultSnapshot;
use crate::output::schema::initialize_schema;
use crate::output::traits::{OutputResult, OutputSink, RunInfo};
use rusqlite::{params, Connection};
use std::path::Path;

/// Writes crawl results into a SQLite database
pub struct SqliteOutput {
    conn: Connection,
}

impl SqliteOutput {
    /// Opens (or creates) the database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteOutput)` - Database opened and schema initialized
    /// * `Err(OutputError)` - Failed to open or initialize the database
    pub fn new(path: &Path) -> OutputResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    pub fn new_in_memory() -> OutputResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Number of runs recorded so far
    pub fn run_count(&self) -> OutputResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM runs", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

impl OutputSink for SqliteOutput {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn write(&mut self, snapshot: &ResultSnapshot, run: &RunInfo) -> OutputResult<()> {
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO runs (started_at, finished_at, config_hash, leaf_count, cluster_count, document_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                run.started_at.to_rfc3339(),
                run.finished_at.to_rfc3339(),
                run.config_hash,
                snapshot.leaves.len() as i64,
                snapshot.clusters.len() as i64,
                snapshot.documents.len() as i64,
            ],
        )?;
        let run_id = tx.last_insert_rowid();

        {
            let mut insert_leaf = tx.prepare(
                "INSERT INTO leaves (run_id, leaf_key, cluster_key, latitude, longitude)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for leaf in &snapshot.leaves {
                insert_leaf.execute(params![
                    run_id,
                    leaf.key,
                    leaf.cluster_key,
                    leaf.latitude,
                    leaf.longitude
                ])?;
            }

            let mut insert_cluster = tx.prepare(
                "INSERT INTO clusters (run_id, cluster_key, entity_count, latitude, longitude,
                                       min_latitude, max_latitude, min_longitude, max_longitude)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for cluster in &snapshot.clusters {
                insert_cluster.execute(params![
                    run_id,
                    cluster.cluster_key,
                    cluster.count.map(|count| count as i64),
                    cluster.latitude,
                    cluster.longitude,
                    cluster.min_latitude,
                    cluster.max_latitude,
                    cluster.min_longitude,
                    cluster.max_longitude
                ])?;
            }

            let mut insert_document = tx.prepare(
                "INSERT INTO documents (run_id, leaf_key, body) VALUES (?1, ?2, ?3)",
            )?;
            for document in &snapshot.documents {
                insert_document.execute(params![
                    run_id,
                    document.leaf_key,
                    serde_json::to_string(&document.body)?
                ])?;
            }
        }

        tx.commit()?;

        tracing::info!(
            "Recorded run {} in database ({} leaves, {} clusters, {} documents)",
            run_id,
            snapshot.leaves.len(),
            snapshot.clusters.len(),
            snapshot.documents.len()
        );
        Ok(())
    }
}
