//! Database schema for the SQLite output
//!
//! Each run appends one `runs` row; leaves, clusters and documents reference it.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per completed crawl
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT NOT NULL,
    config_hash TEXT NOT NULL,
    leaf_count INTEGER NOT NULL,
    cluster_count INTEGER NOT NULL,
    document_count INTEGER NOT NULL
);

-- Leaf markers in discovery order
CREATE TABLE IF NOT EXISTS leaves (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    leaf_key TEXT NOT NULL,
    cluster_key TEXT NOT NULL,
    latitude REAL NOT NULL,
    longitude REAL NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_leaves_run ON leaves(run_id);
CREATE INDEX IF NOT EXISTS idx_leaves_key ON leaves(leaf_key);

-- Every cluster returned by an expansion
CREATE TABLE IF NOT EXISTS clusters (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    cluster_key TEXT NOT NULL,
    entity_count INTEGER,
    latitude REAL,
    longitude REAL,
    min_latitude REAL,
    max_latitude REAL,
    min_longitude REAL,
    max_longitude REAL
);

CREATE INDEX IF NOT EXISTS idx_clusters_run ON clusters(run_id);

-- Detail documents as raw JSON text
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    leaf_key TEXT NOT NULL,
    body TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_documents_run ON documents(run_id);
CREATE INDEX IF NOT EXISTS idx_documents_key ON documents(leaf_key);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
