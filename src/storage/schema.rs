//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the record database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- One row per drug record, keyed by its registry id
CREATE TABLE IF NOT EXISTS records (
    id TEXT PRIMARY KEY,
    run_id INTEGER REFERENCES runs(id),
    stored_at TEXT NOT NULL
);

-- Leading property table, in page order
CREATE TABLE IF NOT EXISTS record_props (
    record_id TEXT NOT NULL REFERENCES records(id),
    position INTEGER NOT NULL,
    name TEXT NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (record_id, position)
);

-- Drug form blocks, kept even when they carry no properties
CREATE TABLE IF NOT EXISTS drug_forms (
    record_id TEXT NOT NULL REFERENCES records(id),
    form_index INTEGER NOT NULL,
    PRIMARY KEY (record_id, form_index)
);

CREATE TABLE IF NOT EXISTS drug_form_props (
    record_id TEXT NOT NULL,
    form_index INTEGER NOT NULL,
    position INTEGER NOT NULL,
    name TEXT NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (record_id, form_index, position),
    FOREIGN KEY (record_id, form_index) REFERENCES drug_forms(record_id, form_index)
);

-- Fingerprinted documents; the 128-bit checksum is stored as decimal text
CREATE TABLE IF NOT EXISTS files (
    record_id TEXT NOT NULL REFERENCES records(id),
    file_id TEXT NOT NULL,
    name TEXT NOT NULL,
    used_for TEXT NOT NULL,
    checksum TEXT NOT NULL,
    PRIMARY KEY (record_id, file_id)
);

CREATE INDEX IF NOT EXISTS idx_files_checksum ON files(checksum);
CREATE INDEX IF NOT EXISTS idx_records_run ON records(run_id);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
