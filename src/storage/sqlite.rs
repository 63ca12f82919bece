//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::record::{DrugRecord, FileRecord, Property};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{RecordSink, Storage, StorageError, StorageResult};
use crate::storage::{RunRecord, RunStatus};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,

    /// Run that ingested records are attributed to
    current_run: Option<i64>,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn,
            current_run: None,
        })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn,
            current_run: None,
        })
    }

    fn count(&self, sql: &str) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn load_props(&self, record_id: &str) -> StorageResult<Vec<Property>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, value FROM record_props WHERE record_id = ?1 ORDER BY position",
        )?;
        let props = stmt
            .query_map(params![record_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<Property>, _>>()?;
        Ok(props)
    }

    fn load_drug_forms(&self, record_id: &str) -> StorageResult<BTreeMap<usize, Vec<Property>>> {
        let mut forms: BTreeMap<usize, Vec<Property>> = BTreeMap::new();

        let mut stmt = self
            .conn
            .prepare("SELECT form_index FROM drug_forms WHERE record_id = ?1")?;
        let indices = stmt
            .query_map(params![record_id], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        for index in indices {
            forms.insert(index as usize, Vec::new());
        }

        let mut stmt = self.conn.prepare(
            "SELECT form_index, name, value FROM drug_form_props
             WHERE record_id = ?1 ORDER BY form_index, position",
        )?;
        let rows = stmt.query_map(params![record_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        for row in rows {
            let (index, name, value) = row?;
            forms
                .entry(index as usize)
                .or_insert_with(Vec::new)
                .push((name, value));
        }

        Ok(forms)
    }

    fn load_files(&self, record_id: &str) -> StorageResult<BTreeMap<String, FileRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT file_id, name, used_for, checksum FROM files WHERE record_id = ?1",
        )?;
        let rows = stmt
            .query_map(params![record_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut files = BTreeMap::new();
        for (id, name, used_for, checksum) in rows {
            let checksum = checksum
                .parse::<u128>()
                .map_err(|_| StorageError::CorruptValue {
                    column: "files.checksum".to_string(),
                    value: checksum.clone(),
                })?;
            files.insert(
                id.clone(),
                FileRecord {
                    id,
                    name,
                    used_for,
                    checksum,
                },
            );
        }
        Ok(files)
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(RunStatus::Running),
    })
}

impl RecordSink for SqliteStorage {
    fn ingest(&mut self, record: &DrugRecord) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;

        // Replace any earlier copy of the record
        for table in ["drug_form_props", "drug_forms", "record_props", "files"] {
            tx.execute(
                &format!("DELETE FROM {} WHERE record_id = ?1", table),
                params![record.id],
            )?;
        }
        tx.execute("DELETE FROM records WHERE id = ?1", params![record.id])?;

        tx.execute(
            "INSERT INTO records (id, run_id, stored_at) VALUES (?1, ?2, ?3)",
            params![record.id, self.current_run, now],
        )?;

        for (position, (name, value)) in record.props.iter().enumerate() {
            tx.execute(
                "INSERT INTO record_props (record_id, position, name, value) VALUES (?1, ?2, ?3, ?4)",
                params![record.id, position as i64, name, value],
            )?;
        }

        for (form_index, props) in &record.drug_forms {
            tx.execute(
                "INSERT INTO drug_forms (record_id, form_index) VALUES (?1, ?2)",
                params![record.id, *form_index as i64],
            )?;
            for (position, (name, value)) in props.iter().enumerate() {
                tx.execute(
                    "INSERT INTO drug_form_props (record_id, form_index, position, name, value)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![record.id, *form_index as i64, position as i64, name, value],
                )?;
            }
        }

        for file in record.files.values() {
            tx.execute(
                "INSERT INTO files (record_id, file_id, name, used_for, checksum)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.id,
                    file.id,
                    file.name,
                    file.used_for,
                    file.checksum.to_string()
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        let run_id = self.conn.last_insert_rowid();
        self.current_run = Some(run_id);
        Ok(run_id)
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs WHERE id = ?1",
                params![run_id],
                run_from_row,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs ORDER BY id DESC LIMIT 1",
                [],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        if self.current_run == Some(run_id) {
            self.current_run = None;
        }
        Ok(())
    }

    // ===== Records =====

    fn get_record(&self, record_id: &str) -> StorageResult<Option<DrugRecord>> {
        let exists = self
            .conn
            .query_row(
                "SELECT id FROM records WHERE id = ?1",
                params![record_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        if exists.is_none() {
            return Ok(None);
        }

        Ok(Some(DrugRecord {
            id: record_id.to_string(),
            props: self.load_props(record_id)?,
            drug_forms: self.load_drug_forms(record_id)?,
            files: self.load_files(record_id)?,
        }))
    }

    fn count_records(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM records")
    }

    fn count_files(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM files")
    }

    fn count_records_without_files(&self) -> StorageResult<u64> {
        self.count(
            "SELECT COUNT(*) FROM records r
             WHERE NOT EXISTS (SELECT 1 FROM files f WHERE f.record_id = r.id)",
        )
    }
}
