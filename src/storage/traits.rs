//! Storage traits and error types
//!
//! This module defines the trait interface for record sinks and storage
//! backends, and associated error types.

use crate::record::DrugRecord;
use crate::storage::{RunRecord, RunStatus};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Corrupt value in {column}: {value}")]
    CorruptValue { column: String, value: String },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Destination of completed drug records
///
/// Ingesting a record whose id was ingested before replaces the earlier copy.
pub trait RecordSink {
    fn ingest(&mut self, record: &DrugRecord) -> StorageResult<()>;
}

/// Trait for persistent storage backends
pub trait Storage: RecordSink {
    // ===== Run Management =====

    /// Creates a new crawl run
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Closes a run with its final status and a finish timestamp
    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    // ===== Records =====

    /// Loads a stored record with its properties, drug forms and files
    fn get_record(&self, record_id: &str) -> StorageResult<Option<DrugRecord>>;

    fn count_records(&self) -> StorageResult<u64>;

    fn count_files(&self) -> StorageResult<u64>;

    /// Records stored without any document
    fn count_records_without_files(&self) -> StorageResult<u64>;
}
