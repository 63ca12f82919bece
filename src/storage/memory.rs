//! In-memory record sink

use crate::record::DrugRecord;
use crate::storage::traits::{RecordSink, StorageResult};

/// Keeps completed records in ingestion order
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Vec<DrugRecord>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[DrugRecord] {
        &self.records
    }

    /// Looks up an ingested record by id
    pub fn get(&self, id: &str) -> Option<&DrugRecord> {
        self.records.iter().find(|record| record.id == id)
    }

    pub fn into_records(self) -> Vec<DrugRecord> {
        self.records
    }
}

impl RecordSink for MemorySink {
    fn ingest(&mut self, record: &DrugRecord) -> StorageResult<()> {
        match self.records.iter_mut().find(|stored| stored.id == record.id) {
            Some(stored) => *stored = record.clone(),
            None => self.records.push(record.clone()),
        }
        Ok(())
    }
}
