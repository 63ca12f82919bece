//! Record types handed to the ingestion side
//!
//! A [`DrugRecord`] is built field by field as the crawl stages complete:
//! the detail page fills `props` and `drug_forms`, the file stages fill
//! `files`. Only complete records ever leave the assembler.

use crate::fingerprint::composite_checksum;
use std::collections::BTreeMap;

/// One `(name, value)` row of a property table, in page order
pub type Property = (String, String);

/// A registered drug as listed in the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrugRecord {
    /// Registry identifier (last path segment of the detail page URL)
    pub id: String,

    /// Leading property table
    pub props: Vec<Property>,

    /// Drug-form sub-tables keyed by their position on the page
    pub drug_forms: BTreeMap<usize, Vec<Property>>,

    /// Attached documents keyed by file id
    pub files: BTreeMap<String, FileRecord>,
}

impl DrugRecord {
    /// Creates a record with only its identifier filled in
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            props: Vec::new(),
            drug_forms: BTreeMap::new(),
            files: BTreeMap::new(),
        }
    }
}

/// A fingerprinted document attached to a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub id: String,
    pub name: String,

    /// Link text shown for the document on the detail page
    pub used_for: String,

    /// Composite checksum of the sampled windows
    pub checksum: u128,
}

impl FileRecord {
    /// Builds a file record by folding its samples into one checksum
    pub fn from_samples(
        id: impl Into<String>,
        name: impl Into<String>,
        used_for: impl Into<String>,
        samples: &[Sample],
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            used_for: used_for.into(),
            checksum: composite_checksum(samples),
        }
    }
}

/// Bytes fetched for one window of a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    /// 0 for a whole file, 1/2/3 for head/middle/tail windows
    pub part_index: u8,
    pub bytes: Vec<u8>,
}

impl Sample {
    pub fn new(part_index: u8, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            part_index,
            bytes: bytes.into(),
        }
    }
}
