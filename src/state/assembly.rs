//! Per-record assembly state machine
//!
//! A record is assembled from results that arrive independently: the detail
//! page, one metadata probe per attached document, and the sampled windows
//! of every document. [`RecordAssembly`] accepts those results in any order
//! the fetches complete in and yields the finished [`DrugRecord`] exactly
//! once, at the moment its last outstanding fetch resolves.

use crate::record::{DrugRecord, FileRecord, Property, Sample};
use crate::state::RecordStage;
use crate::CrawlError;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A document link found on a detail page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLink {
    /// Last path segment of the document URL
    pub file_id: String,

    /// Absolute document URL
    pub url: String,

    /// Link text
    pub used_for: String,
}

/// A fetch a record is still waiting for
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum PendingFetch {
    /// Metadata probe of a document
    Probe { file_id: String },

    /// One sampled window of a document
    Part { file_id: String, part_index: u8 },
}

impl fmt::Display for PendingFetch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Probe { file_id } => write!(f, "probe of {}", file_id),
            Self::Part {
                file_id,
                part_index,
            } => write!(f, "part {} of {}", part_index, file_id),
        }
    }
}

#[derive(Debug)]
struct PendingFile {
    link: FileLink,
    samples: Vec<Sample>,
}

#[derive(Debug)]
enum Stage {
    Listed,
    Detailed,
    FilesEnumerated {
        files: BTreeMap<String, PendingFile>,
        pending: BTreeSet<PendingFetch>,
    },
    Complete,
}

impl Stage {
    fn tag(&self) -> RecordStage {
        match self {
            Self::Listed => RecordStage::Listed,
            Self::Detailed => RecordStage::Detailed,
            Self::FilesEnumerated { .. } => RecordStage::FilesEnumerated,
            Self::Complete => RecordStage::Complete,
        }
    }
}

/// Assembly state of one drug record
#[derive(Debug)]
pub struct RecordAssembly {
    record: DrugRecord,
    stage: Stage,
}

impl RecordAssembly {
    /// Starts assembling a record that was seen on a listing page
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            record: DrugRecord::new(id),
            stage: Stage::Listed,
        }
    }

    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub fn stage(&self) -> RecordStage {
        self.stage.tag()
    }

    /// Fetches the record is still waiting for
    pub fn pending(&self) -> Vec<PendingFetch> {
        match &self.stage {
            Stage::FilesEnumerated { pending, .. } => pending.iter().cloned().collect(),
            _ => Vec::new(),
        }
    }

    /// Distinct document links, once files are enumerated
    pub fn file_links(&self) -> Vec<FileLink> {
        match &self.stage {
            Stage::FilesEnumerated { files, .. } => {
                files.values().map(|file| file.link.clone()).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Listed → Detailed: stores the property table and drug forms
    pub fn detail(
        &mut self,
        props: Vec<Property>,
        drug_forms: BTreeMap<usize, Vec<Property>>,
    ) -> Result<(), CrawlError> {
        self.check_transition(RecordStage::Detailed)?;

        self.record.props = props;
        self.record.drug_forms = drug_forms;
        self.stage = Stage::Detailed;
        Ok(())
    }

    /// Detailed → FilesEnumerated, or straight to Complete without documents
    ///
    /// Returns the finished record when there is nothing to fingerprint.
    /// Links sharing a file id are fingerprinted once.
    pub fn enumerate_files(
        &mut self,
        links: Vec<FileLink>,
    ) -> Result<Option<DrugRecord>, CrawlError> {
        if links.is_empty() {
            self.check_transition(RecordStage::Complete)?;
            return Ok(Some(self.finish(Vec::new())));
        }

        self.check_transition(RecordStage::FilesEnumerated)?;

        let mut files = BTreeMap::new();
        let mut pending = BTreeSet::new();
        for link in links {
            if files.contains_key(&link.file_id) {
                tracing::debug!(
                    "Record {} links {} more than once",
                    self.record.id,
                    link.file_id
                );
                continue;
            }
            pending.insert(PendingFetch::Probe {
                file_id: link.file_id.clone(),
            });
            files.insert(
                link.file_id.clone(),
                PendingFile {
                    link,
                    samples: Vec::new(),
                },
            );
        }

        self.stage = Stage::FilesEnumerated { files, pending };
        Ok(None)
    }

    /// Replaces a resolved probe with the sample fetches it planned
    ///
    /// Returns the finished record if the probe was the last outstanding
    /// fetch and planned nothing further.
    pub fn probe_resolved(
        &mut self,
        file_id: &str,
        part_indices: &[u8],
    ) -> Result<Option<DrugRecord>, CrawlError> {
        let probe = PendingFetch::Probe {
            file_id: file_id.to_string(),
        };

        let Stage::FilesEnumerated { pending, .. } = &mut self.stage else {
            return Err(self.unexpected(&probe));
        };
        if !pending.remove(&probe) {
            return Err(self.unexpected(&probe));
        }

        for &part_index in part_indices {
            pending.insert(PendingFetch::Part {
                file_id: file_id.to_string(),
                part_index,
            });
        }

        Ok(self.try_complete())
    }

    /// Stores one sampled window
    ///
    /// Returns the finished record when this was the last outstanding fetch.
    pub fn add_sample(
        &mut self,
        file_id: &str,
        sample: Sample,
    ) -> Result<Option<DrugRecord>, CrawlError> {
        let part = PendingFetch::Part {
            file_id: file_id.to_string(),
            part_index: sample.part_index,
        };

        let Stage::FilesEnumerated { files, pending } = &mut self.stage else {
            return Err(self.unexpected(&part));
        };
        if !pending.remove(&part) {
            return Err(self.unexpected(&part));
        }
        if let Some(file) = files.get_mut(file_id) {
            file.samples.push(sample);
        }

        Ok(self.try_complete())
    }

    /// FilesEnumerated → Complete once nothing is pending
    fn try_complete(&mut self) -> Option<DrugRecord> {
        let Stage::FilesEnumerated { files, pending } = &mut self.stage else {
            return None;
        };
        if !pending.is_empty() {
            return None;
        }

        let files = std::mem::take(files)
            .into_values()
            .map(|file| {
                FileRecord::from_samples(
                    file.link.file_id.clone(),
                    file.link.file_id,
                    file.link.used_for,
                    &file.samples,
                )
            })
            .collect();
        Some(self.finish(files))
    }

    fn finish(&mut self, files: Vec<FileRecord>) -> DrugRecord {
        self.stage = Stage::Complete;

        let id = self.record.id.clone();
        let mut record = std::mem::replace(&mut self.record, DrugRecord::new(id));
        record.files = files.into_iter().map(|f| (f.id.clone(), f)).collect();
        record
    }

    fn check_transition(&self, to: RecordStage) -> Result<(), CrawlError> {
        let from = self.stage();
        if from.can_transition_to(to) {
            Ok(())
        } else {
            Err(CrawlError::InvalidTransition {
                record: self.record.id.clone(),
                from,
                to,
            })
        }
    }

    fn unexpected(&self, fetch: &PendingFetch) -> CrawlError {
        CrawlError::UnexpectedFetch {
            record: self.record.id.clone(),
            fetch: fetch.to_string(),
        }
    }
}
