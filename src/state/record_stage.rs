/// Record stage definitions for tracking assembly progress
///
/// This module defines the stages a drug record passes through between being
/// listed on a search page and being handed off complete.
use std::fmt;

/// Represents how far a record's assembly has progressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordStage {
    /// Seen on a listing page, detail page not fetched yet
    Listed,

    /// Property table and drug forms extracted
    Detailed,

    /// Document links known, fingerprints outstanding
    FilesEnumerated,

    /// Every document fingerprinted; the record has been handed off
    Complete,
}

impl RecordStage {
    /// Returns the stage a record may legally move to next
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Listed => Some(Self::Detailed),
            Self::Detailed => Some(Self::FilesEnumerated),
            Self::FilesEnumerated => Some(Self::Complete),
            Self::Complete => None,
        }
    }

    /// Returns true if moving from `self` to `to` is allowed
    ///
    /// Besides single steps, a record without documents goes straight from
    /// `Detailed` to `Complete`.
    pub fn can_transition_to(&self, to: Self) -> bool {
        self.next() == Some(to) || (*self == Self::Detailed && to == Self::Complete)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Listed => "listed",
            Self::Detailed => "detailed",
            Self::FilesEnumerated => "files_enumerated",
            Self::Complete => "complete",
        }
    }
}

impl fmt::Display for RecordStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
