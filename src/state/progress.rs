//! Expected-versus-completed record accounting
//!
//! Every lineage announces how many records its search matched; every
//! completed record takes one back off. Whatever is left at shutdown is the
//! number of records the crawl lost track of.

use crate::CrawlError;

/// Signed outstanding-record counter
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    outstanding: i64,
    expected_total: u64,
    completed_total: u64,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a lineage's announced item count
    pub fn expect(&mut self, items: u64) {
        self.outstanding += items as i64;
        self.expected_total += items;
    }

    /// Takes one completed record off the counter
    pub fn complete(&mut self) {
        self.outstanding -= 1;
        self.completed_total += 1;
    }

    pub fn outstanding(&self) -> i64 {
        self.outstanding
    }

    pub fn expected_total(&self) -> u64 {
        self.expected_total
    }

    pub fn completed_total(&self) -> u64 {
        self.completed_total
    }

    /// Checks the counter at shutdown
    ///
    /// A nonzero counter is reported as [`CrawlError::IncompleteCrawl`]; the
    /// caller decides how loudly to surface it.
    pub fn finish(&self) -> Result<(), CrawlError> {
        if self.outstanding == 0 {
            Ok(())
        } else {
            Err(CrawlError::IncompleteCrawl {
                outstanding: self.outstanding,
            })
        }
    }
}
