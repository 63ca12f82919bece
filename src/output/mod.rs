//! Output module for crawl reports and statistics
//!
//! This module handles:
//! - Counters collected during a crawl and the end-of-run report
//! - The per-seed distribution table
//! - Statistics read back from the record database

mod report;
pub mod stats;

pub use report::{distribution_table, log_report, CrawlReport, CrawlStats, CELL_WIDTH};
pub use stats::{load_statistics, print_statistics, HarvestStatistics};
