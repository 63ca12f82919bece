//! End-of-run crawl report
//!
//! Counts collected by the coordinator while it runs, and the summary logged
//! when the crawl chain drains: the registry size per seed, a distribution
//! table of seeds by how many result pages they span, chain failures and
//! the integrity check of the progress counter.

use crate::crawler::{ChainFailure, CHAIN_TARGET};
use crate::CrawlError;
use std::collections::BTreeMap;
use std::time::Duration;

/// Width of one distribution table cell
pub const CELL_WIDTH: usize = 8;

/// Counters gathered during a crawl
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlStats {
    /// Records announced by each seed's search
    pub seed_items: BTreeMap<char, u64>,

    /// Distinct records seen on listing pages
    pub records_listed: u64,

    /// Listing rows for records already seen
    pub duplicate_listings: u64,

    pub records_completed: u64,
    pub records_abandoned: u64,
    pub records_discarded: u64,
    pub files_fingerprinted: u64,
    pub requests_issued: u64,
}

impl CrawlStats {
    pub fn record_seed(&mut self, seed: char, items: u64) {
        *self.seed_items.entry(seed).or_insert(0) += items;
    }

    /// Sum of the per-seed counts
    pub fn total_items(&self) -> u64 {
        self.seed_items.values().sum()
    }
}

/// Outcome of one crawl
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub stats: CrawlStats,

    /// Records announced across all lineages
    pub expected: u64,

    /// Announced records that never completed
    pub outstanding: i64,

    pub chain_failures: Vec<ChainFailure>,
    pub elapsed: Duration,
}

impl CrawlReport {
    /// True when every announced record completed and no chain task failed
    pub fn is_complete(&self) -> bool {
        self.outstanding == 0 && self.chain_failures.is_empty()
    }
}

/// Lays seeds out by how many result pages their search spans
///
/// Each column is one page count (`ceil(items / bucket_size)`), its cells
/// the seeds in that bucket, largest first, labelled `"<seed> <items>"`
/// (just the seed when it matched nothing).
///
/// # Arguments
///
/// * `seed_items` - Records announced per seed
/// * `bucket_size` - Records per result page
///
/// # Returns
///
/// The table as text lines: header, separator, then rows
pub fn distribution_table(seed_items: &BTreeMap<char, u64>, bucket_size: u64) -> Vec<String> {
    let bucket_size = bucket_size.max(1);

    let mut buckets: BTreeMap<u64, Vec<(u64, char)>> = BTreeMap::new();
    for (&seed, &count) in seed_items {
        buckets
            .entry(count.div_ceil(bucket_size))
            .or_default()
            .push((count, seed));
    }

    let columns: Vec<Vec<String>> = buckets
        .values_mut()
        .map(|entries| {
            entries.sort_unstable_by(|a, b| b.cmp(a));
            entries
                .iter()
                .map(|&(count, seed)| seed_label(seed, count))
                .collect()
        })
        .collect();

    let header = table_line(buckets.keys().map(|bucket| bucket.to_string()));
    let separator = "-".repeat(header.chars().count());
    let depth = columns.iter().map(Vec::len).max().unwrap_or(0);

    let mut table = vec![header, separator];
    for row in 0..depth {
        table.push(table_line(
            columns
                .iter()
                .map(|column| column.get(row).cloned().unwrap_or_default()),
        ));
    }
    table
}

fn table_line(cells: impl Iterator<Item = String>) -> String {
    cells
        .map(|cell| format!("{:>width$}", cell, width = CELL_WIDTH))
        .collect()
}

fn seed_label(seed: char, count: u64) -> String {
    if count == 0 {
        seed.to_string()
    } else {
        format!("{} {:>3}", seed, format!(" {}", count))
    }
}

/// Logs the end-of-run summary
///
/// A nonzero outstanding counter is logged as a warning naming the count.
pub fn log_report(report: &CrawlReport, page_size: u32) {
    let stats = &report.stats;

    tracing::info!("Full registry items count: {}", stats.total_items());
    tracing::info!(
        "Records: {} listed, {} completed, {} abandoned, {} discarded ({} duplicate listings)",
        stats.records_listed,
        stats.records_completed,
        stats.records_abandoned,
        stats.records_discarded,
        stats.duplicate_listings
    );
    tracing::info!(
        "Fingerprinted {} files with {} requests in {:?}",
        stats.files_fingerprinted,
        stats.requests_issued,
        report.elapsed
    );

    let table = distribution_table(&stats.seed_items, u64::from(page_size));
    tracing::info!("Seed distribution by result pages:\n{}", table.join("\n"));

    if !report.chain_failures.is_empty() {
        tracing::error!(
            target: CHAIN_TARGET,
            "{} chain tasks failed",
            report.chain_failures.len()
        );
        for failure in &report.chain_failures {
            tracing::error!(
                target: CHAIN_TARGET,
                "  lineage {} page {}: {}",
                failure.lineage,
                failure.page,
                failure.reason
            );
        }
    }

    if report.outstanding != 0 {
        let error = CrawlError::IncompleteCrawl {
            outstanding: report.outstanding,
        };
        tracing::warn!("{} of {} announced records", error, report.expected);
    }
}
