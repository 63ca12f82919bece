//! Statistics generation from the record database
//!
//! This module provides functionality for extracting and displaying
//! harvest statistics from the storage layer.

use crate::storage::{RunRecord, Storage};
use crate::Result;

/// Database statistics summary
#[derive(Debug, Clone)]
pub struct HarvestStatistics {
    /// Total number of stored records
    pub total_records: u64,

    /// Total number of fingerprinted documents
    pub total_files: u64,

    /// Records stored without any document
    pub records_without_files: u64,

    /// Most recent crawl run, if any
    pub latest_run: Option<RunRecord>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(HarvestStatistics)` - Successfully loaded statistics
/// * `Err(CrawlError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> Result<HarvestStatistics> {
    Ok(HarvestStatistics {
        total_records: storage.count_records()?,
        total_files: storage.count_files()?,
        records_without_files: storage.count_records_without_files()?,
        latest_run: storage.get_latest_run()?,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &HarvestStatistics) {
    println!("=== Harvest Statistics ===\n");

    println!("Records:");
    println!("  Total records: {}", stats.total_records);
    println!("  Records without documents: {}", stats.records_without_files);
    println!("  Fingerprinted documents: {}", stats.total_files);

    let with_files = stats.total_records - stats.records_without_files.min(stats.total_records);
    let average = if with_files > 0 {
        stats.total_files as f64 / with_files as f64
    } else {
        0.0
    };
    println!("  Documents per record with documents: {:.2}", average);
    println!();

    match &stats.latest_run {
        Some(run) => {
            println!("Latest run:");
            println!("  Id: {}", run.id);
            println!("  Status: {}", run.status.to_db_string());
            println!("  Started: {}", run.started_at);
            println!(
                "  Finished: {}",
                run.finished_at.as_deref().unwrap_or("(not finished)")
            );
            println!("  Config hash: {}", run.config_hash);
        }
        None => println!("No crawl runs recorded"),
    }
}
