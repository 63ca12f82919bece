//! Crawler module for the drug registry harvest
//!
//! This module contains the core crawling logic, including:
//! - Seed partitioning and the single-file crawl chain of listing pages
//! - Pagination state token decoding and cleaning
//! - HTTP fetching with retry logic
//! - HTML parsing of listing and detail pages
//! - Overall crawl coordination

mod chain;
mod coordinator;
mod fetcher;
mod pagination;
mod parser;
mod seeds;

pub use chain::{ChainFailure, CrawlChain, CrawlTask, TaskId, TaskKind};
pub use coordinator::{Coordinator, CHAIN_TARGET};
pub use fetcher::{build_http_client, FetchRequest, FetchedResponse, HttpFetcher};
pub use pagination::{apply_page_fields, PaginationState, Segment, StateBlob};
pub use parser::{parse_detail, parse_listing, DetailPage, ListingPage, RecordLink};
pub use seeds::{build_chain, partition_seeds, search_form, seed_alphabet};

use crate::config::Config;
use crate::output::{log_report, CrawlReport};
use crate::storage::{RunStatus, SqliteStorage, Storage};
use crate::Result;
use std::path::Path;

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Open the record database and start a run
/// 2. Walk the crawl chain and assemble every listed record
/// 3. Store completed records as they finish
/// 4. Close the run and log the end-of-run report
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `config_hash` - Hash of the configuration file, stored with the run
///
/// # Returns
///
/// * `Ok(CrawlReport)` - The crawl ran to the end (possibly incomplete)
/// * `Err(CrawlError)` - The crawl could not be started or stored
pub async fn crawl(config: Config, config_hash: &str) -> Result<CrawlReport> {
    let page_size = config.site.page_size;
    let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
    let mut coordinator = Coordinator::new(config, storage)?;
    let run_id = coordinator.sink_mut().create_run(config_hash)?;
    tracing::info!("Started run {}", run_id);

    let outcome = coordinator.run().await;
    let mut storage = coordinator.into_sink();

    let status = match &outcome {
        Ok(report) if report.is_complete() => RunStatus::Completed,
        Ok(_) => RunStatus::Incomplete,
        Err(_) => RunStatus::Failed,
    };
    storage.finish_run(run_id, status)?;

    let report = outcome?;
    log_report(&report, page_size);
    Ok(report)
}
