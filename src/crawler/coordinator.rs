//! Crawler coordinator - main crawl orchestration logic
//!
//! The coordinator is the only owner of crawl state: the crawl chain, the
//! per-record assemblies, the progress counter and the record sink. Fetches
//! run as independent tasks that report back through a `JoinSet`; every
//! state change happens on the coordinator as it drains those completions,
//! so no state is shared between tasks.

use crate::config::Config;
use crate::crawler::chain::{CrawlChain, CrawlTask, TaskKind};
use crate::crawler::fetcher::{FetchRequest, FetchedResponse, HttpFetcher};
use crate::crawler::pagination::PaginationState;
use crate::crawler::parser::{parse_detail, parse_listing, RecordLink};
use crate::crawler::seeds;
use crate::fingerprint::Fingerprinter;
use crate::output::{CrawlReport, CrawlStats};
use crate::record::{DrugRecord, Sample};
use crate::state::{FileLink, ProgressTracker, RecordAssembly};
use crate::storage::RecordSink;
use crate::{CrawlError, Result};
use reqwest::header::ACCEPT_ENCODING;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use url::Url;

/// Log target for crawl chain alerts
pub const CHAIN_TARGET: &str = "rceth_harvest::chain";

/// Completions handled between progress lines
const PROGRESS_INTERVAL: u64 = 500;

/// What an in-flight fetch was issued for
#[derive(Debug)]
enum Job {
    Chain(CrawlTask),
    Detail { record_id: String },
    Probe { record_id: String, link: FileLink },
    Sample {
        record_id: String,
        file_id: String,
        part_index: u8,
    },
}

impl Job {
    fn record_id(&self) -> Option<&str> {
        match self {
            Self::Chain(_) => None,
            Self::Detail { record_id }
            | Self::Probe { record_id, .. }
            | Self::Sample { record_id, .. } => Some(record_id),
        }
    }
}

/// Result of one fetch, reported back to the coordinator
#[derive(Debug)]
struct Completion {
    job: Job,
    result: Result<FetchedResponse>,
}

/// Main crawler coordinator structure
pub struct Coordinator<S: RecordSink> {
    config: Arc<Config>,
    fetcher: HttpFetcher,
    fingerprinter: Fingerprinter,
    limiter: Arc<Semaphore>,
    base_url: Url,
    results_url: String,
    chain: CrawlChain,
    assemblies: HashMap<String, RecordAssembly>,
    seen_records: HashSet<String>,
    progress: ProgressTracker,
    stats: CrawlStats,
    sink: S,
    in_flight: JoinSet<Completion>,
}

impl<S: RecordSink> Coordinator<S> {
    /// Creates a new coordinator instance
    ///
    /// Seeds are shuffled unless the configuration names an explicit subset.
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `sink` - Where completed records are handed off
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Successfully created coordinator
    /// * `Err(CrawlError)` - The HTTP client or site URLs could not be built
    pub fn new(config: Config, sink: S) -> Result<Self> {
        let seeds = seeds::partition_seeds(&mut rand::thread_rng(), config.crawler.seeds.as_deref());
        Self::with_seeds(config, sink, &seeds)
    }

    /// Creates a coordinator that walks `seeds` in the given order
    pub fn with_seeds(config: Config, sink: S, seeds: &[char]) -> Result<Self> {
        let base_url = Url::parse(&config.site.base_url)?;
        let results_url = base_url.join(&config.site.results_path)?.to_string();
        let fetcher = HttpFetcher::new(&config)?;
        let fingerprinter = Fingerprinter::new(&config.fingerprint);
        let limiter = Arc::new(Semaphore::new(config.crawler.max_concurrent_requests as usize));

        let sequence: String = seeds.iter().collect();
        tracing::info!("Initial seed sequence: {}", sequence);

        Ok(Self {
            config: Arc::new(config),
            fetcher,
            fingerprinter,
            limiter,
            base_url,
            results_url,
            chain: seeds::build_chain(seeds),
            assemblies: HashMap::new(),
            seen_records: HashSet::new(),
            progress: ProgressTracker::new(),
            stats: CrawlStats::default(),
            sink,
            in_flight: JoinSet::new(),
        })
    }

    /// Runs the crawl until the chain is drained and every fetch resolved
    ///
    /// Per-task failures never abort the crawl; they are logged, counted and
    /// surface in the returned report. A record the sink refuses to store
    /// stops the crawl with [`CrawlError::Storage`].
    pub async fn run(&mut self) -> Result<CrawlReport> {
        let start_time = Instant::now();
        tracing::info!(
            "Starting crawl of {} with {} seeds",
            self.results_url,
            self.chain.pending_len()
        );

        if let Some(task) = self.chain.start() {
            self.dispatch_chain(task);
        }

        let mut handled: u64 = 0;
        while let Some(joined) = self.in_flight.join_next().await {
            match joined {
                Ok(completion) => {
                    if let Err(e) = self.handle(completion) {
                        tracing::error!("Stopping crawl: {}", e);
                        self.in_flight.shutdown().await;
                        return Err(e);
                    }
                }
                Err(e) => tracing::error!("Fetch task did not finish: {}", e),
            }

            if self.in_flight.is_empty() {
                self.release_stalled_chain();
            }

            handled += 1;
            if handled % PROGRESS_INTERVAL == 0 {
                tracing::info!(
                    "Progress: {} fetches, {} records completed, {} outstanding, {} chain tasks queued",
                    handled,
                    self.stats.records_completed,
                    self.progress.outstanding(),
                    self.chain.pending_len()
                );
            }
        }

        Ok(self.finish(start_time.elapsed()))
    }

    /// Returns the sink, consuming the coordinator
    pub fn into_sink(self) -> S {
        self.sink
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Applies one completion; only a sink failure is returned
    fn handle(&mut self, completion: Completion) -> Result<()> {
        let Completion { job, result } = completion;

        if let Some(record_id) = job.record_id() {
            if !self.assemblies.contains_key(record_id) {
                tracing::debug!("Dropping result for abandoned record {}", record_id);
                return Ok(());
            }
        }

        match job {
            Job::Chain(task) => {
                self.on_listing(task, result);
                Ok(())
            }
            Job::Detail { record_id } => {
                let step = result.and_then(|response| self.on_detail(&record_id, &response));
                self.settle(&record_id, step)
            }
            Job::Probe { record_id, link } => {
                let step = result.and_then(|response| self.on_probe(&record_id, &link, &response));
                self.settle(&record_id, step)
            }
            Job::Sample {
                record_id,
                file_id,
                part_index,
            } => {
                let step = result.and_then(|response| {
                    self.on_sample(&record_id, &file_id, Sample::new(part_index, response.body))
                });
                self.settle(&record_id, step)
            }
        }
    }

    /// Handles a listing page of the chain
    fn on_listing(&mut self, task: CrawlTask, result: Result<FetchedResponse>) {
        let response = match result {
            Ok(response) => response,
            Err(e) => return self.chain_failed(&task, e),
        };

        let listing = match parse_listing(&response.text(), &self.base_url) {
            Ok(listing) => listing,
            Err(message) => {
                let error = CrawlError::HtmlParse {
                    url: response.url,
                    message,
                };
                return self.chain_failed(&task, error);
            }
        };

        if task.kind == TaskKind::Search {
            let Some(token) = listing.state_token.as_deref() else {
                let error =
                    CrawlError::MalformedStateBlob("search page has no state token".to_string());
                return self.chain_failed(&task, error);
            };
            match PaginationState::discover(token) {
                Ok(state) => self.discover_lineage(&task, state),
                Err(e) => return self.chain_failed(&task, e),
            }
        }

        tracing::debug!(
            "Lineage {} page {} lists {} records",
            task.lineage,
            task.page(),
            listing.records.len()
        );

        // Enumeration reached: the next chain task may go
        if let Some(next) = self.chain.enumeration_done(task.id) {
            self.dispatch_chain(next);
        }

        for link in listing.records {
            self.dispatch_detail(link);
        }
    }

    /// Queues follow-up pages and announces the lineage's size
    fn discover_lineage(&mut self, task: &CrawlTask, state: PaginationState) {
        tracing::info!(
            "Lineage {}: {} records on {} pages",
            task.lineage,
            state.items_count,
            state.pages_count
        );

        for page in state.follow_up_pages() {
            self.chain.enqueue(
                task.lineage,
                TaskKind::Page {
                    token: state.token.clone(),
                    page,
                },
            );
        }

        self.progress.expect(state.items_count);
        self.stats.record_seed(task.lineage, state.items_count);
    }

    fn chain_failed(&mut self, task: &CrawlTask, error: CrawlError) {
        let error = CrawlError::ChainStall {
            lineage: task.lineage,
            reason: format!("page {}: {}", task.page(), error),
        };
        tracing::error!(target: CHAIN_TARGET, "{}", error);

        if let Some(next) = self.chain.fail(task.id, error.to_string()) {
            self.dispatch_chain(next);
        }
    }

    /// Releases the next chain task when nothing in flight can do it anymore
    fn release_stalled_chain(&mut self) {
        let next = match self.chain.active() {
            Some(active) => {
                let active = active.clone();
                let error = CrawlError::ChainStall {
                    lineage: active.lineage,
                    reason: format!("page {} never reported back", active.page()),
                };
                tracing::error!(target: CHAIN_TARGET, "{}", error);
                self.chain.fail(active.id, error.to_string())
            }
            None => self.chain.start(),
        };

        if let Some(task) = next {
            self.dispatch_chain(task);
        }
    }

    fn on_detail(&mut self, record_id: &str, response: &FetchedResponse) -> Result<Option<DrugRecord>> {
        let page = parse_detail(&response.text(), &self.base_url).map_err(|message| {
            CrawlError::HtmlParse {
                url: response.url.clone(),
                message,
            }
        })?;

        let assembly = self.assembly_mut(record_id)?;
        assembly.detail(page.props, page.drug_forms)?;
        if let Some(record) = assembly.enumerate_files(page.files)? {
            return Ok(Some(record));
        }
        let links = assembly.file_links();

        for link in links {
            self.dispatch_probe(record_id, link);
        }
        Ok(None)
    }

    fn on_probe(
        &mut self,
        record_id: &str,
        link: &FileLink,
        response: &FetchedResponse,
    ) -> Result<Option<DrugRecord>> {
        let plan = self
            .fingerprinter
            .plan(&response.url, response.content_length())?;
        let requests = self
            .fingerprinter
            .requests(&response.url, response.content_type(), &plan);
        let parts: Vec<u8> = requests.iter().map(|(part, _)| *part).collect();

        if let Some(record) = self
            .assembly_mut(record_id)?
            .probe_resolved(&link.file_id, &parts)?
        {
            return Ok(Some(record));
        }

        for (part_index, request) in requests {
            let job = Job::Sample {
                record_id: record_id.to_string(),
                file_id: link.file_id.clone(),
                part_index,
            };
            self.spawn(job, request, None);
        }
        Ok(None)
    }

    fn on_sample(
        &mut self,
        record_id: &str,
        file_id: &str,
        sample: Sample,
    ) -> Result<Option<DrugRecord>> {
        self.assembly_mut(record_id)?.add_sample(file_id, sample)
    }

    fn assembly_mut(&mut self, record_id: &str) -> Result<&mut RecordAssembly> {
        self.assemblies
            .get_mut(record_id)
            .ok_or_else(|| CrawlError::UnexpectedFetch {
                record: record_id.to_string(),
                fetch: "result for unknown record".to_string(),
            })
    }

    /// Applies the outcome of one record step
    fn settle(&mut self, record_id: &str, step: Result<Option<DrugRecord>>) -> Result<()> {
        match step {
            Ok(Some(record)) => return self.emit(record),
            Ok(None) => {}
            Err(e) => self.abandon(record_id, e),
        }
        Ok(())
    }

    /// Hands a completed record to the sink
    fn emit(&mut self, record: DrugRecord) -> Result<()> {
        self.assemblies.remove(&record.id);

        if self.config.output.discard_items {
            tracing::debug!("Discarding completed record {}", record.id);
            self.stats.records_discarded += 1;
        } else {
            self.sink.ingest(&record).map_err(|e| {
                tracing::error!("Failed to store record {}: {}", record.id, e);
                CrawlError::Storage(e)
            })?;
            tracing::debug!(
                "Stored record {} with {} files",
                record.id,
                record.files.len()
            );
        }

        self.progress.complete();
        self.stats.records_completed += 1;
        self.stats.files_fingerprinted += record.files.len() as u64;
        Ok(())
    }

    /// Gives up on a record; it stays counted as outstanding
    fn abandon(&mut self, record_id: &str, error: CrawlError) {
        if self.assemblies.remove(record_id).is_some() {
            tracing::warn!("Abandoning record {}: {}", record_id, error);
            self.stats.records_abandoned += 1;
        }
    }

    fn dispatch_chain(&mut self, task: CrawlTask) {
        tracing::debug!(
            "Releasing chain task {} (lineage {}, page {})",
            task.id,
            task.lineage,
            task.page()
        );
        let request = FetchRequest::post_form(
            self.results_url.clone(),
            task.form(self.config.site.page_size),
        );
        let deadline = Duration::from_secs(self.config.crawler.chain_stall_timeout_secs);
        self.spawn(Job::Chain(task), request, Some(deadline));
    }

    fn dispatch_detail(&mut self, link: RecordLink) {
        if !self.seen_records.insert(link.id.clone()) {
            tracing::debug!("Record {} already seen, skipping", link.id);
            self.stats.duplicate_listings += 1;
            return;
        }

        self.stats.records_listed += 1;
        self.assemblies
            .insert(link.id.clone(), RecordAssembly::new(link.id.clone()));
        let request = FetchRequest::get(link.url);
        self.spawn(Job::Detail { record_id: link.id }, request, None);
    }

    fn dispatch_probe(&mut self, record_id: &str, link: FileLink) {
        let request = FetchRequest::head(link.url.clone()).header(ACCEPT_ENCODING, "identity");
        let job = Job::Probe {
            record_id: record_id.to_string(),
            link,
        };
        self.spawn(job, request, None);
    }

    /// Spawns a fetch behind the global concurrency limit
    ///
    /// `deadline` bounds the fetch once it holds a permit.
    fn spawn(&mut self, job: Job, request: FetchRequest, deadline: Option<Duration>) {
        let fetcher = self.fetcher.clone();
        let limiter = self.limiter.clone();
        self.stats.requests_issued += 1;

        self.in_flight.spawn(async move {
            let _permit = limiter.acquire_owned().await.ok();
            let result = match deadline {
                Some(limit) => match tokio::time::timeout(limit, fetcher.issue(&request)).await {
                    Ok(result) => result,
                    Err(_) => Err(CrawlError::Timeout {
                        url: request.url.clone(),
                    }),
                },
                None => fetcher.issue(&request).await,
            };
            Completion { job, result }
        });
    }

    fn finish(&mut self, elapsed: Duration) -> CrawlReport {
        if !self.assemblies.is_empty() {
            tracing::warn!(
                "{} records were still assembling when the crawl ended",
                self.assemblies.len()
            );
            self.stats.records_abandoned += self.assemblies.len() as u64;
            self.assemblies.clear();
        }

        tracing::info!(
            "Crawl finished in {:?}: {} chain tasks released, {} records completed",
            elapsed,
            self.chain.released(),
            self.stats.records_completed
        );

        if let Err(e) = self.progress.finish() {
            tracing::warn!("{}", e);
        }

        CrawlReport {
            stats: self.stats.clone(),
            expected: self.progress.expected_total(),
            outstanding: self.progress.outstanding(),
            chain_failures: self.chain.failures().to_vec(),
            elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        CrawlerConfig, FingerprintConfig, OutputConfig, SiteConfig, UserAgentConfig,
    };
    use crate::storage::{MemorySink, StorageError, StorageResult};
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Sink whose storage is always unavailable
    struct BrokenSink;

    impl RecordSink for BrokenSink {
        fn ingest(&mut self, _record: &DrugRecord) -> StorageResult<()> {
            Err(StorageError::RunNotFound(0))
        }
    }

    /// Serves a one-record, one-page search for every seed
    async fn mount_single_record_registry(server: &MockServer) {
        let token = STANDARD.encode("FOpt.CPage[=]1[;]FOpt.CRec[=]1[;]");
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                r#"<form id="main"><input id="QueryStringFind" value="{}">
                <div class="table-view"><table><tbody>
                <tr><td>1</td><td><a href="/details/77">Drug</a></td></tr>
                </tbody></table></div></form>"#,
                token
            )))
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path("/details/77"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<div class="results"><div class="table-view"><table>
                <thead><tr><th>Name</th></tr></thead>
                <tbody><tr><td>Drug</td></tr></tbody>
                </table></div></div>"#,
            ))
            .mount(server)
            .await;
    }

    fn create_test_config() -> Config {
        Config {
            crawler: CrawlerConfig {
                max_concurrent_requests: 4,
                request_timeout_secs: 5,
                chain_stall_timeout_secs: 10,
                max_retries: 0,
                seeds: Some("ab".to_string()),
            },
            user_agent: UserAgentConfig {
                crawler_name: "TestCrawler".to_string(),
                crawler_version: "1.0".to_string(),
                contact_url: "https://example.com/about".to_string(),
                contact_email: "admin@example.com".to_string(),
            },
            site: SiteConfig::default(),
            fingerprint: FingerprintConfig::default(),
            output: OutputConfig {
                database_path: "./test.db".to_string(),
                discard_items: false,
            },
        }
    }

    #[test]
    fn test_coordinator_creation() {
        let coordinator =
            Coordinator::with_seeds(create_test_config(), MemorySink::new(), &['a', 'b']).unwrap();

        assert_eq!(
            coordinator.results_url,
            "https://rceth.by/Refbank/reestr_lekarstvennih_sredstv/results"
        );
        assert_eq!(coordinator.chain.pending_len(), 2);
        assert!(coordinator.sink().records().is_empty());
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let mut config = create_test_config();
        config.site.base_url = "not a url".to_string();

        let result = Coordinator::new(config, MemorySink::new());
        assert!(matches!(result, Err(CrawlError::UrlParse(_))));
    }

    #[tokio::test]
    async fn test_empty_seed_list_finishes_immediately() {
        let mut coordinator =
            Coordinator::with_seeds(create_test_config(), MemorySink::new(), &[]).unwrap();

        let report = coordinator.run().await.unwrap();
        assert_eq!(report.outstanding, 0);
        assert_eq!(report.stats.records_completed, 0);
        assert!(report.chain_failures.is_empty());
    }

    #[tokio::test]
    async fn test_stalled_chain_task_is_failed_and_next_released() {
        let mock_server = MockServer::start().await;
        mount_single_record_registry(&mock_server).await;

        let mut config = create_test_config();
        config.site.base_url = mock_server.uri();
        let mut coordinator =
            Coordinator::with_seeds(config, MemorySink::new(), &['a', 'b']).unwrap();

        // Lineage 'a' is released but its fetch never reports back
        let lost = coordinator.chain.start().unwrap();
        assert_eq!(lost.lineage, 'a');
        coordinator.release_stalled_chain();

        assert_eq!(coordinator.chain.failures().len(), 1);
        assert_eq!(coordinator.chain.failures()[0].lineage, 'a');
        assert_eq!(coordinator.chain.active().map(|task| task.lineage), Some('b'));

        let report = coordinator.run().await.unwrap();
        assert_eq!(report.chain_failures.len(), 1);
        assert_eq!(report.stats.seed_items.get(&'b'), Some(&1));
        assert!(report.stats.seed_items.get(&'a').is_none());
        assert_eq!(report.outstanding, 0);
        assert!(coordinator.sink().get("77").is_some());
    }

    #[tokio::test]
    async fn test_sink_failure_stops_the_crawl() {
        let mock_server = MockServer::start().await;
        mount_single_record_registry(&mock_server).await;

        let mut config = create_test_config();
        config.site.base_url = mock_server.uri();
        let mut coordinator = Coordinator::with_seeds(config, BrokenSink, &['a']).unwrap();

        let result = coordinator.run().await;
        assert!(matches!(result, Err(CrawlError::Storage(_))));
    }
}
