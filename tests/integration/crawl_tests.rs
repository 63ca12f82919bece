//! Integration tests for the crawler
//!
//! These tests use wiremock to stand in for the registry and run the full
//! chain: search, follow-up pages, detail pages, document probes and
//! sampled windows.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rceth_harvest::config::{
    Config, CrawlerConfig, FingerprintConfig, OutputConfig, SiteConfig, UserAgentConfig,
};
use rceth_harvest::crawler::{crawl, Coordinator};
use rceth_harvest::fingerprint::{composite_checksum, crc32};
use rceth_harvest::storage::{MemorySink, RunStatus, SqliteStorage, Storage};
use rceth_harvest::Sample;
use std::time::{Duration, Instant};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const RESULTS_PATH: &str = "/Refbank/reestr_lekarstvennih_sredstv/results";

/// Token of a two-page, three-record search; the `FProps[1]` segment is volatile
const FIRST_PAGE_STATE: &str =
    "FOpt.CPage[=]2[;]FOpt.CRec[=]3[;]FProps[0].Name[=]N_LP[;]FProps[1].Name[=]X[;]";

/// Creates a test configuration pointing at the mock registry
fn create_test_config(base_url: &str, seeds: &str, db_path: &str) -> Config {
    Config {
        crawler: CrawlerConfig {
            max_concurrent_requests: 4,
            request_timeout_secs: 5,
            chain_stall_timeout_secs: 10,
            max_retries: 0,
            seeds: Some(seeds.to_string()),
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestBot".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        site: SiteConfig {
            base_url: base_url.to_string(),
            results_path: RESULTS_PATH.to_string(),
            page_size: 2,
        },
        fingerprint: FingerprintConfig::default(),
        output: OutputConfig {
            database_path: db_path.to_string(),
            discard_items: false,
        },
    }
}

fn listing_page(state: &str, record_ids: &[&str]) -> String {
    let rows: String = record_ids
        .iter()
        .enumerate()
        .map(|(i, id)| {
            format!(
                r#"<tr><td>{}</td><td><a href="/details/{}">Drug {}</a></td></tr>"#,
                i + 1,
                id,
                id
            )
        })
        .collect();

    format!(
        r#"<html><body>
        <form id="main" method="post">
          <input id="QueryStringFind" type="hidden" value="{}">
          <div class="table-view"><table>
            <thead><tr><th>#</th><th>Name</th></tr></thead>
            <tbody>{}</tbody>
          </table></div>
        </form>
        </body></html>"#,
        STANDARD.encode(state),
        rows
    )
}

fn detail_page(name: &str, files: &[(&str, &str)]) -> String {
    let links: String = files
        .iter()
        .map(|(file, text)| format!(r#"<a href="/files/{}">{}</a>"#, file, text))
        .collect();

    format!(
        r#"<html><body>
        <div class="results">
          <div class="table-view"><table>
            <thead><tr>
              <th>Name</th><th>INN</th><th>Form</th><th>Maker</th><th>Holder</th>
              <th>Number</th><th>Date</th><th>Valid</th><th>Status</th><th>Files</th>
            </tr></thead>
            <tbody><tr>
              <td>{}</td><td>inn</td><td>Tablets</td><td>Maker</td><td>Holder</td>
              <td>12/34</td><td>01.01.2020</td><td>01.01.2025</td><td>Active</td>
              <td>{}</td>
            </tr></tbody>
          </table></div>
          <div class="row-view">
            <h4>Tablets 10 mg</h4>
            <table><tbody>
              <tr><td><span>Dose</span></td><td>10 mg</td></tr>
            </tbody></table>
          </div>
        </div>
        </body></html>"#,
        name, links
    )
}

async fn mount_html(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/html; charset=utf-8"),
        )
        .mount(server)
        .await;
}

async fn mount_probe(server: &MockServer, route: &str, length: usize) {
    Mock::given(method("HEAD"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "application/pdf")
                .insert_header("Content-Length", length.to_string().as_str()),
        )
        .mount(server)
        .await;
}

async fn mount_range(server: &MockServer, route: &str, range: &str, bytes: &[u8]) {
    Mock::given(method("GET"))
        .and(path(route))
        .and(header("range", range))
        .respond_with(ResponseTemplate::new(206).set_body_bytes(bytes.to_vec()))
        .mount(server)
        .await;
}

/// Mounts a registry with one two-page lineage and three records
///
/// Record 1001 has no documents, 1002 has a small and a large one, 1003
/// shares the small one.
async fn mount_registry(server: &MockServer, small: &[u8], large: &[u8]) {
    Mock::given(method("POST"))
        .and(path(RESULTS_PATH))
        .and(body_string_contains("IsPostBack=False"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(listing_page(FIRST_PAGE_STATE, &["1001", "1002"])),
        )
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(RESULTS_PATH))
        .and(body_string_contains("ValueSubmit=2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(listing_page(FIRST_PAGE_STATE, &["1003"])),
        )
        .expect(1)
        .mount(server)
        .await;

    mount_html(server, "/details/1001", detail_page("Alpha", &[])).await;
    mount_html(
        server,
        "/details/1002",
        detail_page(
            "Beta",
            &[("small.pdf", "Instruction"), ("large.pdf", "Leaflet")],
        ),
    )
    .await;
    mount_html(
        server,
        "/details/1003",
        detail_page("Gamma", &[("small.pdf", "Instruction")]),
    )
    .await;

    mount_probe(server, "/files/small.pdf", small.len()).await;
    mount_probe(server, "/files/large.pdf", large.len()).await;

    Mock::given(method("GET"))
        .and(path("/files/small.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(small.to_vec()))
        .mount(server)
        .await;

    // 2000 bytes: head, centered middle and tail windows of 512
    mount_range(server, "/files/large.pdf", "bytes=0-511", &large[..512]).await;
    mount_range(server, "/files/large.pdf", "bytes=744-1255", &large[744..1256]).await;
    mount_range(server, "/files/large.pdf", "bytes=-512", &large[1488..]).await;
}

fn large_document() -> Vec<u8> {
    (0..2000u32).map(|i| (i % 251) as u8).collect()
}

#[tokio::test]
async fn test_full_crawl_single_lineage() {
    let mock_server = MockServer::start().await;
    let small = b"%PDF-1.4 small instruction".to_vec();
    let large = large_document();
    mount_registry(&mock_server, &small, &large).await;

    let config = create_test_config(&mock_server.uri(), "a", "unused.db");
    let mut coordinator = Coordinator::with_seeds(config, MemorySink::new(), &['a'])
        .expect("Failed to create coordinator");
    let report = coordinator.run().await.expect("Crawl failed");

    assert_eq!(report.expected, 3);
    assert_eq!(report.outstanding, 0);
    assert!(report.chain_failures.is_empty());
    assert!(report.is_complete());
    assert_eq!(report.stats.records_completed, 3);
    assert_eq!(report.stats.seed_items.get(&'a'), Some(&3));

    let sink = coordinator.into_sink();
    assert_eq!(sink.records().len(), 3);

    let alpha = sink.get("1001").expect("record 1001");
    assert_eq!(alpha.props[0], ("Name".to_string(), "Alpha".to_string()));
    assert!(alpha.files.is_empty());
    assert_eq!(alpha.drug_forms.len(), 1);

    let small_checksum = composite_checksum(&[Sample::new(0, small.clone())]);
    assert_eq!(small_checksum, u128::from(crc32(&small)));

    let beta = sink.get("1002").expect("record 1002");
    assert_eq!(beta.files.len(), 2);
    assert_eq!(beta.files["small.pdf"].checksum, small_checksum);
    assert_eq!(beta.files["small.pdf"].used_for, "Instruction");

    let expected_large = composite_checksum(&[
        Sample::new(1, large[..512].to_vec()),
        Sample::new(2, large[744..1256].to_vec()),
        Sample::new(3, large[1488..].to_vec()),
    ]);
    assert_eq!(beta.files["large.pdf"].checksum, expected_large);
    assert_eq!(beta.files["large.pdf"].checksum as u32, 0);

    let gamma = sink.get("1003").expect("record 1003");
    assert_eq!(gamma.files["small.pdf"].checksum, small_checksum);
}

#[tokio::test]
async fn test_follow_up_page_replays_cleaned_token() {
    let mock_server = MockServer::start().await;
    let large = large_document();
    mount_registry(&mock_server, b"tiny", &large).await;

    let config = create_test_config(&mock_server.uri(), "a", "unused.db");
    let mut coordinator =
        Coordinator::with_seeds(config, MemorySink::new(), &['a']).expect("coordinator");
    coordinator.run().await.expect("Crawl failed");

    let requests = mock_server
        .received_requests()
        .await
        .expect("request recording enabled");
    let follow_up = requests
        .iter()
        .map(|request| {
            url::form_urlencoded::parse(&request.body)
                .into_owned()
                .collect::<Vec<(String, String)>>()
        })
        .find(|form| form.iter().any(|(k, v)| k == "ValueSubmit" && v == "2"))
        .expect("follow-up page was requested");

    let field = |name: &str| {
        follow_up
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    };
    let cleaned = STANDARD.encode("FOpt.CPage[=]2[;]FOpt.CRec[=]3[;]FProps[0].Name[=]N_LP[;]");
    assert_eq!(field("QueryStringFind"), Some(cleaned));
    assert_eq!(field("IsPostBack").as_deref(), Some("true"));
    assert_eq!(
        field("FProps[0].CritElems[0].Val").as_deref(),
        Some("a")
    );
}

#[tokio::test]
async fn test_failed_search_releases_next_lineage() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(RESULTS_PATH))
        .and(body_string_contains(".Val=a&"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path(RESULTS_PATH))
        .and(body_string_contains(".Val=b&"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(listing_page("FOpt.CPage[=]1[;]FOpt.CRec[=]1[;]", &["2001"])),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    mount_html(&mock_server, "/details/2001", detail_page("Delta", &[])).await;

    let config = create_test_config(&mock_server.uri(), "ab", "unused.db");
    let mut coordinator =
        Coordinator::with_seeds(config, MemorySink::new(), &['a', 'b']).expect("coordinator");
    let report = coordinator.run().await.expect("Crawl failed");

    assert_eq!(report.chain_failures.len(), 1);
    assert_eq!(report.chain_failures[0].lineage, 'a');
    assert_eq!(report.chain_failures[0].page, 1);
    assert_eq!(report.outstanding, 0);
    assert!(!report.is_complete());
    assert!(coordinator.sink().get("2001").is_some());
}

#[tokio::test]
async fn test_hanging_search_times_out_and_releases_next_lineage() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(RESULTS_PATH))
        .and(body_string_contains(".Val=a&"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(listing_page("FOpt.CPage[=]1[;]FOpt.CRec[=]1[;]", &["4001"]))
                .set_delay(Duration::from_secs(4)),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path(RESULTS_PATH))
        .and(body_string_contains(".Val=b&"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(listing_page("FOpt.CPage[=]1[;]FOpt.CRec[=]1[;]", &["4002"])),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    mount_html(&mock_server, "/details/4001", detail_page("Slow", &[])).await;
    mount_html(&mock_server, "/details/4002", detail_page("Fast", &[])).await;

    let mut config = create_test_config(&mock_server.uri(), "ab", "unused.db");
    config.crawler.chain_stall_timeout_secs = 1;
    let mut coordinator =
        Coordinator::with_seeds(config, MemorySink::new(), &['a', 'b']).expect("coordinator");

    let started = Instant::now();
    let report = coordinator.run().await.expect("Crawl failed");
    assert!(started.elapsed() < Duration::from_secs(4));

    assert_eq!(report.chain_failures.len(), 1);
    assert_eq!(report.chain_failures[0].lineage, 'a');
    assert_eq!(report.chain_failures[0].page, 1);
    assert!(report.chain_failures[0].reason.contains("timeout"));

    // The timed-out lineage never announced its records
    assert_eq!(report.expected, 1);
    assert_eq!(report.outstanding, 0);

    let sink = coordinator.sink();
    assert!(sink.get("4002").is_some());
    assert!(sink.get("4001").is_none());
}

#[tokio::test]
async fn test_unprobeable_document_abandons_record() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(RESULTS_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(listing_page(
                "FOpt.CPage[=]1[;]FOpt.CRec[=]2[;]",
                &["3001", "3002"],
            )),
        )
        .mount(&mock_server)
        .await;

    mount_html(&mock_server, "/details/3001", detail_page("Ok", &[])).await;
    mount_html(
        &mock_server,
        "/details/3002",
        detail_page("Broken", &[("gone.pdf", "Instruction")]),
    )
    .await;
    Mock::given(method("HEAD"))
        .and(path("/files/gone.pdf"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri(), "a", "unused.db");
    let mut coordinator =
        Coordinator::with_seeds(config, MemorySink::new(), &['a']).expect("coordinator");
    let report = coordinator.run().await.expect("Crawl failed");

    assert_eq!(report.stats.records_completed, 1);
    assert_eq!(report.stats.records_abandoned, 1);
    assert_eq!(report.outstanding, 1);
    assert!(report.chain_failures.is_empty());
    assert!(!report.is_complete());

    let sink = coordinator.sink();
    assert!(sink.get("3001").is_some());
    assert!(sink.get("3002").is_none());
}

#[tokio::test]
async fn test_discard_items_stores_nothing() {
    let mock_server = MockServer::start().await;
    let large = large_document();
    mount_registry(&mock_server, b"tiny", &large).await;

    let mut config = create_test_config(&mock_server.uri(), "a", "unused.db");
    config.output.discard_items = true;
    let mut coordinator =
        Coordinator::with_seeds(config, MemorySink::new(), &['a']).expect("coordinator");
    let report = coordinator.run().await.expect("Crawl failed");

    assert_eq!(report.outstanding, 0);
    assert_eq!(report.stats.records_discarded, 3);
    assert!(coordinator.sink().records().is_empty());
}

#[tokio::test]
async fn test_crawl_persists_records_and_run() {
    let mock_server = MockServer::start().await;
    let small = b"%PDF small".to_vec();
    let large = large_document();
    mount_registry(&mock_server, &small, &large).await;

    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("harvest.db");
    let config = create_test_config(
        &mock_server.uri(),
        "a",
        db_path.to_str().expect("utf-8 path"),
    );

    let report = crawl(config, "test-hash").await.expect("Crawl failed");
    assert!(report.is_complete());

    let storage = SqliteStorage::new(&db_path).expect("Failed to open DB");
    assert_eq!(storage.count_records().unwrap(), 3);
    assert_eq!(storage.count_files().unwrap(), 3);
    assert_eq!(storage.count_records_without_files().unwrap(), 1);

    let beta = storage.get_record("1002").unwrap().expect("record stored");
    assert_eq!(
        beta.files["small.pdf"].checksum,
        u128::from(crc32(&small))
    );
    assert_eq!(beta.drug_forms[&0][0].1, "Tablets 10 mg");

    let run = storage.get_latest_run().unwrap().expect("run recorded");
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.config_hash, "test-hash");
    assert!(run.finished_at.is_some());
}
