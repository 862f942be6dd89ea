//! Integration tests for the fetch client and the supervisor
//!
//! These tests use wiremock to stand in for an Etherscan-compatible API and
//! drive the real HTTP client end-to-end.

use chain_sweep::client::{ChainApi, EtherscanClient, PageQuery, PageStatus, RetryPolicy};
use chain_sweep::config::Config;
use chain_sweep::output::export_results;
use chain_sweep::{FetchError, JobParams, JobStatus, JobSupervisor};
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const ADDRESS: &str = "0x00000000000000000000000000000000000000aa";
const OTHER: &str = "0x00000000000000000000000000000000000000bb";

/// Creates a test configuration pointing at the mock server
fn create_test_config(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.api.base_url = format!("{}/api", server.uri());
    config.api.api_key = "test-key".to_string();
    config.api.timeout_secs = 5;
    config.retry.max_attempts = 3;
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 5;
    config.retry.jitter = 0.0;
    config
}

fn client(config: &Config, max_records: u32) -> EtherscanClient {
    EtherscanClient::new(&config.api, RetryPolicy::from(&config.retry), max_records)
        .expect("client should build")
}

fn query(from_block: u64, to_block: u64, page: u32, page_size: u32) -> PageQuery {
    PageQuery {
        address: ADDRESS.to_string(),
        from_block,
        to_block,
        page,
        page_size,
    }
}

fn tx_json(block: u64, index: u64) -> Value {
    json!({
        "blockNumber": block.to_string(),
        "timeStamp": (1_700_000_000 + block).to_string(),
        "hash": format!("0x{:064x}", block * 1_000 + index),
        "transactionIndex": index.to_string(),
        "from": OTHER,
        "to": ADDRESS,
        "value": "1000000000000000000",
        "gas": "21000",
        "gasPrice": "1000000000",
        "gasUsed": "21000",
        "isError": "0",
        "txreceipt_status": "1",
        "contractAddress": ""
    })
}

fn transfer_json(block: u64, log_index: u64) -> Value {
    json!({
        "blockNumber": block.to_string(),
        "timeStamp": (1_700_000_000 + block).to_string(),
        "hash": format!("0x{:064x}", block * 1_000),
        "logIndex": log_index.to_string(),
        "transactionIndex": "0",
        "from": ADDRESS,
        "to": OTHER,
        "value": "2500000",
        "contractAddress": "0x00000000000000000000000000000000000000cc",
        "tokenName": "Test USD",
        "tokenSymbol": "TUSD",
        "tokenDecimal": "6",
        "gasPrice": "1000000000",
        "gasUsed": "50000"
    })
}

fn ok(result: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "status": "1",
        "message": "OK",
        "result": result
    }))
}

fn notok(message: &str, result: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "status": "0",
        "message": message,
        "result": result
    }))
}

fn empty() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "status": "0",
        "message": "No transactions found",
        "result": []
    }))
}

fn rpc(result: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "jsonrpc": "2.0",
        "id": 83,
        "result": result
    }))
}

#[tokio::test]
async fn test_fetch_page_sends_expected_query() {
    let server = MockServer::start().await;
    let config = create_test_config(&server);

    Mock::given(method("GET"))
        .and(path("/api"))
        .and(query_param("module", "account"))
        .and(query_param("action", "txlist"))
        .and(query_param("address", ADDRESS))
        .and(query_param("startblock", "100"))
        .and(query_param("endblock", "200"))
        .and(query_param("page", "1"))
        .and(query_param("offset", "10"))
        .and(query_param("sort", "asc"))
        .and(query_param("chainid", "1"))
        .and(query_param("apikey", "test-key"))
        .respond_with(ok(json!([tx_json(150, 0), tx_json(151, 0)])))
        .expect(1)
        .mount(&server)
        .await;

    let page = client(&config, 10_000)
        .transactions(&query(100, 200, 1, 10))
        .await
        .unwrap();

    assert_eq!(page.status, PageStatus::Exhausted);
    assert_eq!(page.records.len(), 2);
    assert_eq!(page.records[0].block_number, 150);
    assert_eq!(page.records[0].value, "1000000000000000000");
}

#[tokio::test]
async fn test_full_page_at_cap_is_cap_hit() {
    let server = MockServer::start().await;
    let config = create_test_config(&server);

    Mock::given(method("GET"))
        .and(path("/api"))
        .and(query_param("action", "txlist"))
        .respond_with(ok(json!([tx_json(1, 0), tx_json(2, 0), tx_json(3, 0)])))
        .mount(&server)
        .await;

    let api = client(&config, 3);
    let capped = api.transactions(&query(0, 10, 1, 3)).await.unwrap();
    assert_eq!(capped.status, PageStatus::CapHit);

    let api = client(&config, 10_000);
    let more = api.transactions(&query(0, 10, 1, 3)).await.unwrap();
    assert_eq!(more.status, PageStatus::More);
}

#[tokio::test]
async fn test_no_transactions_found_is_empty() {
    let server = MockServer::start().await;
    let config = create_test_config(&server);

    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(empty())
        .expect(1)
        .mount(&server)
        .await;

    let page = client(&config, 10_000)
        .transactions(&query(0, 10, 1, 100))
        .await
        .unwrap();
    assert!(page.records.is_empty());
    assert_eq!(page.status, PageStatus::Exhausted);
}

#[tokio::test]
async fn test_http_429_is_retried() {
    let server = MockServer::start().await;
    let config = create_test_config(&server);

    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(ok(json!([tx_json(5, 0)])))
        .expect(1)
        .mount(&server)
        .await;

    let page = client(&config, 10_000)
        .transactions(&query(0, 10, 1, 100))
        .await
        .unwrap();
    assert_eq!(page.records.len(), 1);
}

#[tokio::test]
async fn test_provider_rate_limit_message_is_retried() {
    let server = MockServer::start().await;
    let config = create_test_config(&server);

    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(notok("NOTOK", "Max calls per sec rate limit reached (5/sec)"))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(ok(json!([tx_json(5, 0)])))
        .mount(&server)
        .await;

    let page = client(&config, 10_000)
        .transactions(&query(0, 10, 1, 100))
        .await
        .unwrap();
    assert_eq!(page.records.len(), 1);
}

#[tokio::test]
async fn test_rate_limit_exhaustion() {
    let server = MockServer::start().await;
    let config = create_test_config(&server);

    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;

    let result = client(&config, 10_000)
        .transactions(&query(0, 10, 1, 100))
        .await;
    assert!(matches!(result, Err(FetchError::RateLimited { attempts: 3 })));
}

#[tokio::test]
async fn test_server_errors_exhaust_as_unexpected() {
    let server = MockServer::start().await;
    let config = create_test_config(&server);

    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let result = client(&config, 10_000)
        .transactions(&query(0, 10, 1, 100))
        .await;
    assert!(matches!(result, Err(FetchError::Unexpected { attempts: 3, .. })));
}

#[tokio::test]
async fn test_notok_is_not_retried() {
    let server = MockServer::start().await;
    let config = create_test_config(&server);

    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(notok("NOTOK", "Invalid API Key"))
        .expect(1)
        .mount(&server)
        .await;

    let result = client(&config, 10_000)
        .transactions(&query(0, 10, 1, 100))
        .await;
    match result {
        Err(FetchError::Api { message }) => assert!(message.contains("Invalid API Key")),
        other => panic!("expected API error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_body_is_not_retried() {
    let server = MockServer::start().await;
    let config = create_test_config(&server);

    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let result = client(&config, 10_000)
        .transactions(&query(0, 10, 1, 100))
        .await;
    assert!(matches!(result, Err(FetchError::InvalidResponse(_))));
}

#[tokio::test]
async fn test_block_lookups() {
    let server = MockServer::start().await;
    let config = create_test_config(&server);

    Mock::given(method("GET"))
        .and(query_param("module", "proxy"))
        .and(query_param("action", "eth_blockNumber"))
        .respond_with(rpc("0x1312d00"))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(query_param("action", "getblocknobytime"))
        .and(query_param("timestamp", "1705276800"))
        .and(query_param("closest", "before"))
        .respond_with(ok(json!("19008989")))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(query_param("action", "balancehistory"))
        .and(query_param("blockno", "19008989"))
        .respond_with(ok(json!("123450000000000000")))
        .mount(&server)
        .await;

    let api = client(&config, 10_000);
    assert_eq!(api.latest_block().await.unwrap(), 20_000_000);
    assert_eq!(api.block_by_timestamp(1_705_276_800).await.unwrap(), 19_008_989);
    assert_eq!(
        api.balance_at_block(ADDRESS, 19_008_989).await.unwrap(),
        "123450000000000000"
    );
}

#[tokio::test]
async fn test_balance_at_date_through_supervisor() {
    let server = MockServer::start().await;
    let config = create_test_config(&server);

    Mock::given(method("GET"))
        .and(query_param("action", "getblocknobytime"))
        .and(query_param("timestamp", "1705276800"))
        .respond_with(ok(json!("19008989")))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(query_param("action", "balancehistory"))
        .and(query_param("address", ADDRESS))
        .respond_with(ok(json!({ "balance": "2000000000000000000" })))
        .expect(1)
        .mount(&server)
        .await;

    let supervisor = JobSupervisor::with_etherscan(&config);
    let balance = supervisor
        .balance_at_date(ADDRESS, "2024-01-15")
        .await
        .unwrap();

    assert_eq!(balance.block_number, 19_008_989);
    assert_eq!(balance.balance_wei, "2000000000000000000");
    assert_eq!(balance.balance_eth(), "2.000000");
}

#[tokio::test]
async fn test_full_crawl_with_tokens() {
    let server = MockServer::start().await;
    let config = create_test_config(&server);

    Mock::given(method("GET"))
        .and(query_param("action", "eth_blockNumber"))
        .respond_with(rpc("0x1f3"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(query_param("action", "txlist"))
        .and(query_param("startblock", "0"))
        .and(query_param("endblock", "499"))
        .and(query_param("page", "1"))
        .respond_with(ok(json!([tx_json(100, 0), tx_json(100, 1), tx_json(300, 0)])))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(query_param("action", "tokentx"))
        .and(query_param("startblock", "0"))
        .and(query_param("endblock", "499"))
        .respond_with(ok(json!([transfer_json(200, 0), transfer_json(200, 1)])))
        .expect(1)
        .mount(&server)
        .await;

    let supervisor = JobSupervisor::with_etherscan(&config);
    let id = supervisor
        .start(JobParams {
            include_tokens: true,
            ..JobParams::new(ADDRESS, 0)
        })
        .unwrap();

    let snapshot = supervisor.wait(&id).await.unwrap();
    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(snapshot.latest_block, Some(499));
    assert_eq!(snapshot.coverage_end, Some(499));
    assert!(snapshot.covered);
    assert_eq!(snapshot.transactions, 3);
    assert_eq!(snapshot.token_transfers, 2);
    assert_eq!(snapshot.pages_processed, 2);

    let results = supervisor.results(&id).unwrap();
    let dir = TempDir::new().unwrap();
    let files = export_results(dir.path(), &snapshot, &results).unwrap();

    let txs = std::fs::read_to_string(&files.transactions).unwrap();
    let lines: Vec<&str> = txs.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], "time,block,direction,from,to,value,fee,hash");
    assert!(lines[1].contains(",100,IN,"));
    assert!(lines[1].contains(",1.000000,0.000021,"));
    assert!(files
        .transactions
        .file_name()
        .unwrap()
        .to_string_lossy()
        .ends_with("_0_to_latest.csv"));

    let tokens = std::fs::read_to_string(files.token_transfers.unwrap()).unwrap();
    let lines: Vec<&str> = tokens.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[1].contains(",200,OUT,TUSD,Test USD,2.500000,"));
}

#[tokio::test]
async fn test_crawl_splits_capped_segment() {
    let server = MockServer::start().await;
    let mut config = create_test_config(&server);
    config.crawl.max_records_per_query = 2;

    Mock::given(method("GET"))
        .and(query_param("action", "eth_blockNumber"))
        .respond_with(rpc("0x1f3"))
        .mount(&server)
        .await;

    // Whole range: a full page at the cap
    Mock::given(method("GET"))
        .and(query_param("action", "txlist"))
        .and(query_param("startblock", "0"))
        .and(query_param("endblock", "499"))
        .respond_with(ok(json!([tx_json(100, 0), tx_json(300, 0)])))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(query_param("action", "txlist"))
        .and(query_param("startblock", "0"))
        .and(query_param("endblock", "249"))
        .respond_with(ok(json!([tx_json(100, 0)])))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(query_param("action", "txlist"))
        .and(query_param("startblock", "250"))
        .and(query_param("endblock", "499"))
        .respond_with(ok(json!([tx_json(300, 0)])))
        .expect(1)
        .mount(&server)
        .await;

    let supervisor = JobSupervisor::with_etherscan(&config);
    let id = supervisor
        .start(JobParams {
            page_size: Some(2),
            ..JobParams::new(ADDRESS, 0)
        })
        .unwrap();

    let snapshot = supervisor.wait(&id).await.unwrap();
    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(snapshot.total_unique, 2);
    assert_eq!(snapshot.coverage_end, Some(499));
    assert_eq!(snapshot.pages_processed, 3);
}

/// Serves `per_block` transactions for every block up to `last_block` and
/// rejects pages past the provider's result window, like Etherscan does
struct WindowedTxList {
    per_block: u64,
    last_block: u64,
    max_records: u64,
}

impl Respond for WindowedTxList {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let param = |name: &str| -> u64 {
            request
                .url
                .query_pairs()
                .find(|(key, _)| key == name)
                .and_then(|(_, value)| value.parse().ok())
                .unwrap_or(0)
        };
        let (start, end) = (param("startblock"), param("endblock").min(self.last_block));
        let (page, offset) = (param("page"), param("offset"));

        if page * offset > self.max_records {
            return notok(
                "NOTOK",
                "Result window is too large, PageNo x Offset size must be less than or equal to 10000",
            );
        }

        let records: Vec<Value> = (start..=end)
            .flat_map(|block| (0..self.per_block).map(move |index| tx_json(block, index)))
            .skip(((page - 1) * offset) as usize)
            .take(offset as usize)
            .collect();
        if records.is_empty() {
            empty()
        } else {
            ok(Value::Array(records))
        }
    }
}

#[tokio::test]
async fn test_page_size_not_dividing_cap_splits_instead_of_failing() {
    let server = MockServer::start().await;
    let mut config = create_test_config(&server);
    config.crawl.max_records_per_query = 10;

    Mock::given(method("GET"))
        .and(query_param("action", "eth_blockNumber"))
        .respond_with(rpc("0x13"))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(query_param("action", "txlist"))
        .respond_with(WindowedTxList {
            per_block: 2,
            last_block: 19,
            max_records: 10,
        })
        .mount(&server)
        .await;

    let supervisor = JobSupervisor::with_etherscan(&config);
    let id = supervisor
        .start(JobParams {
            page_size: Some(3),
            ..JobParams::new(ADDRESS, 0)
        })
        .unwrap();

    let snapshot = supervisor.wait(&id).await.unwrap();
    assert_eq!(snapshot.status, JobStatus::Completed, "error: {:?}", snapshot.error);
    assert_eq!(snapshot.total_unique, 40);
    assert_eq!(snapshot.coverage_end, Some(19));
    assert!(snapshot.truncated_blocks.is_empty());

    // No request ever asked for a page past the window
    for request in server.received_requests().await.unwrap_or_default() {
        let pairs: Vec<(String, String)> = request.url.query_pairs().into_owned().collect();
        let get = |name: &str| {
            pairs
                .iter()
                .find(|(key, _)| key == name)
                .and_then(|(_, value)| value.parse::<u64>().ok())
        };
        if let (Some(page), Some(offset)) = (get("page"), get("offset")) {
            assert!(page * offset <= 10, "page {} x offset {} requested", page, offset);
        }
    }
}

#[tokio::test]
async fn test_hard_error_fails_job() {
    let server = MockServer::start().await;
    let config = create_test_config(&server);

    Mock::given(method("GET"))
        .and(query_param("action", "eth_blockNumber"))
        .respond_with(rpc("0x1f3"))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(query_param("action", "txlist"))
        .respond_with(notok("NOTOK", "Invalid API Key"))
        .expect(1)
        .mount(&server)
        .await;

    let supervisor = JobSupervisor::with_etherscan(&config);
    let id = supervisor.start(JobParams::new(ADDRESS, 0)).unwrap();

    let snapshot = supervisor.wait(&id).await.unwrap();
    assert_eq!(snapshot.status, JobStatus::Failed);
    assert!(snapshot.error.unwrap().contains("Invalid API Key"));
    assert!(supervisor.resume(&id).await.is_err());
}
