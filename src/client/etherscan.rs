//! reqwest-backed client for Etherscan-compatible APIs
//!
//! Every request goes through [`EtherscanClient::request`], which owns the
//! retry loop: rate limits, timeouts and transient server failures are retried
//! with jittered exponential backoff, anything else is returned immediately.

use crate::client::response::{classify_status, interpret, ApiReply, Failure};
use crate::client::retry::{RetryDecision, RetryPolicy};
use crate::client::{ChainApi, Page, PageQuery, PageStatus};
use crate::config::{ApiConfig, Config};
use crate::model::{parse_u64, Record, TokenTransfer, Transaction};
use crate::{FetchError, FetchResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Builds the HTTP client shared by every request of one API client
pub fn build_http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    let user_agent = format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Client for one Etherscan-compatible endpoint
#[derive(Debug, Clone)]
pub struct EtherscanClient {
    http: Client,
    base_url: Url,
    api_key: String,
    chain_id: u64,
    retry: RetryPolicy,
    max_records: u32,
}

impl EtherscanClient {
    pub fn new(api: &ApiConfig, retry: RetryPolicy, max_records: u32) -> FetchResult<Self> {
        let base_url = Url::parse(&api.base_url)
            .map_err(|e| FetchError::InvalidEndpoint(format!("{}: {}", api.base_url, e)))?;
        let http = build_http_client(Duration::from_secs(api.timeout_secs))?;

        Ok(Self {
            http,
            base_url,
            api_key: api.resolved_api_key(),
            chain_id: api.chain_id,
            retry,
            max_records,
        })
    }

    /// Builds a client from the full configuration
    pub fn from_config(config: &Config) -> FetchResult<Self> {
        Self::new(
            &config.api,
            RetryPolicy::from(&config.retry),
            config.crawl.max_records_per_query,
        )
    }

    pub fn max_records(&self) -> u32 {
        self.max_records
    }

    /// Sends one logical request, retrying recoverable failures
    async fn request(&self, params: &[(&str, String)]) -> FetchResult<ApiReply> {
        let action = params
            .iter()
            .find(|(k, _)| *k == "action")
            .map(|(_, v)| v.as_str())
            .unwrap_or("?");
        let mut attempt = 0;

        loop {
            attempt += 1;
            let failure = match self.attempt(params).await {
                Ok(reply) => return Ok(reply),
                Err(failure) => failure,
            };

            match self.retry.decide(attempt, failure.kind()) {
                RetryDecision::Retry { delay } => {
                    let delay = self.retry.jittered(delay, &mut rand::thread_rng());
                    warn!(
                        action,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Request failed ({}), retrying",
                        failure.message()
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp => {
                    debug!(action, attempt, "Giving up: {}", failure.message());
                    return Err(failure.into_error(attempt));
                }
            }
        }
    }

    async fn attempt(&self, params: &[(&str, String)]) -> Result<ApiReply, Failure> {
        let mut query: Vec<(&str, String)> = Vec::with_capacity(params.len() + 2);
        query.push(("chainid", self.chain_id.to_string()));
        query.extend(params.iter().cloned());
        if !self.api_key.is_empty() {
            query.push(("apikey", self.api_key.clone()));
        }

        let response = self
            .http
            .get(self.base_url.clone())
            .query(&query)
            .send()
            .await
            .map_err(transport_failure)?;

        classify_status(response.status())?;

        let body = response.text().await.map_err(transport_failure)?;
        interpret(&body)
    }

    async fn list<R>(&self, query: &PageQuery) -> FetchResult<Page<R>>
    where
        R: Record + DeserializeOwned,
    {
        let params = [
            ("module", "account".to_string()),
            ("action", R::KIND.action().to_string()),
            ("address", query.address.clone()),
            ("startblock", query.from_block.to_string()),
            ("endblock", query.to_block.to_string()),
            ("page", query.page.to_string()),
            ("offset", query.page_size.to_string()),
            ("sort", "asc".to_string()),
        ];

        let records: Vec<R> = match self.request(&params).await? {
            ApiReply::Empty => Vec::new(),
            ApiReply::Data(value @ Value::Array(_)) => serde_json::from_value(value)
                .map_err(|e| FetchError::InvalidResponse(format!("{} record: {}", R::KIND, e)))?,
            ApiReply::Data(other) => {
                return Err(FetchError::InvalidResponse(format!(
                    "expected a list from {}, got {}",
                    R::KIND,
                    other
                )))
            }
        };

        let status = PageStatus::classify(records.len(), query.page, query.page_size, self.max_records);
        debug!(
            kind = %R::KIND,
            from = query.from_block,
            to = query.to_block,
            page = query.page,
            count = records.len(),
            ?status,
            "Fetched page"
        );

        Ok(Page::new(records, status))
    }
}

#[async_trait]
impl ChainApi for EtherscanClient {
    async fn transactions(&self, query: &PageQuery) -> FetchResult<Page<Transaction>> {
        self.list(query).await
    }

    async fn token_transfers(&self, query: &PageQuery) -> FetchResult<Page<TokenTransfer>> {
        self.list(query).await
    }

    async fn latest_block(&self) -> FetchResult<u64> {
        let params = [
            ("module", "proxy".to_string()),
            ("action", "eth_blockNumber".to_string()),
        ];
        match self.request(&params).await? {
            ApiReply::Data(value) => number_from(&value),
            ApiReply::Empty => Err(FetchError::InvalidResponse(
                "empty eth_blockNumber result".to_string(),
            )),
        }
    }

    async fn block_by_timestamp(&self, timestamp: i64) -> FetchResult<u64> {
        let params = [
            ("module", "block".to_string()),
            ("action", "getblocknobytime".to_string()),
            ("timestamp", timestamp.to_string()),
            ("closest", "before".to_string()),
        ];
        match self.request(&params).await {
            Ok(ApiReply::Data(value)) => number_from(&value),
            Ok(ApiReply::Empty) => Ok(0),
            // The provider reports "no closest block" as an error
            Err(FetchError::Api { message }) if message.to_lowercase().contains("no closest block") => {
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }

    async fn balance_at_block(&self, address: &str, block: u64) -> FetchResult<String> {
        let params = [
            ("module", "account".to_string()),
            ("action", "balancehistory".to_string()),
            ("address", address.to_string()),
            ("blockno", block.to_string()),
        ];
        match self.request(&params).await? {
            ApiReply::Data(Value::String(balance)) => Ok(balance),
            ApiReply::Data(Value::Number(balance)) => Ok(balance.to_string()),
            ApiReply::Data(Value::Object(map)) => match map.get("balance") {
                Some(Value::String(balance)) => Ok(balance.clone()),
                Some(Value::Number(balance)) => Ok(balance.to_string()),
                _ => Err(FetchError::InvalidResponse(
                    "balancehistory result has no balance".to_string(),
                )),
            },
            ApiReply::Data(other) => Err(FetchError::InvalidResponse(format!(
                "unexpected balancehistory result: {}",
                other
            ))),
            ApiReply::Empty => Ok("0".to_string()),
        }
    }
}

fn transport_failure(error: reqwest::Error) -> Failure {
    if error.is_timeout() {
        Failure::Timeout(error.to_string())
    } else if error.is_builder() {
        Failure::Hard(error.to_string())
    } else {
        Failure::Transient(error.to_string())
    }
}

fn number_from(value: &Value) -> FetchResult<u64> {
    match value {
        Value::String(s) => parse_u64(s).map_err(FetchError::InvalidResponse),
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| FetchError::InvalidResponse(format!("invalid block number {}", n))),
        other => Err(FetchError::InvalidResponse(format!(
            "expected a block number, got {}",
            other
        ))),
    }
}
