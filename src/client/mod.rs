//! Fetch client for the account-indexing API
//!
//! This module contains everything that talks to the remote provider:
//! - The [`ChainApi`] seam the crawler depends on
//! - Page queries and cap-hit classification
//! - Response envelope interpretation
//! - Retry/backoff policy
//! - The reqwest-backed [`EtherscanClient`]

mod etherscan;
mod response;
mod retry;

pub use etherscan::{build_http_client, EtherscanClient};
pub use response::{classify_status, interpret, ApiReply, Failure};
pub use retry::{FailureKind, RetryDecision, RetryPolicy};

use crate::model::{Record, TokenTransfer, Transaction};
use crate::FetchResult;
use async_trait::async_trait;

/// One page request against a block range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub address: String,
    pub from_block: u64,
    pub to_block: u64,
    /// 1-based page number
    pub page: u32,
    pub page_size: u32,
}

/// What a page says about the rest of its query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStatus {
    /// Full page; the next page may hold more
    More,
    /// Short page; the query is exhausted
    Exhausted,
    /// Full page at the provider's record ceiling; later pages are unreachable
    CapHit,
}

impl PageStatus {
    /// Classifies a page from its size and position
    ///
    /// A full page is at the cap when the next page is out of reach: the
    /// provider rejects any request with `page * page_size > max_records`.
    pub fn classify(len: usize, page: u32, page_size: u32, max_records: u32) -> Self {
        if page_size == 0 || len < page_size as usize {
            return Self::Exhausted;
        }
        let next_end = (u64::from(page) + 1) * u64::from(page_size);
        if next_end > u64::from(max_records) {
            Self::CapHit
        } else {
            Self::More
        }
    }
}

/// A page of records and its classification
#[derive(Debug, Clone)]
pub struct Page<R> {
    pub records: Vec<R>,
    pub status: PageStatus,
}

impl<R> Page<R> {
    pub fn new(records: Vec<R>, status: PageStatus) -> Self {
        Self { records, status }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), PageStatus::Exhausted)
    }
}

/// Operations the crawler needs from the provider
///
/// Implementations retry rate limits and transient failures internally; an
/// error returned here is final for the current attempt.
#[async_trait]
pub trait ChainApi: Send + Sync {
    async fn transactions(&self, query: &PageQuery) -> FetchResult<Page<Transaction>>;

    async fn token_transfers(&self, query: &PageQuery) -> FetchResult<Page<TokenTransfer>>;

    /// Current chain head
    async fn latest_block(&self) -> FetchResult<u64>;

    /// Last block at or before `timestamp`; `0` when none exists
    async fn block_by_timestamp(&self, timestamp: i64) -> FetchResult<u64>;

    /// Native balance of `address` at `block`, in wei
    async fn balance_at_block(&self, address: &str, block: u64) -> FetchResult<String>;
}

/// Dispatches a page request to the listing that produces `Self`
#[async_trait]
pub trait PagedRecord: Record + Sized {
    async fn fetch_page(api: &dyn ChainApi, query: &PageQuery) -> FetchResult<Page<Self>>;
}

#[async_trait]
impl PagedRecord for Transaction {
    async fn fetch_page(api: &dyn ChainApi, query: &PageQuery) -> FetchResult<Page<Self>> {
        api.transactions(query).await
    }
}

#[async_trait]
impl PagedRecord for TokenTransfer {
    async fn fetch_page(api: &dyn ChainApi, query: &PageQuery) -> FetchResult<Page<Self>> {
        api.token_transfers(query).await
    }
}
