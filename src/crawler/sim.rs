//! In-memory chain API used by runner and supervisor tests

use crate::client::{ChainApi, Page, PageQuery, PageStatus};
use crate::model::{Record, TokenTransfer, Transaction, TxKind};
use crate::{FetchError, FetchResult};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

pub fn tx(block: u64, index: u64) -> Transaction {
    Transaction {
        hash: format!("0x{:064x}", block * 1_000 + index),
        block_number: block,
        timestamp: 1_600_000_000 + block,
        transaction_index: index,
        from: "0x00000000000000000000000000000000000000aa".to_string(),
        to: "0x00000000000000000000000000000000000000bb".to_string(),
        value: "1000000000000000000".to_string(),
        gas_price: "1000000000".to_string(),
        gas_used: "21000".to_string(),
        ..Transaction::default()
    }
}

pub fn transfer(block: u64, log_index: u64) -> TokenTransfer {
    TokenTransfer {
        hash: format!("0x{:064x}", block * 1_000),
        block_number: block,
        timestamp: 1_600_000_000 + block,
        log_index: Some(log_index),
        from: "0x00000000000000000000000000000000000000bb".to_string(),
        to: "0x00000000000000000000000000000000000000aa".to_string(),
        value: "5000000".to_string(),
        contract_address: "0x00000000000000000000000000000000000000cc".to_string(),
        token_name: "Test Token".to_string(),
        token_symbol: "TT".to_string(),
        token_decimals: "6".to_string(),
        ..TokenTransfer::default()
    }
}

/// A provider holding a fixed record set and enforcing a record cap
pub struct SimApi {
    pub latest: u64,
    pub max_records: u32,
    transactions: Vec<Transaction>,
    transfers: Vec<TokenTransfer>,
    queries: Mutex<Vec<(TxKind, PageQuery)>>,
    pages_served: AtomicUsize,
    cancel_after: Mutex<Option<(usize, CancellationToken)>>,
    fail_after: Option<usize>,
    gate: Option<Arc<Semaphore>>,
}

impl SimApi {
    pub fn new(latest: u64, mut transactions: Vec<Transaction>) -> Self {
        transactions.sort_by_key(|t| (t.block_number, t.transaction_index));
        Self {
            latest,
            max_records: 10_000,
            transactions,
            transfers: Vec::new(),
            queries: Mutex::new(Vec::new()),
            pages_served: AtomicUsize::new(0),
            cancel_after: Mutex::new(None),
            fail_after: None,
            gate: None,
        }
    }

    pub fn with_transfers(mut self, mut transfers: Vec<TokenTransfer>) -> Self {
        transfers.sort_by_key(|t| (t.block_number, t.position()));
        self.transfers = transfers;
        self
    }

    pub fn with_max_records(mut self, max_records: u32) -> Self {
        self.max_records = max_records;
        self
    }

    /// Cancels `token` once `pages` pages have been served
    pub fn cancel_after(self, pages: usize, token: CancellationToken) -> Self {
        *self.cancel_after.lock().unwrap() = Some((pages, token));
        self
    }

    /// Answers every page after the first `pages` with a hard API error
    pub fn fail_after(mut self, pages: usize) -> Self {
        self.fail_after = Some(pages);
        self
    }

    /// Every page waits for a permit from `gate`
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn queries(&self) -> Vec<(TxKind, PageQuery)> {
        self.queries.lock().unwrap().clone()
    }

    pub fn clear_queries(&self) {
        self.queries.lock().unwrap().clear();
    }

    pub fn pages_served(&self) -> usize {
        self.pages_served.load(Ordering::SeqCst)
    }

    async fn serve<R: Record>(&self, records: &[R], query: &PageQuery) -> FetchResult<Page<R>> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        self.queries
            .lock()
            .unwrap()
            .push((R::KIND, query.clone()));

        let served = self.pages_served.load(Ordering::SeqCst);
        if self.fail_after.is_some_and(|n| served >= n) {
            return Err(FetchError::Api {
                message: "NOTOK: simulated failure".to_string(),
            });
        }

        if u64::from(query.page) * u64::from(query.page_size) > u64::from(self.max_records) {
            return Err(FetchError::Api {
                message: "NOTOK: Result window is too large".to_string(),
            });
        }
        let skip = (query.page as usize - 1) * query.page_size as usize;
        let page: Vec<R> = records
            .iter()
            .filter(|r| (query.from_block..=query.to_block).contains(&r.block_number()))
            .skip(skip)
            .take(query.page_size as usize)
            .cloned()
            .collect();

        let served = self.pages_served.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((after, token)) = self.cancel_after.lock().unwrap().as_ref() {
            if served >= *after {
                token.cancel();
            }
        }

        let status = PageStatus::classify(page.len(), query.page, query.page_size, self.max_records);
        Ok(Page::new(page, status))
    }
}

#[async_trait]
impl ChainApi for SimApi {
    async fn transactions(&self, query: &PageQuery) -> FetchResult<Page<Transaction>> {
        self.serve(&self.transactions, query).await
    }

    async fn token_transfers(&self, query: &PageQuery) -> FetchResult<Page<TokenTransfer>> {
        self.serve(&self.transfers, query).await
    }

    async fn latest_block(&self) -> FetchResult<u64> {
        Ok(self.latest)
    }

    async fn block_by_timestamp(&self, timestamp: i64) -> FetchResult<u64> {
        Ok(timestamp.max(0) as u64 / 12)
    }

    async fn balance_at_block(&self, _address: &str, block: u64) -> FetchResult<String> {
        Ok((block * 1_000).to_string())
    }
}
