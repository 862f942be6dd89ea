//! Deduplication and coverage tracking
//!
//! Records are kept in one unique set per kind, keyed by identity. Coverage
//! only advances when the runner reports a segment as fully fetched.

use crate::crawler::planner::Segment;
use crate::model::{sort_records, Record, TokenTransfer, Transaction};
use crate::state::{CoverageSnapshot, CoverageState};
use std::collections::HashMap;
use tracing::debug;

/// Records of one kind, deduplicated by [`Record::key`]
#[derive(Debug, Clone)]
pub struct UniqueSet<R: Record> {
    records: HashMap<R::Key, R>,
}

impl<R: Record> Default for UniqueSet<R> {
    fn default() -> Self {
        Self {
            records: HashMap::new(),
        }
    }
}

impl<R: Record> UniqueSet<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts unseen records and returns how many were new
    pub fn ingest<I>(&mut self, records: I) -> usize
    where
        I: IntoIterator<Item = R>,
    {
        let mut inserted = 0;
        for record in records {
            if let std::collections::hash_map::Entry::Vacant(entry) = self.records.entry(record.key()) {
                entry.insert(record);
                inserted += 1;
            }
        }
        inserted
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, key: &R::Key) -> bool {
        self.records.contains_key(key)
    }

    /// Copies out every record, sorted by block then in-block position
    pub fn sorted(&self) -> Vec<R> {
        let mut records: Vec<R> = self.records.values().cloned().collect();
        sort_records(&mut records);
        records
    }
}

/// Selects the unique set that holds a record kind
pub trait Tracked: Record {
    fn set(tracker: &CoverageTracker) -> &UniqueSet<Self>;
    fn set_mut(tracker: &mut CoverageTracker) -> &mut UniqueSet<Self>;
}

impl Tracked for Transaction {
    fn set(tracker: &CoverageTracker) -> &UniqueSet<Self> {
        &tracker.transactions
    }

    fn set_mut(tracker: &mut CoverageTracker) -> &mut UniqueSet<Self> {
        &mut tracker.transactions
    }
}

impl Tracked for TokenTransfer {
    fn set(tracker: &CoverageTracker) -> &UniqueSet<Self> {
        &tracker.token_transfers
    }

    fn set_mut(tracker: &mut CoverageTracker) -> &mut UniqueSet<Self> {
        &mut tracker.token_transfers
    }
}

/// Unique result sets plus the coverage proof for one job
#[derive(Debug, Clone)]
pub struct CoverageTracker {
    coverage: CoverageState,
    transactions: UniqueSet<Transaction>,
    token_transfers: UniqueSet<TokenTransfer>,
}

impl CoverageTracker {
    pub fn new(start_block: u64) -> Self {
        Self {
            coverage: CoverageState::new(start_block),
            transactions: UniqueSet::new(),
            token_transfers: UniqueSet::new(),
        }
    }

    /// Adds one page of records fetched for `segment`
    ///
    /// Records outside `[segment.from, segment.to]` are dropped so that
    /// coverage only ever vouches for the blocks it names.
    pub fn ingest<R: Tracked>(&mut self, records: Vec<R>, segment: &Segment) -> usize {
        let fetched = records.len();
        let in_range: Vec<R> = records
            .into_iter()
            .filter(|r| (segment.from..=segment.to).contains(&r.block_number()))
            .collect();
        if in_range.len() < fetched {
            debug!(
                from = segment.from,
                to = segment.to,
                dropped = fetched - in_range.len(),
                "Dropped records outside the segment"
            );
        }
        R::set_mut(self).ingest(in_range)
    }

    /// Marks `segment` as fully fetched; returns false if coverage did not move
    pub fn complete_segment(&mut self, segment: &Segment) -> bool {
        self.coverage.advance_to(segment.to)
    }

    pub fn coverage(&self) -> &CoverageState {
        &self.coverage
    }

    pub fn set_latest_block(&mut self, latest_block: u64) -> u64 {
        self.coverage.set_latest_block(latest_block)
    }

    pub fn records<R: Tracked>(&self) -> &UniqueSet<R> {
        R::set(self)
    }

    pub fn transactions(&self) -> &UniqueSet<Transaction> {
        &self.transactions
    }

    pub fn token_transfers(&self) -> &UniqueSet<TokenTransfer> {
        &self.token_transfers
    }

    /// Distinct transactions plus distinct token transfers
    pub fn total_unique(&self) -> usize {
        self.transactions.len() + self.token_transfers.len()
    }

    pub fn snapshot(&self) -> CoverageSnapshot {
        self.coverage.snapshot(self.total_unique())
    }
}
