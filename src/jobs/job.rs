//! Job records owned by the supervisor
//!
//! A [`Job`] holds everything one crawl produces: lifecycle status, the
//! coverage tracker with both unique sets, and progress counters. It is shared
//! between its runner (writer) and status/export queries (readers) behind a
//! `RwLock`.

use crate::crawler::{CoverageTracker, Segment};
use crate::model::{TokenTransfer, Transaction};
use crate::state::JobStatus;
use crate::{JobError, JobResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use tracing::info;

/// Length of generated job ids
const JOB_ID_LEN: usize = 12;

/// Parameters for starting a crawl, as supplied by the caller
#[derive(Debug, Clone, Default)]
pub struct JobParams {
    /// Explicit id; a random one is generated when absent
    pub id: Option<String>,
    pub address: String,
    pub start_block: u64,
    pub include_tokens: bool,
    /// Records per page; the configured default when absent
    pub page_size: Option<u32>,
    /// Page budget for one run of the job
    pub max_pages: Option<u64>,
}

/// Validated, normalized job parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSpec {
    pub id: String,
    /// Lowercase `0x` address
    pub address: String,
    pub start_block: u64,
    pub include_tokens: bool,
    pub page_size: u32,
    pub max_pages: Option<u64>,
}

impl JobParams {
    pub fn new(address: impl Into<String>, start_block: u64) -> Self {
        Self {
            address: address.into(),
            start_block,
            ..Self::default()
        }
    }

    /// Validates the parameters and fills in defaults
    ///
    /// The page size is clamped to `1..=max_records`.
    pub fn resolve(self, default_page_size: u32, max_records: u32) -> JobResult<JobSpec> {
        let address = normalize_address(&self.address)
            .ok_or_else(|| JobError::InvalidParams(format!("invalid address '{}'", self.address)))?;

        if self.max_pages == Some(0) {
            return Err(JobError::InvalidParams("max_pages must be >= 1".to_string()));
        }

        let id = match self.id {
            Some(id) if id.trim().is_empty() => {
                return Err(JobError::InvalidParams("job id must not be empty".to_string()))
            }
            Some(id) => id,
            None => generate_job_id(),
        };

        let page_size = self
            .page_size
            .unwrap_or(default_page_size)
            .clamp(1, max_records.max(1));

        Ok(JobSpec {
            id,
            address,
            start_block: self.start_block,
            include_tokens: self.include_tokens,
            page_size,
            max_pages: self.max_pages,
        })
    }
}

/// Returns the lowercase address if it is `0x` followed by 40 hex digits
pub fn normalize_address(address: &str) -> Option<String> {
    let address = address.trim();
    let hex = address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))?;
    if hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(format!("0x{}", hex.to_lowercase()))
    } else {
        None
    }
}

fn generate_job_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..JOB_ID_LEN].to_string()
}

/// Inclusive block range shown in status output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockSpan {
    pub from: u64,
    pub to: u64,
}

impl From<&Segment> for BlockSpan {
    fn from(segment: &Segment) -> Self {
        Self {
            from: segment.from,
            to: segment.to,
        }
    }
}

/// One entry of the segment-progress log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentRecord {
    pub from: u64,
    pub to: u64,
    pub pages: u64,
    /// New unique transactions found in the segment
    pub transactions: usize,
    /// New unique token transfers found in the segment
    pub token_transfers: usize,
    pub truncated: bool,
}

/// In-memory state of one crawl job
#[derive(Debug)]
pub struct Job {
    pub spec: JobSpec,
    pub status: JobStatus,
    pub tracker: CoverageTracker,
    /// Last known planner window, carried across resumes
    pub window: Option<u64>,
    pub error: Option<String>,
    pub pages_processed: u64,
    pub segments_done: u64,
    pub current_segment: Option<BlockSpan>,
    pub stop_requested: bool,
    pub limit_reached: bool,
    /// Reason the job was flagged as high activity
    pub high_activity: Option<String>,
    /// Single blocks that still hit the cap; their data may be partial
    pub truncated_blocks: Vec<u64>,
    pub segment_log: VecDeque<SegmentRecord>,
    segment_log_size: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(spec: JobSpec, segment_log_size: usize) -> Self {
        let now = Utc::now();
        Self {
            tracker: CoverageTracker::new(spec.start_block),
            spec,
            status: JobStatus::Idle,
            window: None,
            error: None,
            pages_processed: 0,
            segments_done: 0,
            current_segment: None,
            stop_requested: false,
            limit_reached: false,
            high_activity: None,
            truncated_blocks: Vec::new(),
            segment_log: VecDeque::with_capacity(segment_log_size),
            segment_log_size,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> &str {
        &self.spec.id
    }

    /// Moves to `next`, rejecting transitions the lifecycle does not allow
    pub fn transition(&mut self, next: JobStatus) -> JobResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(JobError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        info!(job_id = %self.spec.id, from = %self.status, to = %next, "Job status changed");
        self.status = next;
        self.touch();
        Ok(())
    }

    /// Records a hard failure; partial results stay available
    pub fn fail(&mut self, message: String) {
        self.error = Some(message);
        self.current_segment = None;
        if let Err(e) = self.transition(JobStatus::Failed) {
            tracing::warn!(job_id = %self.spec.id, "Could not mark job failed: {}", e);
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Appends to the segment log, dropping the oldest entry when full
    pub fn record_segment(&mut self, record: SegmentRecord) {
        if self.segment_log_size == 0 {
            return;
        }
        while self.segment_log.len() >= self.segment_log_size {
            self.segment_log.pop_front();
        }
        self.segment_log.push_back(record);
    }

    /// Sets the high-activity flag the first time a threshold is crossed
    pub fn check_high_activity(&mut self, window: u64, window_threshold: u64, segment_threshold: u64) {
        if self.high_activity.is_some() {
            return;
        }
        let reason = if window <= window_threshold {
            format!("window reduced to {} blocks by the record cap", window)
        } else if self.segments_done >= segment_threshold {
            format!("segments exceeded {} (currently {})", segment_threshold, self.segments_done)
        } else {
            return;
        };
        tracing::warn!(job_id = %self.spec.id, "High activity address: {}", reason);
        self.high_activity = Some(reason);
    }

    pub fn snapshot(&self) -> JobSnapshot {
        let coverage = self.tracker.snapshot();
        let transactions = self.tracker.transactions().len();
        let token_transfers = self.tracker.token_transfers().len();

        JobSnapshot {
            id: self.spec.id.clone(),
            address: self.spec.address.clone(),
            status: self.status,
            start_block: coverage.start_block,
            coverage_end: coverage.coverage_end,
            latest_block: coverage.latest_block,
            covered: coverage.covered,
            total_unique: coverage.total_unique,
            transactions,
            token_transfers,
            include_tokens: self.spec.include_tokens,
            page_size: self.spec.page_size,
            max_pages: self.spec.max_pages,
            pages_processed: self.pages_processed,
            segments_done: self.segments_done,
            window: self.window,
            current_segment: self.current_segment,
            stop_requested: self.stop_requested,
            limit_reached: self.limit_reached,
            high_activity: self.high_activity.clone(),
            truncated_blocks: self.truncated_blocks.clone(),
            segments_tail: self.segment_log.iter().cloned().collect(),
            error: self.error.clone(),
            has_partial: coverage.total_unique > 0 && !coverage.covered,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub fn results(&self) -> JobResults {
        JobResults {
            transactions: self.tracker.transactions().sorted(),
            token_transfers: self.tracker.token_transfers().sorted(),
        }
    }
}

/// Point-in-time view of a job for status queries
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub id: String,
    pub address: String,
    pub status: JobStatus,
    pub start_block: u64,
    pub coverage_end: Option<u64>,
    pub latest_block: Option<u64>,
    pub covered: bool,
    pub total_unique: usize,
    pub transactions: usize,
    pub token_transfers: usize,
    pub include_tokens: bool,
    pub page_size: u32,
    pub max_pages: Option<u64>,
    pub pages_processed: u64,
    pub segments_done: u64,
    pub window: Option<u64>,
    pub current_segment: Option<BlockSpan>,
    pub stop_requested: bool,
    pub limit_reached: bool,
    pub high_activity: Option<String>,
    pub truncated_blocks: Vec<u64>,
    pub segments_tail: Vec<SegmentRecord>,
    pub error: Option<String>,
    /// Some records are available but coverage is incomplete
    pub has_partial: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Deduplicated results, sorted by block then in-block position
#[derive(Debug, Clone, Default)]
pub struct JobResults {
    pub transactions: Vec<Transaction>,
    pub token_transfers: Vec<TokenTransfer>,
}
