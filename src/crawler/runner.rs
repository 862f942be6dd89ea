//! Crawl runner
//!
//! One runner drives the planner, the fetch client and the tracker for a
//! single job until the frozen latest block is covered, a stop is requested,
//! the page budget runs out, or a hard error occurs.
//!
//! The job lock is only ever held for the synchronous mutation that follows an
//! await, never across one.

use crate::client::{ChainApi, PageQuery, PageStatus, PagedRecord};
use crate::config::CrawlConfig;
use crate::crawler::planner::{CapResponse, PlannerSettings, Segment, SegmentPlanner};
use crate::crawler::tracker::Tracked;
use crate::jobs::{BlockSpan, Job, JobSpec, SegmentRecord};
use crate::model::{TokenTransfer, Transaction, TxKind};
use crate::state::JobStatus;
use crate::FetchResult;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Runner tuning taken from the crawl configuration
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub planner: PlannerSettings,
    pub high_activity_window: u64,
    pub high_activity_segments: u64,
}

impl From<&CrawlConfig> for RunnerSettings {
    fn from(config: &CrawlConfig) -> Self {
        Self {
            planner: PlannerSettings::from(config),
            high_activity_window: config.high_activity_window,
            high_activity_segments: config.high_activity_segments,
        }
    }
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self::from(&CrawlConfig::default())
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// Stopped cooperatively; `limit_reached` is set when the page budget ran out
    Paused { limit_reached: bool },
    Failed(String),
}

/// Why paging stopped early
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    Cancelled,
    PageLimit,
}

/// Result of paging through one record kind for one segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Paging {
    Exhausted,
    CapHit,
    Interrupted(Interrupt),
}

/// Per-segment counters for the progress log
#[derive(Debug, Default)]
struct SegmentTally {
    pages: u64,
    transactions: usize,
    token_transfers: usize,
}

/// Drives one job from its current coverage to the latest block
pub struct CrawlRunner {
    api: Arc<dyn ChainApi>,
    job: Arc<RwLock<Job>>,
    settings: RunnerSettings,
    cancel: CancellationToken,
    pages_this_run: u64,
}

impl CrawlRunner {
    /// The job must already be `Running`
    pub fn new(
        api: Arc<dyn ChainApi>,
        job: Arc<RwLock<Job>>,
        settings: RunnerSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            api,
            job,
            settings,
            cancel,
            pages_this_run: 0,
        }
    }

    /// Runs to completion, pause or failure and records the outcome on the job
    pub async fn run(mut self) -> RunOutcome {
        match self.crawl().await {
            Ok(outcome) => outcome,
            Err(e) => {
                let message = e.to_string();
                let mut job = self.lock();
                error!(job_id = %job.id(), "Crawl failed: {}", message);
                job.fail(message.clone());
                RunOutcome::Failed(message)
            }
        }
    }

    fn lock(&self) -> RwLockWriteGuard<'_, Job> {
        self.job.write().unwrap_or_else(PoisonError::into_inner)
    }

    async fn crawl(&mut self) -> FetchResult<RunOutcome> {
        let (spec, cursor, latest, window) = {
            let job = self.lock();
            let coverage = job.tracker.coverage();
            (
                job.spec.clone(),
                coverage.next_block(),
                coverage.latest_block(),
                job.window,
            )
        };

        let latest = match latest {
            Some(latest) => latest,
            None => {
                let head = self.api.latest_block().await?;
                let mut job = self.lock();
                let frozen = job.tracker.set_latest_block(head);
                info!(job_id = %spec.id, latest_block = frozen, "Crawl target frozen");
                frozen
            }
        };

        let mut planner = SegmentPlanner::new(self.settings.planner.clone(), cursor, latest, window);
        info!(
            job_id = %spec.id,
            address = %spec.address,
            from = cursor,
            to = latest,
            window = planner.window(),
            "Starting crawl"
        );

        while let Some(segment) = planner.next_segment() {
            {
                let mut job = self.lock();
                job.current_segment = Some(BlockSpan::from(&segment));
                job.window = Some(planner.window());
                job.touch();
            }
            debug!(
                job_id = %spec.id,
                from = segment.from,
                to = segment.to,
                attempt = segment.attempt,
                "Segment start"
            );

            let mut tally = SegmentTally::default();
            let mut truncated = false;
            let mut retry_window = None;

            let kinds: &[TxKind] = if spec.include_tokens {
                &[TxKind::Normal, TxKind::Token]
            } else {
                &[TxKind::Normal]
            };
            for kind in kinds {
                let paging = match kind {
                    TxKind::Normal => {
                        self.page_segment::<Transaction>(&spec, &segment, &mut tally)
                            .await?
                    }
                    TxKind::Token => {
                        self.page_segment::<TokenTransfer>(&spec, &segment, &mut tally)
                            .await?
                    }
                };
                match paging {
                    Paging::Exhausted => {}
                    Paging::Interrupted(reason) => return Ok(self.pause(reason)),
                    Paging::CapHit => match planner.on_cap_hit(&segment) {
                        CapResponse::Retry { window } => {
                            retry_window = Some(window);
                            break;
                        }
                        CapResponse::Unsplittable => {
                            warn!(
                                job_id = %spec.id,
                                block = segment.from,
                                %kind,
                                "Single block exceeds the record cap; keeping partial data"
                            );
                            truncated = true;
                        }
                    },
                }
            }

            if let Some(window) = retry_window {
                warn!(
                    job_id = %spec.id,
                    from = segment.from,
                    to = segment.to,
                    window,
                    "Record cap hit; retrying with smaller window"
                );
                let mut job = self.lock();
                job.window = Some(window);
                job.check_high_activity(
                    window,
                    self.settings.high_activity_window,
                    self.settings.high_activity_segments,
                );
                continue;
            }

            if truncated {
                planner.on_segment_forced(&segment);
            } else if let Some(grown) = planner.on_segment_complete(&segment) {
                debug!(job_id = %spec.id, window = grown, "Window grown");
            }
            self.finish_segment(&segment, tally, truncated, planner.window());
        }

        let mut job = self.lock();
        job.current_segment = None;
        job.stop_requested = false;
        if let Err(e) = job.transition(JobStatus::Completed) {
            warn!(job_id = %spec.id, "Could not complete job: {}", e);
        }
        let snapshot = job.tracker.snapshot();
        info!(
            job_id = %spec.id,
            coverage_end = ?snapshot.coverage_end,
            total_unique = snapshot.total_unique,
            pages = job.pages_processed,
            "Crawl completed"
        );
        Ok(RunOutcome::Completed)
    }

    /// Pages through one record kind for `segment`, ingesting each page
    async fn page_segment<R>(
        &mut self,
        spec: &JobSpec,
        segment: &Segment,
        tally: &mut SegmentTally,
    ) -> FetchResult<Paging>
    where
        R: PagedRecord + Tracked,
    {
        let mut page = 1u32;
        loop {
            if self.cancel.is_cancelled() {
                return Ok(Paging::Interrupted(Interrupt::Cancelled));
            }
            if spec.max_pages.is_some_and(|max| self.pages_this_run >= max) {
                return Ok(Paging::Interrupted(Interrupt::PageLimit));
            }

            let query = PageQuery {
                address: spec.address.clone(),
                from_block: segment.from,
                to_block: segment.to,
                page,
                page_size: spec.page_size,
            };
            let result = R::fetch_page(self.api.as_ref(), &query).await?;
            self.pages_this_run += 1;
            tally.pages += 1;

            let inserted = {
                let mut job = self.lock();
                let inserted = job.tracker.ingest(result.records, segment);
                job.pages_processed += 1;
                job.touch();
                inserted
            };
            match R::KIND {
                TxKind::Normal => tally.transactions += inserted,
                TxKind::Token => tally.token_transfers += inserted,
            }

            match result.status {
                PageStatus::More => page += 1,
                PageStatus::Exhausted => return Ok(Paging::Exhausted),
                PageStatus::CapHit => return Ok(Paging::CapHit),
            }
        }
    }

    fn finish_segment(&self, segment: &Segment, tally: SegmentTally, truncated: bool, window: u64) {
        let mut job = self.lock();
        job.tracker.complete_segment(segment);
        if truncated {
            job.truncated_blocks.push(segment.from);
        }
        job.segments_done += 1;
        job.window = Some(window);
        job.current_segment = None;
        job.record_segment(SegmentRecord {
            from: segment.from,
            to: segment.to,
            pages: tally.pages,
            transactions: tally.transactions,
            token_transfers: tally.token_transfers,
            truncated,
        });
        job.check_high_activity(
            window,
            self.settings.high_activity_window,
            self.settings.high_activity_segments,
        );
        job.touch();

        info!(
            job_id = %job.id(),
            from = segment.from,
            to = segment.to,
            pages = tally.pages,
            new_records = tally.transactions + tally.token_transfers,
            total_unique = job.tracker.total_unique(),
            "Segment complete"
        );
    }

    fn pause(&self, reason: Interrupt) -> RunOutcome {
        let limit_reached = reason == Interrupt::PageLimit;
        let mut job = self.lock();
        job.current_segment = None;
        job.stop_requested = false;
        job.limit_reached = limit_reached;
        if let Err(e) = job.transition(JobStatus::Paused) {
            warn!(job_id = %job.id(), "Could not pause job: {}", e);
        }
        info!(
            job_id = %job.id(),
            coverage_end = ?job.tracker.coverage().coverage_end(),
            limit_reached,
            "Crawl paused"
        );
        RunOutcome::Paused { limit_reached }
    }
}
