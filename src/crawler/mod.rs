//! Crawl engine
//!
//! This module contains the core crawling logic:
//! - Adaptive block-range segmentation
//! - Deduplication and coverage tracking
//! - The runner loop that ties them to the fetch client

mod planner;
mod runner;
#[cfg(test)]
pub(crate) mod sim;
mod tracker;

pub use planner::{CapResponse, PlannerSettings, Segment, SegmentPlanner};
pub use runner::{CrawlRunner, RunOutcome, RunnerSettings};
pub use tracker::{CoverageTracker, Tracked, UniqueSet};
