//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `JobStatus`: Lifecycle of a crawl job (idle, running, paused, stopped, completed, failed)
//! - `CoverageState`: Highest block proven fetched relative to the frozen crawl target

mod coverage;
mod job_status;

// Re-export main types
pub use coverage::{CoverageSnapshot, CoverageState};
pub use job_status::JobStatus;
