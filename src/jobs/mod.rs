//! Background crawl jobs
//!
//! - `Job`: per-job state shared between a runner and status queries
//! - `JobSupervisor`: registry, lifecycle operations and runner tasks

mod job;
mod supervisor;

pub use job::{
    normalize_address, BlockSpan, Job, JobParams, JobResults, JobSnapshot, JobSpec, SegmentRecord,
};
pub use supervisor::{ApiFactory, JobSupervisor};
