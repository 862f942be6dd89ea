//! Chain-Sweep: complete address history from a capped account-indexing API
//!
//! This crate crawls the full transaction history of an address from an
//! Etherscan-style API that refuses to return more than ~10,000 records per
//! query. Block ranges are segmented adaptively so every segment stays under
//! the cap, results are deduplicated, and coverage is tracked so a crawl can be
//! paused, resumed and exported at any time.

pub mod balance;
pub mod client;
pub mod config;
pub mod crawler;
pub mod jobs;
pub mod model;
pub mod output;
pub mod state;

use thiserror::Error;

/// Main error type for Chain-Sweep operations
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Invalid date '{input}', expected YYYY-MM-DD")]
    InvalidDate { input: String },

    #[error("No block found at or before {date} 00:00 UTC")]
    BlockNotFound { date: String },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Errors surfaced by the fetch client once local recovery is exhausted
///
/// Rate limits, timeouts and transient server failures are retried inside the
/// client; only the final outcome reaches the caller.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("Request timed out after {attempts} attempts")]
    Timeout { attempts: u32 },

    #[error("Request failed after {attempts} attempts: {message}")]
    Unexpected { attempts: u32, message: String },

    #[error("API error: {message}")]
    Api { message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// Job supervision errors
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job already exists: {0}")]
    DuplicateId(String),

    #[error("Job {0} is still running")]
    StillRunning(String),

    #[error("Invalid job parameters: {0}")]
    InvalidParams(String),

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::JobStatus,
        to: state::JobStatus,
    },

    #[error("Could not create API client: {0}")]
    Client(#[from] FetchError),
}

/// Result type alias for Chain-Sweep operations
pub type Result<T> = std::result::Result<T, SweepError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for fetch operations
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Result type alias for job operations
pub type JobResult<T> = std::result::Result<T, JobError>;

// Re-export commonly used types
pub use config::Config;
pub use jobs::{JobParams, JobSnapshot, JobSupervisor};
pub use model::{TokenTransfer, Transaction};
pub use state::{CoverageState, JobStatus};
