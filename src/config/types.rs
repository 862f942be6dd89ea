use serde::Deserialize;

/// Environment variable consulted when `api-key` is left empty
pub const API_KEY_ENV: &str = "ETHERSCAN_API_KEY";

/// Main configuration structure for Chain-Sweep
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
}

/// Remote account-indexing API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Endpoint of the Etherscan-compatible API
    #[serde(rename = "base-url", default = "default_base_url")]
    pub base_url: String,

    /// API key; when empty the `ETHERSCAN_API_KEY` environment variable is used
    #[serde(rename = "api-key", default)]
    pub api_key: String,

    /// Chain identifier sent as `chainid`
    #[serde(rename = "chain-id", default = "default_chain_id")]
    pub chain_id: u64,

    /// Per-request timeout (seconds)
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Segmentation and crawl behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlConfig {
    /// Initial window size in blocks
    #[serde(rename = "default-window", default = "default_window")]
    pub default_window: u64,

    /// Smallest window the planner may shrink to
    #[serde(rename = "min-window", default = "default_min_window")]
    pub min_window: u64,

    /// Largest window the planner may grow to
    #[serde(rename = "max-window", default = "default_max_window")]
    pub max_window: u64,

    /// Consecutive cap-free segments before the window grows
    #[serde(rename = "grow-after", default = "default_grow_after")]
    pub grow_after: u32,

    /// Multiplier applied when the window grows
    #[serde(rename = "grow-factor", default = "default_grow_factor")]
    pub grow_factor: f64,

    /// Provider limit on records returned for one query
    #[serde(rename = "max-records-per-query", default = "default_max_records")]
    pub max_records_per_query: u32,

    /// Page size used when a job does not specify one
    #[serde(rename = "default-page-size", default = "default_page_size")]
    pub default_page_size: u32,

    /// Window size at or below which a job is flagged as high activity
    #[serde(rename = "high-activity-window", default = "default_high_activity_window")]
    pub high_activity_window: u64,

    /// Segment count at which a job is flagged as high activity
    #[serde(rename = "high-activity-segments", default = "default_high_activity_segments")]
    pub high_activity_segments: u64,

    /// Number of completed segments kept in the progress log
    #[serde(rename = "segment-log-size", default = "default_segment_log_size")]
    pub segment_log_size: usize,
}

/// Retry/backoff configuration for the fetch client
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per request, including the first one
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (milliseconds)
    #[serde(rename = "base-delay-ms", default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound on any single delay (milliseconds)
    #[serde(rename = "max-delay-ms", default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Fraction of the delay randomised in either direction
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

/// Job registry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct JobsConfig {
    /// Jobs kept in memory before the oldest idle one is evicted
    #[serde(rename = "max-retained", default = "default_max_retained")]
    pub max_retained: usize,
}

impl ApiConfig {
    /// Returns the configured API key, falling back to the environment
    pub fn resolved_api_key(&self) -> String {
        if self.api_key.is_empty() {
            std::env::var(API_KEY_ENV).unwrap_or_default()
        } else {
            self.api_key.clone()
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            chain_id: default_chain_id(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            default_window: default_window(),
            min_window: default_min_window(),
            max_window: default_max_window(),
            grow_after: default_grow_after(),
            grow_factor: default_grow_factor(),
            max_records_per_query: default_max_records(),
            default_page_size: default_page_size(),
            high_activity_window: default_high_activity_window(),
            high_activity_segments: default_high_activity_segments(),
            segment_log_size: default_segment_log_size(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_retained: default_max_retained(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.etherscan.io/v2/api".to_string()
}

fn default_chain_id() -> u64 {
    1
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_window() -> u64 {
    12_500
}

fn default_min_window() -> u64 {
    1
}

fn default_max_window() -> u64 {
    200_000
}

fn default_grow_after() -> u32 {
    3
}

fn default_grow_factor() -> f64 {
    1.5
}

fn default_max_records() -> u32 {
    10_000
}

fn default_page_size() -> u32 {
    1_000
}

fn default_high_activity_window() -> u64 {
    1_000
}

fn default_high_activity_segments() -> u64 {
    2_000
}

fn default_segment_log_size() -> usize {
    10
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    16_000
}

fn default_jitter() -> f64 {
    0.2
}

fn default_max_retained() -> usize {
    20
}
