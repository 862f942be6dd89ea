//! Configuration module for Chain-Sweep
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every section is optional; omitted keys fall back to defaults tuned for the
//! public Etherscan API.
//!
//! # Example
//!
//! ```no_run
//! use chain_sweep::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! println!("Initial window: {} blocks", config.crawl.default_window);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{ApiConfig, Config, CrawlConfig, JobsConfig, RetryConfig, API_KEY_ENV};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
