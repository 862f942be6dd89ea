//! Output module for exporting crawl results
//!
//! This module handles:
//! - Formatting amounts, timestamps and directions
//! - Rendering transactions and token transfers as CSV
//! - Writing export files named after the job

mod csv;
pub mod format;

pub use self::csv::{escape_field, write_csv, CsvRow, TOKEN_TRANSFER_HEADER, TRANSACTION_HEADER};

use crate::jobs::{JobResults, JobSnapshot};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Files written by [`export_results`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFiles {
    pub transactions: PathBuf,
    pub token_transfers: Option<PathBuf>,
}

/// File stem for an export; incomplete crawls are marked as partial
pub fn export_name(prefix: &str, snapshot: &JobSnapshot) -> String {
    if snapshot.covered {
        format!(
            "{}_{}_{}_to_latest.csv",
            prefix, snapshot.address, snapshot.start_block
        )
    } else {
        format!(
            "{}_partial_{}_{}.csv",
            prefix, snapshot.address, snapshot.start_block
        )
    }
}

/// Writes the job's results as CSV files into `dir`
///
/// The token transfer file is only written when the job fetched them.
pub fn export_results(
    dir: &Path,
    snapshot: &JobSnapshot,
    results: &JobResults,
) -> OutputResult<ExportedFiles> {
    std::fs::create_dir_all(dir)?;

    let tx_path = dir.join(export_name("eth_txs", snapshot));
    let rows = write_file(&tx_path, &snapshot.address, &results.transactions)?;
    info!(path = %tx_path.display(), rows, "Wrote transactions");

    let token_path = if snapshot.include_tokens {
        let path = dir.join(export_name("token_txs", snapshot));
        let rows = write_file(&path, &snapshot.address, &results.token_transfers)?;
        info!(path = %path.display(), rows, "Wrote token transfers");
        Some(path)
    } else {
        None
    };

    Ok(ExportedFiles {
        transactions: tx_path,
        token_transfers: token_path,
    })
}

fn write_file<R: CsvRow>(path: &Path, address: &str, records: &[R]) -> OutputResult<usize> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_csv(&mut writer, address, records)
}
