//! Record types returned by the account-indexing API
//!
//! Both plain transactions and token transfers implement [`Record`], which
//! gives the crawler a stable identity for deduplication and a sort key for
//! block-then-index ordering.

mod token_transfer;
mod transaction;

pub use token_transfer::{TokenTransfer, TokenTransferKey};
pub use transaction::Transaction;

use serde::{Deserialize, Deserializer};
use std::fmt;
use std::hash::Hash;

/// The two record kinds the API can list for an address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxKind {
    /// Plain value/contract-call transactions (`txlist`)
    Normal,
    /// ERC-20 transfer events (`tokentx`)
    Token,
}

impl TxKind {
    /// The API `action` parameter for this kind
    pub fn action(&self) -> &'static str {
        match self {
            Self::Normal => "txlist",
            Self::Token => "tokentx",
        }
    }
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.action())
    }
}

/// A record that can be deduplicated and ordered
pub trait Record: Clone + Send + Sync + 'static {
    /// Identity used for deduplication
    type Key: Eq + Hash + Clone + Send + Sync + fmt::Debug;

    /// Which API listing produces this record
    const KIND: TxKind;

    fn key(&self) -> Self::Key;

    fn block_number(&self) -> u64;

    /// Position inside the block, used as the secondary sort key
    fn position(&self) -> u64;
}

/// Sorts records by block then in-block position
pub fn sort_records<R: Record>(records: &mut [R]) {
    records.sort_by_key(|r| (r.block_number(), r.position()));
}

/// Deserializes a number the API may send either as a string or as JSON number
pub(crate) fn de_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrStr {
        Num(u64),
        Str(String),
    }

    match NumOrStr::deserialize(deserializer)? {
        NumOrStr::Num(n) => Ok(n),
        NumOrStr::Str(s) if s.is_empty() => Ok(0),
        NumOrStr::Str(s) => parse_u64(&s).map_err(serde::de::Error::custom),
    }
}

/// Like [`de_u64`] but keeps absent or empty values as `None`
pub(crate) fn de_opt_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrStr {
        Num(u64),
        Str(String),
    }

    match Option::<NumOrStr>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumOrStr::Num(n)) => Ok(Some(n)),
        Some(NumOrStr::Str(s)) if s.is_empty() => Ok(None),
        Some(NumOrStr::Str(s)) => parse_u64(&s).map(Some).map_err(serde::de::Error::custom),
    }
}

/// Parses decimal or `0x`-prefixed hex numbers
pub(crate) fn parse_u64(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse::<u64>(),
    };
    parsed.map_err(|e| format!("invalid number '{}': {}", s, e))
}
