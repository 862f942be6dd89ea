//! Native balance of an address at the start of a calendar day

use crate::client::ChainApi;
use crate::jobs::normalize_address;
use crate::output::format::format_native;
use crate::{Result, SweepError};
use chrono::{NaiveDate, TimeZone, Utc};
use serde::Serialize;
use tracing::info;

/// Balance at the last block before midnight UTC of a date
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceAtDate {
    pub address: String,
    pub date: String,
    /// Unix timestamp of `date` 00:00:00 UTC
    pub timestamp: i64,
    pub block_number: u64,
    pub balance_wei: String,
}

impl BalanceAtDate {
    /// Balance in ether with six decimals
    pub fn balance_eth(&self) -> String {
        format_native(&self.balance_wei)
    }
}

/// Converts `YYYY-MM-DD` to the unix timestamp of 00:00:00 UTC that day
pub fn date_to_timestamp_utc_midnight(date: &str) -> Result<i64> {
    let day = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").map_err(|_| SweepError::InvalidDate {
        input: date.to_string(),
    })?;
    day.and_hms_opt(0, 0, 0)
        .map(|midnight| Utc.from_utc_datetime(&midnight).timestamp())
        .ok_or_else(|| SweepError::InvalidDate {
            input: date.to_string(),
        })
}

/// Looks up the block at or before midnight UTC of `date`, then the balance there
pub async fn balance_at_date(api: &dyn ChainApi, address: &str, date: &str) -> Result<BalanceAtDate> {
    let address = normalize_address(address).ok_or_else(|| SweepError::InvalidAddress(address.to_string()))?;
    let timestamp = date_to_timestamp_utc_midnight(date)?;

    let block_number = api.block_by_timestamp(timestamp).await?;
    if block_number == 0 {
        return Err(SweepError::BlockNotFound {
            date: date.to_string(),
        });
    }

    let balance_wei = api.balance_at_block(&address, block_number).await?;
    info!(%address, date, block_number, %balance_wei, "Balance resolved");

    Ok(BalanceAtDate {
        address,
        date: date.trim().to_string(),
        timestamp,
        block_number,
        balance_wei,
    })
}
