//! Field formatting for exported rows

use chrono::{TimeZone, Utc};

/// Decimal places shown for ETH values and token amounts
pub const DISPLAY_PLACES: u32 = 6;

/// Decimals of the chain's native currency
pub const NATIVE_DECIMALS: u32 = 18;

/// Largest decimals value accepted from a token contract
pub const MAX_DECIMALS: u32 = 255;

/// Which side of a transfer the crawled address is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
    Unknown,
}

impl Direction {
    /// Sender wins when the address is on both sides
    pub fn of(address: &str, from: &str, to: &str) -> Self {
        if from.eq_ignore_ascii_case(address) {
            Self::Out
        } else if to.eq_ignore_ascii_case(address) {
            Self::In
        } else {
            Self::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::In => "IN",
            Self::Out => "OUT",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// Formats a unix timestamp as `YYYY-MM-DD HH:MM:SS UTC`
pub fn format_timestamp(timestamp: u64) -> String {
    i64::try_from(timestamp)
        .ok()
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "N/A".to_string())
}

/// Converts an integer amount in base units to a decimal string
///
/// Uses digit arithmetic so arbitrarily large values stay exact; the last
/// shown place is rounded half up. Returns `None` if `raw` is not an unsigned
/// integer or `decimals` exceeds [`MAX_DECIMALS`].
pub fn format_units(raw: &str, decimals: u32, places: u32) -> Option<String> {
    let raw = raw.trim();
    if decimals > MAX_DECIMALS || raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let decimals = decimals as usize;
    let places = places as usize;
    let digits = raw.trim_start_matches('0');

    // Pad so there is at least one integer digit
    let width = digits.len().max(decimals + 1);
    let padded = format!("{:0>width$}", digits, width = width);
    let (int_part, frac_part) = padded.split_at(width - decimals);

    let mut kept: Vec<u8> = int_part.bytes().collect();
    let int_len = kept.len();
    let frac = frac_part.as_bytes();

    if frac.len() > places {
        kept.extend_from_slice(&frac[..places]);
        if frac[places] >= b'5' {
            round_up(&mut kept);
        }
    } else {
        kept.extend_from_slice(frac);
        kept.resize(int_len + places, b'0');
    }

    // Rounding may have added a leading digit
    let split = kept.len() - places;
    let int_digits = String::from_utf8_lossy(&kept[..split]).into_owned();
    let int_digits = match int_digits.trim_start_matches('0') {
        "" => "0".to_string(),
        trimmed => trimmed.to_string(),
    };

    if places == 0 {
        Some(int_digits)
    } else {
        Some(format!(
            "{}.{}",
            int_digits,
            String::from_utf8_lossy(&kept[split..])
        ))
    }
}

fn round_up(digits: &mut Vec<u8>) {
    for digit in digits.iter_mut().rev() {
        if *digit == b'9' {
            *digit = b'0';
        } else {
            *digit += 1;
            return;
        }
    }
    digits.insert(0, b'1');
}

/// Native amount shown with [`DISPLAY_PLACES`], `N/A` when unparseable
pub fn format_native(raw: &str) -> String {
    format_units(raw, NATIVE_DECIMALS, DISPLAY_PLACES).unwrap_or_else(|| "N/A".to_string())
}

/// Fee in base units: `gas_used * gas_price`
pub fn fee_wei(gas_used: &str, gas_price: &str) -> Option<u128> {
    let used: u128 = gas_used.trim().parse().ok()?;
    let price: u128 = gas_price.trim().parse().ok()?;
    used.checked_mul(price)
}
