//! CSV rendering of job results

use crate::model::{TokenTransfer, Transaction};
use crate::output::format::{
    fee_wei, format_native, format_timestamp, format_units, Direction, DISPLAY_PLACES,
};
use crate::output::OutputResult;
use std::io::Write;

pub const TRANSACTION_HEADER: [&str; 8] = ["time", "block", "direction", "from", "to", "value", "fee", "hash"];

pub const TOKEN_TRANSFER_HEADER: [&str; 10] = [
    "time",
    "block",
    "direction",
    "token_symbol",
    "token_name",
    "amount",
    "from",
    "to",
    "contract_address",
    "hash",
];

/// A record that renders as one CSV row relative to the crawled address
pub trait CsvRow {
    fn header() -> &'static [&'static str];

    fn fields(&self, address: &str) -> Vec<String>;
}

impl CsvRow for Transaction {
    fn header() -> &'static [&'static str] {
        &TRANSACTION_HEADER
    }

    fn fields(&self, address: &str) -> Vec<String> {
        let fee = fee_wei(&self.gas_used, &self.gas_price)
            .map(|fee| format_native(&fee.to_string()))
            .unwrap_or_default();

        vec![
            format_timestamp(self.timestamp),
            self.block_number.to_string(),
            Direction::of(address, &self.from, &self.to).as_str().to_string(),
            self.from.clone(),
            self.to.clone(),
            format_native(&self.value),
            fee,
            self.hash.clone(),
        ]
    }
}

impl CsvRow for TokenTransfer {
    fn header() -> &'static [&'static str] {
        &TOKEN_TRANSFER_HEADER
    }

    fn fields(&self, address: &str) -> Vec<String> {
        vec![
            format_timestamp(self.timestamp),
            self.block_number.to_string(),
            Direction::of(address, &self.from, &self.to).as_str().to_string(),
            self.token_symbol.clone(),
            self.token_name.clone(),
            format_units(&self.value, self.decimals(), DISPLAY_PLACES)
                .unwrap_or_else(|| "N/A".to_string()),
            self.from.clone(),
            self.to.clone(),
            self.contract_address.clone(),
            self.hash.clone(),
        ]
    }
}

/// Quotes a field if it contains a delimiter, quote or line break
pub fn escape_field(field: &str) -> std::borrow::Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        std::borrow::Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        std::borrow::Cow::Borrowed(field)
    }
}

fn write_line<W: Write, S: AsRef<str>>(writer: &mut W, fields: &[S]) -> OutputResult<()> {
    let line = fields
        .iter()
        .map(|f| escape_field(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",");
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\r\n")?;
    Ok(())
}

/// Writes a header and one row per record; returns the row count
pub fn write_csv<W: Write, R: CsvRow>(writer: &mut W, address: &str, records: &[R]) -> OutputResult<usize> {
    write_line(writer, R::header())?;
    for record in records {
        write_line(writer, &record.fields(address))?;
    }
    writer.flush()?;
    Ok(records.len())
}
