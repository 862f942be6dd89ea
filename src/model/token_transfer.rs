use crate::model::{de_opt_u64, de_u64, Record, TxKind};
use serde::{Deserialize, Serialize};

/// An ERC-20 transfer event as listed by `account/tokentx`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTransfer {
    pub hash: String,

    #[serde(deserialize_with = "de_u64")]
    pub block_number: u64,

    #[serde(rename = "timeStamp", deserialize_with = "de_u64")]
    pub timestamp: u64,

    #[serde(default, deserialize_with = "de_u64")]
    pub transaction_index: u64,

    /// Not every provider returns it; see [`TokenTransfer::key`]
    #[serde(default, deserialize_with = "de_opt_u64")]
    pub log_index: Option<u64>,

    #[serde(default)]
    pub from: String,

    #[serde(default)]
    pub to: String,

    /// Amount in the token's base units
    #[serde(default)]
    pub value: String,

    #[serde(default)]
    pub contract_address: String,

    #[serde(default)]
    pub token_name: String,

    #[serde(default)]
    pub token_symbol: String,

    #[serde(rename = "tokenDecimal", default)]
    pub token_decimals: String,

    #[serde(default)]
    pub gas_price: String,

    #[serde(default)]
    pub gas_used: String,
}

/// Identity of a transfer event: one transaction hash may carry several
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TokenTransferKey {
    pub hash: String,
    pub event: String,
}

impl TokenTransfer {
    /// Token decimals, defaulting to 18 when absent or malformed
    pub fn decimals(&self) -> u32 {
        self.token_decimals.trim().parse().unwrap_or(18)
    }
}

impl Record for TokenTransfer {
    type Key = TokenTransferKey;

    const KIND: TxKind = TxKind::Token;

    /// Hash plus log index when the provider sends one; otherwise the event
    /// contents stand in so distinct transfers in one transaction survive.
    fn key(&self) -> TokenTransferKey {
        let event = match self.log_index {
            Some(index) => index.to_string(),
            None => format!(
                "{}:{}:{}:{}",
                self.contract_address.to_lowercase(),
                self.from.to_lowercase(),
                self.to.to_lowercase(),
                self.value
            ),
        };

        TokenTransferKey {
            hash: self.hash.clone(),
            event,
        }
    }

    fn block_number(&self) -> u64 {
        self.block_number
    }

    fn position(&self) -> u64 {
        self.log_index.unwrap_or(self.transaction_index)
    }
}
