use crate::model::{de_u64, Record, TxKind};
use serde::{Deserialize, Serialize};

/// A plain transaction as listed by `account/txlist`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub hash: String,

    #[serde(deserialize_with = "de_u64")]
    pub block_number: u64,

    /// Unix timestamp (seconds)
    #[serde(rename = "timeStamp", deserialize_with = "de_u64")]
    pub timestamp: u64,

    #[serde(default, deserialize_with = "de_u64")]
    pub transaction_index: u64,

    #[serde(default)]
    pub from: String,

    /// Empty for contract creations
    #[serde(default)]
    pub to: String,

    /// Value in wei
    #[serde(default)]
    pub value: String,

    #[serde(default)]
    pub gas: String,

    #[serde(default)]
    pub gas_price: String,

    #[serde(default)]
    pub gas_used: String,

    /// "1" when execution reverted
    #[serde(default)]
    pub is_error: String,

    #[serde(rename = "txreceipt_status", default)]
    pub receipt_status: String,

    #[serde(default)]
    pub contract_address: String,
}

impl Transaction {
    /// Returns true if the transaction executed without reverting
    pub fn succeeded(&self) -> bool {
        self.is_error != "1"
    }
}

impl Record for Transaction {
    type Key = String;

    const KIND: TxKind = TxKind::Normal;

    fn key(&self) -> String {
        self.hash.clone()
    }

    fn block_number(&self) -> u64 {
        self.block_number
    }

    fn position(&self) -> u64 {
        self.transaction_index
    }
}
