use alloy_primitives::utils::{format_ether, parse_ether};
use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// One transfer record as stored by the wallet contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Position in the contract's `transactions` array.
    pub index: u64,
    pub to: Address,
    /// Amount in wei.
    pub amount: U256,
    pub executed: bool,
    pub confirmations: U256,
}

impl TransactionRecord {
    /// Executed records never change again.
    pub fn is_terminal(&self) -> bool {
        self.executed
    }
}

/// Plain-data read copy of the wallet handed to the presentation layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub owners: Vec<Address>,
    pub transactions: Vec<TransactionRecord>,
    /// Wall-clock time of the last successful refresh, 0 if never refreshed.
    pub refreshed_at_ms: u64,
}

impl Snapshot {
    /// Compares contents, ignoring the refresh timestamp.
    pub fn same_state(&self, other: &Snapshot) -> bool {
        self.owners == other.owners && self.transactions == other.transactions
    }
}

/// Parse a decimal ether amount ("1.5") into wei.
pub fn parse_amount(amount: &str) -> Option<U256> {
    let amount = amount.trim();
    if amount.is_empty() || amount.starts_with('-') {
        return None;
    }
    parse_ether(amount).ok()
}

/// Format a wei amount as decimal ether.
pub fn format_amount(wei: U256) -> String {
    format_ether(wei)
}

/// Parse a user-supplied transaction index.
pub fn parse_index(index: &str) -> Option<U256> {
    let index = index.trim();
    if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    U256::from_str_radix(index, 10).ok()
}

/// Parse a hex address, with or without checksum casing.
pub fn parse_address(address: &str) -> Option<Address> {
    address.trim().parse().ok()
}
