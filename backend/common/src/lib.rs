pub mod abi;
pub mod ledger;
pub mod types;

pub use ledger::{LedgerError, MultisigLedger};
pub use types::{Snapshot, TransactionRecord};
