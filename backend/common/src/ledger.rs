//! In-process multisig ledger.
//!
//! Mirrors the state machine the deployed wallet contract is expected to
//! enforce: owners submit transfers, each owner confirms at most once, and a
//! transfer executes exactly once when its confirmations reach `required`.

use alloy_primitives::{Address, U256};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::types::TransactionRecord;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("owner list must not be empty")]
    NoOwners,
    #[error("duplicate owner {0}")]
    DuplicateOwner(Address),
    #[error("invalid number of required confirmations")]
    InvalidRequirement,
    #[error("not owner")]
    NotOwner,
    #[error("invalid owner address")]
    InvalidOwner,
    #[error("owner already exists")]
    OwnerExists,
    #[error("owner not found")]
    OwnerNotFound,
    #[error("owner count would drop below required confirmations")]
    QuorumUnreachable,
    #[error("tx does not exist")]
    TxNotFound,
    #[error("tx already executed")]
    AlreadyExecuted,
    #[error("tx already confirmed")]
    AlreadyConfirmed,
    #[error("insufficient balance")]
    InsufficientBalance,
}

#[derive(Debug, Clone)]
struct PendingTransfer {
    to: Address,
    amount: U256,
    executed: bool,
    confirmed_by: HashSet<Address>,
}

#[derive(Debug, Clone)]
pub struct MultisigLedger {
    owners: Vec<Address>,
    required: usize,
    balance: U256,
    transactions: Vec<PendingTransfer>,
    /// Funds paid out by executed transfers, by recipient.
    paid_out: HashMap<Address, U256>,
}

impl MultisigLedger {
    pub fn new(owners: Vec<Address>, required: usize, balance: U256) -> Result<Self, LedgerError> {
        if owners.is_empty() {
            return Err(LedgerError::NoOwners);
        }
        let mut seen = HashSet::new();
        for owner in &owners {
            if owner.is_zero() {
                return Err(LedgerError::InvalidOwner);
            }
            if !seen.insert(*owner) {
                return Err(LedgerError::DuplicateOwner(*owner));
            }
        }
        if required == 0 || required > owners.len() {
            return Err(LedgerError::InvalidRequirement);
        }

        Ok(Self {
            owners,
            required,
            balance,
            transactions: Vec::new(),
            paid_out: HashMap::new(),
        })
    }

    pub fn is_owner(&self, address: &Address) -> bool {
        self.owners.contains(address)
    }

    pub fn owners(&self) -> &[Address] {
        &self.owners
    }

    pub fn required(&self) -> usize {
        self.required
    }

    pub fn balance(&self) -> U256 {
        self.balance
    }

    pub fn balance_of(&self, address: &Address) -> U256 {
        self.paid_out.get(address).copied().unwrap_or_default()
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    /// Read one record. Out-of-range indices revert like the contract getter.
    pub fn transaction(&self, index: U256) -> Result<TransactionRecord, LedgerError> {
        let idx = Self::slot(index)?;
        let tx = self.transactions.get(idx).ok_or(LedgerError::TxNotFound)?;
        Ok(TransactionRecord {
            index: idx as u64,
            to: tx.to,
            amount: tx.amount,
            executed: tx.executed,
            confirmations: U256::from(tx.confirmed_by.len()),
        })
    }

    pub fn submit(&mut self, sender: Address, to: Address, amount: U256) -> Result<u64, LedgerError> {
        self.only_owner(&sender)?;
        self.transactions.push(PendingTransfer {
            to,
            amount,
            executed: false,
            confirmed_by: HashSet::new(),
        });
        Ok((self.transactions.len() - 1) as u64)
    }

    /// Record a confirmation and execute the transfer once quorum is reached.
    /// Returns whether this confirmation executed it.
    pub fn confirm(&mut self, sender: Address, index: U256) -> Result<bool, LedgerError> {
        self.only_owner(&sender)?;
        let idx = Self::slot(index)?;
        let required = self.required;
        let balance = self.balance;

        let tx = self.transactions.get(idx).ok_or(LedgerError::TxNotFound)?;
        if tx.executed {
            return Err(LedgerError::AlreadyExecuted);
        }
        if tx.confirmed_by.contains(&sender) {
            return Err(LedgerError::AlreadyConfirmed);
        }

        let reaches_quorum = tx.confirmed_by.len() + 1 >= required;
        if reaches_quorum && balance < tx.amount {
            // The whole confirmation reverts, nothing is recorded.
            return Err(LedgerError::InsufficientBalance);
        }

        let tx = &mut self.transactions[idx];
        tx.confirmed_by.insert(sender);
        if !reaches_quorum {
            return Ok(false);
        }

        tx.executed = true;
        self.balance -= tx.amount;
        *self.paid_out.entry(tx.to).or_default() += tx.amount;
        Ok(true)
    }

    pub fn add_owner(&mut self, sender: Address, owner: Address) -> Result<(), LedgerError> {
        self.only_owner(&sender)?;
        if owner.is_zero() {
            return Err(LedgerError::InvalidOwner);
        }
        if self.is_owner(&owner) {
            return Err(LedgerError::OwnerExists);
        }
        self.owners.push(owner);
        Ok(())
    }

    pub fn remove_owner(&mut self, sender: Address, owner: Address) -> Result<(), LedgerError> {
        self.only_owner(&sender)?;
        let pos = self
            .owners
            .iter()
            .position(|o| *o == owner)
            .ok_or(LedgerError::OwnerNotFound)?;
        if self.owners.len() - 1 < self.required {
            return Err(LedgerError::QuorumUnreachable);
        }
        self.owners.remove(pos);
        Ok(())
    }

    /// Deposit funds into the wallet.
    pub fn fund(&mut self, amount: U256) {
        self.balance += amount;
    }

    fn only_owner(&self, sender: &Address) -> Result<(), LedgerError> {
        if self.is_owner(sender) {
            Ok(())
        } else {
            Err(LedgerError::NotOwner)
        }
    }

    fn slot(index: U256) -> Result<usize, LedgerError> {
        usize::try_from(index).map_err(|_| LedgerError::TxNotFound)
    }
}
