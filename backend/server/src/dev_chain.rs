use alloy_primitives::{keccak256, Address, Bytes, B256};
use alloy_sol_types::{SolCall, SolInterface};
use async_trait::async_trait;
use common::abi::{self, IMultiSigWalletCalls};
use common::{LedgerError, MultisigLedger};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::gateway::{Provider, ProviderError, Receipt};

/// In-process provider backed by a [`MultisigLedger`] deployed at a fixed
/// address. Transactions are applied synchronously when sent.
pub struct DevChain {
    chain_id: u64,
    contract: Address,
    accounts: Vec<Address>,
    ledger: Mutex<MultisigLedger>,
    receipts: Mutex<HashMap<B256, Receipt>>,
    nonce: AtomicU64,
}

impl DevChain {
    pub const CHAIN_ID: u64 = 31337;

    pub fn new(contract: Address, accounts: Vec<Address>, ledger: MultisigLedger) -> Self {
        Self {
            chain_id: Self::CHAIN_ID,
            contract,
            accounts,
            ledger: Mutex::new(ledger),
            receipts: Mutex::new(HashMap::new()),
            nonce: AtomicU64::new(0),
        }
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    /// Run `f` against the ledger, e.g. to inspect balances.
    pub fn with_ledger<R>(&self, f: impl FnOnce(&mut MultisigLedger) -> R) -> R {
        let mut ledger = self.ledger.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut ledger)
    }

    fn check_target(&self, to: Address) -> Result<(), ProviderError> {
        if to == self.contract {
            Ok(())
        } else {
            Err(ProviderError::Reverted(format!("no contract at {to}")))
        }
    }

    fn decode(data: &[u8]) -> Result<IMultiSigWalletCalls, ProviderError> {
        IMultiSigWalletCalls::abi_decode(data, true)
            .map_err(|e| ProviderError::Reverted(format!("bad calldata: {e}")))
    }

    fn revert(err: LedgerError) -> ProviderError {
        ProviderError::Reverted(err.to_string())
    }
}

#[async_trait]
impl Provider for DevChain {
    async fn chain_id(&self) -> Result<u64, ProviderError> {
        Ok(self.chain_id)
    }

    async fn accounts(&self) -> Result<Vec<Address>, ProviderError> {
        Ok(self.accounts.clone())
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ProviderError> {
        self.check_target(to)?;
        let call = Self::decode(&data)?;
        self.with_ledger(|ledger| {
            let out = match call {
                IMultiSigWalletCalls::getOwners(_) => {
                    abi::getOwnersCall::abi_encode_returns(&(ledger.owners().to_vec(),))
                }
                IMultiSigWalletCalls::transactions(c) => {
                    let tx = ledger.transaction(c.index).map_err(Self::revert)?;
                    abi::transactionsCall::abi_encode_returns(&(
                        tx.to,
                        tx.amount,
                        tx.executed,
                        tx.confirmations,
                    ))
                }
                _ => return Err(ProviderError::Reverted("not a view function".into())),
            };
            Ok(Bytes::from(out))
        })
    }

    async fn send_transaction(
        &self,
        from: Address,
        to: Address,
        data: Bytes,
    ) -> Result<B256, ProviderError> {
        if !self.accounts.contains(&from) {
            return Err(ProviderError::UnknownSigner(from));
        }
        self.check_target(to)?;
        let call = Self::decode(&data)?;

        self.with_ledger(|ledger| match call {
            IMultiSigWalletCalls::submitTransaction(c) => {
                ledger.submit(from, c.to, c.amount).map(|_| ())
            }
            IMultiSigWalletCalls::confirmTransaction(c) => {
                ledger.confirm(from, c.txIndex).map(|_| ())
            }
            IMultiSigWalletCalls::addOwner(c) => ledger.add_owner(from, c.newOwner),
            IMultiSigWalletCalls::removeOwner(c) => ledger.remove_owner(from, c.owner),
            _ => Ok(()),
        })
        .map_err(Self::revert)?;

        let nonce = self.nonce.fetch_add(1, Ordering::Relaxed);
        let mut preimage = from.to_vec();
        preimage.extend_from_slice(&nonce.to_be_bytes());
        preimage.extend_from_slice(&data);
        let tx_hash = keccak256(&preimage);

        self.receipts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(
                tx_hash,
                Receipt {
                    tx_hash,
                    success: true,
                },
            );
        Ok(tx_hash)
    }

    async fn transaction_receipt(&self, tx_hash: B256) -> Result<Option<Receipt>, ProviderError> {
        Ok(self
            .receipts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&tx_hash)
            .copied())
    }
}
