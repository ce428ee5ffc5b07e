//! Session/provider gateway.
//!
//! A [`Provider`] is whatever holds the user's keys and talks to the chain: a
//! JSON-RPC node with unlocked accounts, or the in-process dev chain. A
//! [`Session`] can only be obtained through [`Gateway::connect`], and every
//! state-changing contract call takes one.

use alloy_primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http transport: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("execution reverted: {0}")]
    Reverted(String),
    #[error("malformed rpc response: {0}")]
    Malformed(String),
    #[error("no accounts available")]
    NoAccounts,
    #[error("signer {0} is not managed by the provider")]
    UnknownSigner(Address),
}

/// Outcome of a mined transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: B256,
    pub success: bool,
}

#[async_trait]
pub trait Provider: Send + Sync {
    async fn chain_id(&self) -> Result<u64, ProviderError>;

    /// Accounts the provider can sign for.
    async fn accounts(&self) -> Result<Vec<Address>, ProviderError>;

    /// Read-only call against the latest state.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ProviderError>;

    /// Sign and broadcast a transaction from `from`.
    async fn send_transaction(
        &self,
        from: Address,
        to: Address,
        data: Bytes,
    ) -> Result<B256, ProviderError>;

    /// `None` while the transaction is still pending.
    async fn transaction_receipt(&self, tx_hash: B256) -> Result<Option<Receipt>, ProviderError>;
}

/// An established connection to the user's key-holding provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    signer: Address,
    chain_id: u64,
}

impl Session {
    pub fn signer(&self) -> Address {
        self.signer
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }
}

pub struct Gateway;

impl Gateway {
    /// Ask the provider for a signing account. Uses `preferred` when given,
    /// otherwise the first account the provider exposes.
    pub async fn connect(
        provider: &dyn Provider,
        preferred: Option<Address>,
    ) -> Result<Session, ProviderError> {
        let accounts = provider.accounts().await?;
        let signer = match preferred {
            Some(wanted) if accounts.contains(&wanted) => wanted,
            Some(wanted) => return Err(ProviderError::UnknownSigner(wanted)),
            None => *accounts.first().ok_or(ProviderError::NoAccounts)?,
        };
        let chain_id = provider.chain_id().await?;

        tracing::info!("Connected signer {} on chain {}", signer, chain_id);
        Ok(Session { signer, chain_id })
    }
}
