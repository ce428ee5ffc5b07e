use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;
use common::abi;
use common::TransactionRecord;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::gateway::{Provider, ProviderError, Session};

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("could not decode {function} return data: {source}")]
    Decode {
        function: &'static str,
        source: alloy_sol_types::Error,
    },
    #[error("transaction {0} reverted")]
    Reverted(B256),
    #[error("transaction {0} still pending after {1:?}")]
    Pending(B256, Duration),
}

/// Typed access to the wallet contract deployed at `address`.
#[derive(Clone)]
pub struct ContractProxy {
    provider: Arc<dyn Provider>,
    address: Address,
    receipt_timeout: Duration,
    receipt_poll: Duration,
}

impl ContractProxy {
    pub fn new(provider: Arc<dyn Provider>, address: Address) -> Self {
        Self {
            provider,
            address,
            receipt_timeout: Duration::from_secs(60),
            receipt_poll: Duration::from_millis(500),
        }
    }

    pub fn with_receipt_wait(mut self, timeout: Duration, poll: Duration) -> Self {
        self.receipt_timeout = timeout;
        self.receipt_poll = poll;
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn provider(&self) -> &dyn Provider {
        self.provider.as_ref()
    }

    pub async fn owners(&self) -> Result<Vec<Address>, ProxyError> {
        let ret = self.view(abi::getOwnersCall {}).await?;
        Ok(ret._0)
    }

    /// Read the record at `index`. Fails when the contract reverts, which it
    /// does for indices past the end.
    pub async fn transaction(&self, index: u64) -> Result<TransactionRecord, ProxyError> {
        let ret = self
            .view(abi::transactionsCall {
                index: U256::from(index),
            })
            .await?;
        Ok(TransactionRecord {
            index,
            to: ret.to,
            amount: ret.amount,
            executed: ret.executed,
            confirmations: ret.confirmations,
        })
    }

    pub async fn submit_transaction(
        &self,
        session: &Session,
        to: Address,
        amount: U256,
    ) -> Result<B256, ProxyError> {
        self.transact(session, abi::submitTransactionCall { to, amount })
            .await
    }

    pub async fn confirm_transaction(
        &self,
        session: &Session,
        index: U256,
    ) -> Result<B256, ProxyError> {
        self.transact(session, abi::confirmTransactionCall { txIndex: index })
            .await
    }

    pub async fn add_owner(&self, session: &Session, owner: Address) -> Result<B256, ProxyError> {
        self.transact(session, abi::addOwnerCall { newOwner: owner })
            .await
    }

    pub async fn remove_owner(&self, session: &Session, owner: Address) -> Result<B256, ProxyError> {
        self.transact(session, abi::removeOwnerCall { owner })
            .await
    }

    async fn view<C: SolCall>(&self, call: C) -> Result<C::Return, ProxyError> {
        let data = Bytes::from(call.abi_encode());
        let out = self.provider.call(self.address, data).await?;
        C::abi_decode_returns(&out, true).map_err(|source| ProxyError::Decode {
            function: C::SIGNATURE,
            source,
        })
    }

    async fn transact<C: SolCall>(&self, session: &Session, call: C) -> Result<B256, ProxyError> {
        let data = Bytes::from(call.abi_encode());
        let tx_hash = self
            .provider
            .send_transaction(session.signer(), self.address, data)
            .await?;
        tracing::info!("Sent {} as {}", C::SIGNATURE, tx_hash);

        self.wait_for_receipt(tx_hash).await
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<B256, ProxyError> {
        let deadline = tokio::time::Instant::now() + self.receipt_timeout;
        loop {
            if let Some(receipt) = self.provider.transaction_receipt(tx_hash).await? {
                if !receipt.success {
                    return Err(ProxyError::Reverted(receipt.tx_hash));
                }
                return Ok(receipt.tx_hash);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ProxyError::Pending(tx_hash, self.receipt_timeout));
            }
            tokio::time::sleep(self.receipt_poll).await;
        }
    }
}
