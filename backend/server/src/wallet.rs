use alloy_primitives::{Address, B256, U256};
use common::{Snapshot, TransactionRecord};
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};

use crate::gateway::{Gateway, ProviderError, Session};
use crate::proxy::{ContractProxy, ProxyError};
use crate::read_model::{self, StateCache};

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("wallet is not connected")]
    NotConnected,
    #[error("connect failed: {0}")]
    Connect(#[from] ProviderError),
    #[error("transaction {0} sent but not yet mined")]
    Pending(B256),
    #[error(transparent)]
    Contract(#[from] ProxyError),
}

/// What a write invalidates in the read copy.
#[derive(Debug, Clone, Copy)]
enum Refetch {
    Owners,
    Transactions,
}

/// Service facade handed to the presentation layer: one session, one
/// contract, one cached read copy.
///
/// Chain reads never run under the cache lock; results are applied once they
/// arrive, so a stalled node cannot block snapshot readers.
pub struct Wallet {
    proxy: ContractProxy,
    preferred_signer: Option<Address>,
    session: RwLock<Option<Session>>,
    cache: RwLock<StateCache>,
    updates: broadcast::Sender<String>,
}

impl Wallet {
    pub fn new(
        proxy: ContractProxy,
        preferred_signer: Option<Address>,
        updates: broadcast::Sender<String>,
    ) -> Self {
        Self {
            proxy,
            preferred_signer,
            session: RwLock::new(None),
            cache: RwLock::new(StateCache::new()),
            updates,
        }
    }

    pub fn contract(&self) -> Address {
        self.proxy.address()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.updates.subscribe()
    }

    pub async fn session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.cache.read().await.snapshot()
    }

    /// Establish the session, then load owners and transactions.
    pub async fn connect(&self) -> Result<Session, WalletError> {
        let session = Gateway::connect(self.proxy.provider(), self.preferred_signer).await?;
        *self.session.write().await = Some(session.clone());

        if let Err(e) = self.refresh().await {
            tracing::warn!("Connected, but initial load failed: {}", e);
        }
        Ok(session)
    }

    pub async fn disconnect(&self) {
        if let Some(session) = self.session.write().await.take() {
            tracing::info!("Disconnected signer {}", session.signer());
        }
    }

    pub async fn submit_transaction(&self, to: Address, amount: U256) -> Result<B256, WalletError> {
        let session = self.require_session().await?;
        let result = self.proxy.submit_transaction(&session, to, amount).await;
        self.settle(result, Refetch::Transactions).await
    }

    pub async fn confirm_transaction(&self, index: U256) -> Result<B256, WalletError> {
        let session = self.require_session().await?;
        let result = self.proxy.confirm_transaction(&session, index).await;
        self.settle(result, Refetch::Transactions).await
    }

    pub async fn add_owner(&self, owner: Address) -> Result<B256, WalletError> {
        let session = self.require_session().await?;
        let result = self.proxy.add_owner(&session, owner).await;
        self.settle(result, Refetch::Owners).await
    }

    pub async fn remove_owner(&self, owner: Address) -> Result<B256, WalletError> {
        let session = self.require_session().await?;
        let result = self.proxy.remove_owner(&session, owner).await;
        self.settle(result, Refetch::Owners).await
    }

    /// Re-fetch owners and transactions. Returns whether anything changed.
    pub async fn refresh(&self) -> Result<bool, WalletError> {
        let owners = self.proxy.owners().await?;
        let transactions = self.load_transactions().await;

        let mut cache = self.cache.write().await;
        let before = cache.snapshot();
        cache.apply_owners(owners);
        cache.apply_transactions(transactions);
        let after = cache.snapshot();
        drop(cache);

        let changed = !before.same_state(&after);
        if changed {
            self.publish(&after);
        }
        Ok(changed)
    }

    /// A sent write whose receipt never arrived may still land, so the read
    /// copy is refreshed for it as for a mined one.
    async fn settle(
        &self,
        result: Result<B256, ProxyError>,
        refetch: Refetch,
    ) -> Result<B256, WalletError> {
        match result {
            Ok(tx_hash) => {
                self.refetch(refetch).await;
                Ok(tx_hash)
            }
            Err(ProxyError::Pending(tx_hash, waited)) => {
                tracing::warn!("Transaction {} not mined after {:?}", tx_hash, waited);
                self.refetch(refetch).await;
                Err(WalletError::Pending(tx_hash))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn refetch(&self, refetch: Refetch) {
        match refetch {
            Refetch::Owners => self.refresh_owners().await,
            Refetch::Transactions => self.refresh_transactions().await,
        }
    }

    async fn refresh_owners(&self) {
        let owners = match self.proxy.owners().await {
            Ok(owners) => owners,
            Err(e) => {
                tracing::error!("Failed to re-fetch owners: {}", e);
                return;
            }
        };
        let snapshot = {
            let mut cache = self.cache.write().await;
            cache.apply_owners(owners);
            cache.snapshot()
        };
        self.publish(&snapshot);
    }

    async fn refresh_transactions(&self) {
        let transactions = self.load_transactions().await;
        let snapshot = {
            let mut cache = self.cache.write().await;
            cache.apply_transactions(transactions);
            cache.snapshot()
        };
        self.publish(&snapshot);
    }

    async fn load_transactions(&self) -> Vec<TransactionRecord> {
        let known = self.cache.read().await.known_terminal();
        let listing = read_model::list_transactions(&self.proxy, &known).await;
        tracing::debug!(
            "Listed {} transactions with {} reads",
            listing.records.len(),
            listing.reads
        );
        listing.records
    }

    async fn require_session(&self) -> Result<Session, WalletError> {
        self.session
            .read()
            .await
            .clone()
            .ok_or(WalletError::NotConnected)
    }

    fn publish(&self, snapshot: &Snapshot) {
        let event = serde_json::json!({
            "type": "snapshot",
            "snapshot": snapshot,
        });
        // No subscribers is fine.
        let _ = self.updates.send(event.to_string());
    }
}
