use alloy_primitives::Address;
use common::{Snapshot, TransactionRecord};
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZero;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::proxy::ContractProxy;

/// The contract has no length getter; listing reads at most this many indices.
pub const MAX_LISTED_TRANSACTIONS: u64 = 10;

/// One slot per index the listing can reach.
const TERMINAL_CACHE_SIZE: NonZero<usize> = match NonZero::new(MAX_LISTED_TRANSACTIONS as usize) {
    Some(size) => size,
    None => panic!("listing limit must be non-zero"),
};

/// Result of walking the transaction indices.
#[derive(Debug)]
pub struct Listing {
    pub records: Vec<TransactionRecord>,
    /// Contract reads issued; indices served from `known` cost none.
    pub reads: usize,
}

/// Read indices from 0 upward and keep what answered. The first failing read
/// ends the listing; it is never an error on its own.
///
/// `known` holds executed records from earlier listings, which are reused
/// instead of read again.
pub async fn list_transactions(
    proxy: &ContractProxy,
    known: &HashMap<u64, TransactionRecord>,
) -> Listing {
    let mut records = Vec::new();
    let mut reads = 0;

    for index in 0..MAX_LISTED_TRANSACTIONS {
        if let Some(record) = known.get(&index) {
            records.push(record.clone());
            continue;
        }

        reads += 1;
        match proxy.transaction(index).await {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::debug!("Transaction listing stopped at index {}: {}", index, e);
                break;
            }
        }
    }

    Listing { records, reads }
}

/// Cached read copy of the contract. Holds no I/O: callers read from the
/// chain first and apply the results here.
pub struct StateCache {
    owners: Vec<Address>,
    transactions: Vec<TransactionRecord>,
    /// Executed records by index. They never change once executed.
    terminal: LruCache<u64, TransactionRecord>,
    refreshed_at_ms: u64,
}

impl Default for StateCache {
    fn default() -> Self {
        Self::new()
    }
}

impl StateCache {
    pub fn new() -> Self {
        Self {
            owners: Vec::new(),
            transactions: Vec::new(),
            terminal: LruCache::new(TERMINAL_CACHE_SIZE),
            refreshed_at_ms: 0,
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            owners: self.owners.clone(),
            transactions: self.transactions.clone(),
            refreshed_at_ms: self.refreshed_at_ms,
        }
    }

    /// Executed records to pass to [`list_transactions`].
    pub fn known_terminal(&self) -> HashMap<u64, TransactionRecord> {
        self.terminal
            .iter()
            .map(|(index, record)| (*index, record.clone()))
            .collect()
    }

    pub fn apply_owners(&mut self, owners: Vec<Address>) {
        self.owners = owners;
        self.touch();
    }

    pub fn apply_transactions(&mut self, records: Vec<TransactionRecord>) {
        for record in records.iter().filter(|r| r.is_terminal()) {
            self.terminal.put(record.index, record.clone());
        }
        self.transactions = records;
        self.touch();
    }

    fn touch(&mut self) {
        self.refreshed_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::dev_chain::DevChain;
    use crate::gateway::tests::{dev_chain, owner};
    use crate::gateway::{Provider, ProviderError, Receipt};
    use alloy_primitives::{Bytes, B256, U256};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Wraps the dev chain, counts calls and can be told to misbehave.
    pub struct CountingProvider {
        pub inner: DevChain,
        pub calls: AtomicUsize,
        pub sends: AtomicUsize,
        stall_reads: AtomicBool,
        withhold_receipts: AtomicBool,
    }

    impl CountingProvider {
        pub fn new(inner: DevChain) -> Self {
            Self {
                inner,
                calls: AtomicUsize::new(0),
                sends: AtomicUsize::new(0),
                stall_reads: AtomicBool::new(false),
                withhold_receipts: AtomicBool::new(false),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn sends(&self) -> usize {
            self.sends.load(Ordering::SeqCst)
        }

        /// Reads from now on never answer.
        pub fn stall_reads(&self) {
            self.stall_reads.store(true, Ordering::SeqCst);
        }

        /// Transactions still apply but never get a receipt.
        pub fn withhold_receipts(&self) {
            self.withhold_receipts.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Provider for CountingProvider {
        async fn chain_id(&self) -> Result<u64, ProviderError> {
            self.inner.chain_id().await
        }
        async fn accounts(&self) -> Result<Vec<Address>, ProviderError> {
            self.inner.accounts().await
        }
        async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.stall_reads.load(Ordering::SeqCst) {
                return std::future::pending().await;
            }
            self.inner.call(to, data).await
        }
        async fn send_transaction(
            &self,
            from: Address,
            to: Address,
            data: Bytes,
        ) -> Result<B256, ProviderError> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            self.inner.send_transaction(from, to, data).await
        }
        async fn transaction_receipt(
            &self,
            tx_hash: B256,
        ) -> Result<Option<Receipt>, ProviderError> {
            if self.withhold_receipts.load(Ordering::SeqCst) {
                return Ok(None);
            }
            self.inner.transaction_receipt(tx_hash).await
        }
    }

    fn setup(pending: u64, executed: u64) -> (Arc<CountingProvider>, ContractProxy) {
        let chain = dev_chain();
        chain.with_ledger(|l| {
            for i in 0..(pending + executed) {
                l.submit(owner(1), owner(9), U256::from(1u64)).unwrap();
                if i < executed {
                    l.confirm(owner(1), U256::from(i)).unwrap();
                    l.confirm(owner(2), U256::from(i)).unwrap();
                }
            }
        });
        let contract = chain.contract();
        let provider = Arc::new(CountingProvider::new(chain));
        let proxy = ContractProxy::new(provider.clone(), contract);
        (provider, proxy)
    }

    async fn refresh(cache: &mut StateCache, proxy: &ContractProxy) -> usize {
        let listing = list_transactions(proxy, &cache.known_terminal()).await;
        cache.apply_transactions(listing.records);
        listing.reads
    }

    #[tokio::test]
    async fn listing_stops_at_first_missing_index() {
        let (provider, proxy) = setup(3, 0);
        let mut cache = StateCache::new();

        assert_eq!(refresh(&mut cache, &proxy).await, 4);
        assert_eq!(provider.calls(), 4);
        let indices: Vec<u64> = cache.snapshot().transactions.iter().map(|t| t.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn listing_never_exceeds_the_limit() {
        let (provider, proxy) = setup(15, 0);
        let mut cache = StateCache::new();

        refresh(&mut cache, &proxy).await;
        assert_eq!(provider.calls(), MAX_LISTED_TRANSACTIONS as usize);
        assert_eq!(cache.snapshot().transactions.len(), MAX_LISTED_TRANSACTIONS as usize);
    }

    #[tokio::test]
    async fn empty_contract_lists_nothing_after_one_read() {
        let (provider, proxy) = setup(0, 0);
        let mut cache = StateCache::new();

        refresh(&mut cache, &proxy).await;
        assert_eq!(provider.calls(), 1);
        assert!(cache.snapshot().transactions.is_empty());
    }

    #[tokio::test]
    async fn executed_records_are_not_read_twice() {
        let (provider, proxy) = setup(1, 2);
        let mut cache = StateCache::new();

        assert_eq!(refresh(&mut cache, &proxy).await, 4);
        assert_eq!(provider.calls(), 4);
        assert!(cache.snapshot().transactions[0].executed);
        assert!(cache.snapshot().transactions[1].executed);
        assert!(!cache.snapshot().transactions[2].executed);
        assert_eq!(cache.known_terminal().len(), 2);

        // Indices 0 and 1 come from the cache: only 2 and the missing 3 are read.
        assert_eq!(refresh(&mut cache, &proxy).await, 2);
        assert_eq!(provider.calls(), 6);
        assert_eq!(cache.snapshot().transactions.len(), 3);
    }

    #[test]
    fn terminal_cache_holds_every_listable_index() {
        let mut cache = StateCache::new();
        let records: Vec<TransactionRecord> = (0..MAX_LISTED_TRANSACTIONS)
            .map(|index| TransactionRecord {
                index,
                to: owner(9),
                amount: U256::from(1u64),
                executed: true,
                confirmations: U256::from(2u64),
            })
            .collect();

        cache.apply_transactions(records);
        assert_eq!(TERMINAL_CACHE_SIZE.get(), MAX_LISTED_TRANSACTIONS as usize);
        assert_eq!(cache.known_terminal().len(), MAX_LISTED_TRANSACTIONS as usize);
    }

    #[tokio::test]
    async fn owners_refresh_updates_snapshot() {
        let (_, proxy) = setup(0, 0);
        let mut cache = StateCache::new();
        assert_eq!(cache.snapshot().refreshed_at_ms, 0);

        cache.apply_owners(proxy.owners().await.unwrap());
        let snapshot = cache.snapshot();
        assert_eq!(snapshot.owners, vec![owner(1), owner(2), owner(3)]);
        assert!(snapshot.refreshed_at_ms > 0);
    }
}
