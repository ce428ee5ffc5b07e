use std::sync::Arc;
use std::time::Duration;

use crate::wallet::Wallet;

/// Keep the read model fresh: re-fetch on every tick and push changes to
/// WebSocket subscribers.
pub async fn run(wallet: Arc<Wallet>, interval: Duration) {
    tracing::info!("Refresher started, interval {:?}", interval);

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        match wallet.refresh().await {
            Ok(true) => {
                let snapshot = wallet.snapshot().await;
                tracing::info!(
                    "Wallet state changed: {} owners, {} transactions",
                    snapshot.owners.len(),
                    snapshot.transactions.len()
                );
            }
            Ok(false) => {}
            Err(e) => {
                tracing::error!("Refresh failed: {}", e);
            }
        }
    }
}
