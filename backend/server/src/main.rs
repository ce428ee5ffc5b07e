mod api;
mod config;
mod dev_chain;
mod gateway;
mod json_rpc;
mod proxy;
mod read_model;
mod refresher;
mod wallet;
mod ws;

use alloy_primitives::{address, Address};
use anyhow::Context;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;

use config::ChainMode;
use dev_chain::DevChain;
use gateway::Provider;
use json_rpc::JsonRpcProvider;
use std::time::Duration;

/// Where the dev chain pretends the wallet contract is deployed.
const DEV_CONTRACT: Address = address!("5FbDB2315678afecb367f032d93F642f64180aa3");

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!("Failed to register SIGTERM handler: {}", e);
            let _ = ctrl_c.await;
            tracing::info!("Received SIGINT, shutting down...");
            return;
        }
    };
    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, shutting down..."),
        _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down..."),
    }
}

fn build_provider(chain: &ChainMode, rpc_timeout: Duration) -> anyhow::Result<(Arc<dyn Provider>, Address)> {
    match chain {
        ChainMode::Rpc { url, contract } => {
            tracing::info!("Using JSON-RPC node at {} for contract {}", url, contract);
            let provider: Arc<dyn Provider> = Arc::new(JsonRpcProvider::new(url.clone(), rpc_timeout)?);
            Ok((provider, *contract))
        }
        ChainMode::Dev {
            owners,
            required,
            balance_eth,
        } => {
            let balance = common::types::parse_amount(balance_eth)
                .with_context(|| format!("DEV_BALANCE_ETH: `{balance_eth}` is not an amount"))?;
            let ledger = common::MultisigLedger::new(owners.clone(), *required, balance)
                .context("invalid dev wallet setup")?;
            tracing::info!(
                "Using dev chain: {} owners, {} required, {} ETH",
                owners.len(),
                required,
                balance_eth
            );
            let chain = DevChain::new(DEV_CONTRACT, owners.clone(), ledger);
            let contract = chain.contract();
            let provider: Arc<dyn Provider> = Arc::new(chain);
            Ok((provider, contract))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("multisig_server=info".parse()?),
        )
        .init();

    let config = config::Config::from_env()?;
    tracing::info!("Starting server on {}", config.listen_addr);

    let (provider, contract) = build_provider(&config.chain, config.rpc_timeout)?;
    let proxy = proxy::ContractProxy::new(provider, contract)
        .with_receipt_wait(config.receipt_timeout, config.receipt_poll);

    let (updates_tx, _) = broadcast::channel::<String>(256);
    let wallet = Arc::new(wallet::Wallet::new(proxy, config.signer, updates_tx));

    // Start refresher task
    let refresher_wallet = wallet.clone();
    let interval = config.refresh_interval;
    tokio::spawn(async move {
        refresher::run(refresher_wallet, interval).await;
    });

    let state = api::AppState { wallet };
    let app = api::router(state).layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    tracing::info!("Server listening on {}", config.listen_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped.");
    Ok(())
}
