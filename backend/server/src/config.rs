use alloy_primitives::Address;
use anyhow::Context;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainMode {
    /// Ethereum JSON-RPC node with unlocked accounts.
    Rpc { url: String, contract: Address },
    /// In-process ledger, for local development.
    Dev {
        owners: Vec<Address>,
        required: usize,
        balance_eth: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: String,
    pub chain: ChainMode,
    pub signer: Option<Address>,
    pub refresh_interval: Duration,
    pub receipt_timeout: Duration,
    pub receipt_poll: Duration,
    pub rpc_timeout: Duration,
}

/// Accounts the dev chain owns when `DEV_OWNERS` is unset.
pub const DEFAULT_DEV_OWNERS: [&str; 3] = [
    "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266",
    "0x70997970C51812dc3A010C7d01b50e0d17dc79C8",
    "0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC",
];

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let chain = match var("CHAIN_MODE").as_deref().unwrap_or("rpc") {
            "rpc" => ChainMode::Rpc {
                url: var("RPC_URL").unwrap_or_else(|| "http://127.0.0.1:8545".into()),
                contract: parse_address(
                    "CONTRACT_ADDRESS",
                    &var("CONTRACT_ADDRESS").context("CONTRACT_ADDRESS is required in rpc mode")?,
                )?,
            },
            "dev" => {
                let owners = match var("DEV_OWNERS") {
                    Some(list) => list
                        .split(',')
                        .filter(|s| !s.trim().is_empty())
                        .map(|s| parse_address("DEV_OWNERS", s))
                        .collect::<anyhow::Result<Vec<_>>>()?,
                    None => DEFAULT_DEV_OWNERS
                        .iter()
                        .map(|s| parse_address("DEV_OWNERS", s))
                        .collect::<anyhow::Result<Vec<_>>>()?,
                };
                ChainMode::Dev {
                    owners,
                    required: parse_number(&var, "DEV_REQUIRED", 2)? as usize,
                    balance_eth: var("DEV_BALANCE_ETH").unwrap_or_else(|| "10".into()),
                }
            }
            other => anyhow::bail!("CHAIN_MODE must be `rpc` or `dev`, got `{other}`"),
        };

        let signer = var("SIGNER_ADDRESS")
            .map(|s| parse_address("SIGNER_ADDRESS", &s))
            .transpose()?;

        Ok(Self {
            listen_addr: var("LISTEN_ADDR").unwrap_or_else(|| "0.0.0.0:3000".into()),
            chain,
            signer,
            refresh_interval: parse_period(&var, "REFRESH_INTERVAL_MS", 5_000)?,
            receipt_timeout: Duration::from_millis(parse_number(&var, "RECEIPT_TIMEOUT_MS", 60_000)?),
            receipt_poll: parse_period(&var, "RECEIPT_POLL_MS", 500)?,
            rpc_timeout: parse_period(&var, "RPC_TIMEOUT_MS", 10_000)?,
        })
    }
}

fn parse_address(key: &str, value: &str) -> anyhow::Result<Address> {
    common::types::parse_address(value)
        .with_context(|| format!("{key}: `{value}` is not a valid address"))
}

/// A millisecond period that drives a loop or a request deadline; zero is rejected.
fn parse_period(var: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> anyhow::Result<Duration> {
    let ms = parse_number(var, key, default)?;
    if ms == 0 {
        anyhow::bail!("{key} must be greater than zero");
    }
    Ok(Duration::from_millis(ms))
}

fn parse_number(var: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> anyhow::Result<u64> {
    match var(key) {
        Some(v) => v
            .trim()
            .parse()
            .with_context(|| format!("{key}: `{v}` is not a number")),
        None => Ok(default),
    }
}
