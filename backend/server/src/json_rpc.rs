use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::gateway::{Provider, ProviderError, Receipt};

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CallRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<Address>,
    to: Address,
    data: Bytes,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: B256,
    status: Option<U256>,
}

/// Ethereum JSON-RPC over HTTP. The node's unlocked accounts sign.
pub struct JsonRpcProvider {
    http: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl JsonRpcProvider {
    /// `timeout` bounds every request, so a stalled node surfaces as an error.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    async fn request<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<Option<T>, ProviderError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        tracing::debug!("rpc {} #{}", method, id);
        let response: RpcResponse<T> = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = response.error {
            // Geth and friends report reverts as code 3 or with a message prefix.
            if err.code == 3 || err.message.contains("revert") {
                return Err(ProviderError::Reverted(err.message));
            }
            return Err(ProviderError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        Ok(response.result)
    }

    async fn required<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, ProviderError> {
        self.request(method, params)
            .await?
            .ok_or_else(|| ProviderError::Malformed(format!("{method} returned no result")))
    }
}

#[async_trait]
impl Provider for JsonRpcProvider {
    async fn chain_id(&self) -> Result<u64, ProviderError> {
        let id: U256 = self.required("eth_chainId", json!([])).await?;
        u64::try_from(id).map_err(|_| ProviderError::Malformed(format!("chain id {id}")))
    }

    async fn accounts(&self) -> Result<Vec<Address>, ProviderError> {
        self.required("eth_accounts", json!([])).await
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ProviderError> {
        let req = CallRequest {
            from: None,
            to,
            data,
        };
        self.required("eth_call", json!([req, "latest"])).await
    }

    async fn send_transaction(
        &self,
        from: Address,
        to: Address,
        data: Bytes,
    ) -> Result<B256, ProviderError> {
        let req = CallRequest {
            from: Some(from),
            to,
            data,
        };
        self.required("eth_sendTransaction", json!([req])).await
    }

    async fn transaction_receipt(&self, tx_hash: B256) -> Result<Option<Receipt>, ProviderError> {
        let receipt: Option<RpcReceipt> = self
            .request("eth_getTransactionReceipt", json!([tx_hash]))
            .await?;
        Ok(receipt.map(|r| Receipt {
            tx_hash: r.transaction_hash,
            // Pre-Byzantium receipts carry no status; treat them as mined.
            success: r.status.map_or(true, |s| s == U256::from(1u64)),
        }))
    }
}
