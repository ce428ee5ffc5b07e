use alloy_primitives::B256;
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use common::types::{format_amount, parse_address, parse_amount, parse_index};
use common::TransactionRecord;
use serde::Deserialize;
use std::sync::Arc;

use crate::wallet::{Wallet, WalletError};
use crate::ws;

const CONNECT_FAILED: &str = "Failed to connect wallet";
const TRANSACTION_FAILED: &str = "Transaction failed";
const LOAD_FAILED: &str = "Failed to load wallet state";
const TRANSACTION_PENDING: &str = "Transaction pending";

#[derive(Clone)]
pub struct AppState {
    pub wallet: Arc<Wallet>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/connect", post(connect))
        .route("/api/disconnect", post(disconnect))
        .route("/api/session", get(session))
        .route("/api/owners", get(list_owners).post(add_owner))
        .route("/api/owners/{owner}", delete(remove_owner))
        .route("/api/transactions", get(list_transactions).post(submit_transaction))
        .route("/api/transactions/{index}/confirm", post(confirm_transaction))
        .route("/api/refresh", post(refresh))
        .route("/api/health", get(health))
        .route("/ws", get(ws_upgrade))
        .with_state(state)
}

/// Every failure reaches the client as one generic message; the cause is
/// only logged. A write that was sent but not mined in time is accepted,
/// not failed.
#[derive(Debug)]
enum ApiError {
    BadRequest(&'static str),
    NotConnected,
    Pending(B256),
    Failed(&'static str),
}

impl ApiError {
    fn from_wallet(err: WalletError, message: &'static str) -> Self {
        match err {
            WalletError::NotConnected => ApiError::NotConnected,
            WalletError::Pending(tx_hash) => ApiError::Pending(tx_hash),
            other => {
                tracing::error!("{}: {}", message, other);
                ApiError::Failed(message)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Pending(tx_hash) => {
                return (StatusCode::ACCEPTED, done(TRANSACTION_PENDING, tx_hash)).into_response();
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotConnected => (StatusCode::CONFLICT, "Wallet not connected"),
            ApiError::Failed(msg) => (StatusCode::BAD_GATEWAY, msg),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

fn done(message: &str, tx_hash: impl serde::Serialize) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": message,
        "tx_hash": tx_hash,
    }))
}

fn transaction_json(tx: &TransactionRecord) -> serde_json::Value {
    serde_json::json!({
        "index": tx.index,
        "to": tx.to,
        "amount": tx.amount.to_string(),
        "amount_eth": format_amount(tx.amount),
        "executed": tx.executed,
        "confirmations": tx.confirmations.to_string(),
    })
}

async fn connect(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    match state.wallet.connect().await {
        Ok(session) => Ok(Json(serde_json::json!({
            "message": "Wallet connected",
            "session": session,
        }))),
        Err(e) => {
            tracing::error!("{}: {}", CONNECT_FAILED, e);
            Err(ApiError::Failed(CONNECT_FAILED))
        }
    }
}

async fn disconnect(State(state): State<AppState>) -> impl IntoResponse {
    state.wallet.disconnect().await;
    Json(serde_json::json!({ "message": "Wallet disconnected" }))
}

async fn session(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({ "session": state.wallet.session().await }))
}

async fn list_owners(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.wallet.snapshot().await;
    Json(serde_json::json!({
        "owners": snapshot.owners,
        "refreshed_at_ms": snapshot.refreshed_at_ms,
    }))
}

async fn list_transactions(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.wallet.snapshot().await;
    Json(serde_json::json!({
        "transactions": snapshot.transactions.iter().map(transaction_json).collect::<Vec<_>>(),
        "refreshed_at_ms": snapshot.refreshed_at_ms,
    }))
}

#[derive(Deserialize)]
struct SubmitBody {
    to: String,
    /// Ether, as typed by the user.
    amount: String,
}

async fn submit_transaction(
    State(state): State<AppState>,
    Json(body): Json<SubmitBody>,
) -> Result<impl IntoResponse, ApiError> {
    let to = parse_address(&body.to).ok_or(ApiError::BadRequest("Invalid recipient address"))?;
    let amount = parse_amount(&body.amount).ok_or(ApiError::BadRequest("Invalid amount"))?;

    let tx_hash = state
        .wallet
        .submit_transaction(to, amount)
        .await
        .map_err(|e| ApiError::from_wallet(e, TRANSACTION_FAILED))?;
    Ok(done("Transaction submitted", tx_hash))
}

async fn confirm_transaction(
    State(state): State<AppState>,
    Path(index): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let index = parse_index(&index).ok_or(ApiError::BadRequest("Invalid transaction index"))?;

    let tx_hash = state
        .wallet
        .confirm_transaction(index)
        .await
        .map_err(|e| ApiError::from_wallet(e, TRANSACTION_FAILED))?;
    Ok(done("Transaction confirmed", tx_hash))
}

#[derive(Deserialize)]
struct OwnerBody {
    owner: String,
}

async fn add_owner(
    State(state): State<AppState>,
    Json(body): Json<OwnerBody>,
) -> Result<impl IntoResponse, ApiError> {
    let owner = parse_address(&body.owner).ok_or(ApiError::BadRequest("Invalid owner address"))?;

    let tx_hash = state
        .wallet
        .add_owner(owner)
        .await
        .map_err(|e| ApiError::from_wallet(e, TRANSACTION_FAILED))?;
    Ok(done("Owner added", tx_hash))
}

async fn remove_owner(
    State(state): State<AppState>,
    Path(owner): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let owner = parse_address(&owner).ok_or(ApiError::BadRequest("Invalid owner address"))?;

    let tx_hash = state
        .wallet
        .remove_owner(owner)
        .await
        .map_err(|e| ApiError::from_wallet(e, TRANSACTION_FAILED))?;
    Ok(done("Owner removed", tx_hash))
}

async fn refresh(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let changed = state
        .wallet
        .refresh()
        .await
        .map_err(|e| ApiError::from_wallet(e, LOAD_FAILED))?;
    Ok(Json(serde_json::json!({
        "changed": changed,
        "snapshot": state.wallet.snapshot().await,
    })))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.wallet.session().await;
    let snapshot = state.wallet.snapshot().await;

    Json(serde_json::json!({
        "status": "ok",
        "contract": state.wallet.contract(),
        "connected": session.is_some(),
        "chain_id": session.map(|s| s.chain_id()),
        "refreshed_at_ms": snapshot.refreshed_at_ms,
    }))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws::handle_socket(socket, state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::tests::owner;
    use crate::read_model::tests::CountingProvider;
    use crate::wallet::tests::{impatient_wallet, wallet};
    use axum::body::Body;
    use axum::http::{header, Request};
    use tower::ServiceExt;

    fn app() -> (Arc<CountingProvider>, Router) {
        let (provider, wallet) = wallet();
        let state = AppState {
            wallet: Arc::new(wallet),
        };
        (provider, router(state))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, serde_json::Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn mutations_require_a_connection() {
        let (provider, app) = app();
        let (status, body) = send(
            &app,
            "POST",
            "/api/transactions",
            Some(serde_json::json!({ "to": owner(9).to_string(), "amount": "1" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "Wallet not connected");
        assert_eq!(provider.sends(), 0);
    }

    #[tokio::test]
    async fn owner_management_round() {
        let (_, app) = app();
        let (status, body) = send(&app, "POST", "/api/connect", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Wallet connected");

        let (status, body) = send(
            &app,
            "POST",
            "/api/owners",
            Some(serde_json::json!({ "owner": owner(4).to_string() })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Owner added");

        let (_, body) = send(&app, "GET", "/api/owners", None).await;
        assert_eq!(body["owners"].as_array().unwrap().len(), 4);

        let uri = format!("/api/owners/{}", owner(2));
        let (status, body) = send(&app, "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Owner removed");

        let (_, body) = send(&app, "GET", "/api/owners", None).await;
        assert_eq!(body["owners"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn submit_and_confirm_flow() {
        let (_, app) = app();
        send(&app, "POST", "/api/connect", None).await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/transactions",
            Some(serde_json::json!({ "to": owner(9).to_string(), "amount": "0.5" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Transaction submitted");

        let (status, body) = send(&app, "POST", "/api/transactions/0/confirm", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Transaction confirmed");

        let (_, body) = send(&app, "GET", "/api/transactions", None).await;
        let txs = body["transactions"].as_array().unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0]["amount"], "500000000000000000");
        assert_eq!(txs[0]["confirmations"], "1");
        assert_eq!(txs[0]["executed"], false);
    }

    #[tokio::test]
    async fn contract_failures_collapse_into_a_generic_message() {
        let (_, app) = app();
        send(&app, "POST", "/api/connect", None).await;

        let (status, body) = send(&app, "POST", "/api/transactions/7/confirm", None).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "Transaction failed");
    }

    #[tokio::test]
    async fn unmined_write_is_accepted_as_pending() {
        let (provider, wallet) = impatient_wallet();
        let app = router(AppState {
            wallet: Arc::new(wallet),
        });
        send(&app, "POST", "/api/connect", None).await;
        provider.withhold_receipts();

        let (status, body) = send(
            &app,
            "POST",
            "/api/owners",
            Some(serde_json::json!({ "owner": owner(4).to_string() })),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["message"], "Transaction pending");
        assert!(body["tx_hash"].as_str().unwrap().starts_with("0x"));

        let (_, body) = send(&app, "GET", "/api/owners", None).await;
        assert_eq!(body["owners"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn malformed_input_is_rejected_before_any_rpc() {
        let (provider, app) = app();
        send(&app, "POST", "/api/connect", None).await;
        let sends = provider.sends();

        let (status, body) = send(
            &app,
            "POST",
            "/api/transactions",
            Some(serde_json::json!({ "to": owner(9).to_string(), "amount": "lots" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid amount");

        let (status, _) = send(&app, "POST", "/api/transactions/abc/confirm", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, "DELETE", "/api/owners/0x1234", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(provider.sends(), sends);
    }

    #[tokio::test]
    async fn health_reports_connection() {
        let (_, app) = app();
        let (_, body) = send(&app, "GET", "/api/health", None).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["connected"], false);

        send(&app, "POST", "/api/connect", None).await;
        let (_, body) = send(&app, "GET", "/api/health", None).await;
        assert_eq!(body["connected"], true);
        assert_eq!(body["chain_id"], 31337);
    }
}
