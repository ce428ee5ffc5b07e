use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::api::AppState;
use crate::wallet::Wallet;

pub async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Channel for sending messages to the client (initial state, broadcasts, replies)
    let (tx, mut rx) = mpsc::channel::<String>(256);

    // Subscribe before reading the snapshot so no update slips in between
    let mut updates = state.wallet.subscribe();

    let initial = snapshot_message(&state.wallet).await;
    if tx.send(initial).await.is_err() {
        return;
    }

    let updates_tx = tx.clone();
    let broadcast_task = tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(msg) => {
                    if updates_tx.send(msg).await.is_err() {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("WebSocket subscriber lagged, skipped {} updates", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    let wallet = state.wallet.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            if let Message::Text(text) = msg {
                handle_client_message(&text, &wallet, &tx).await;
            }
        }
    });

    tokio::select! {
        _ = broadcast_task => {},
        _ = send_task => {},
        _ = recv_task => {},
    }
}

async fn handle_client_message(text: &str, wallet: &Arc<Wallet>, sender: &mpsc::Sender<String>) {
    let msg: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => return,
    };

    // A client that missed updates asks for the current state again.
    if msg.get("type").and_then(|t| t.as_str()) == Some("snapshot") {
        let _ = sender.send(snapshot_message(wallet).await).await;
    }
}

async fn snapshot_message(wallet: &Wallet) -> String {
    serde_json::json!({
        "type": "snapshot",
        "snapshot": wallet.snapshot().await,
    })
    .to_string()
}
