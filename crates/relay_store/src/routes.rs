//! HTTP and WebSocket routes for the relay (spec.md §6).
//!
//! Mechanical dispatch onto [`crate::store::RelayStore`]; the only logic
//! that lives here is header parsing, challenge construction, and the
//! WebSocket subscribe handshake.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::auth::{
    addresses_match, mailbox_challenge, message_challenge, read_receipt_challenge, recover_address,
    subscribe_challenge,
};
use crate::config::RelayConfig;
use crate::envelope::MessageEnvelope;
use crate::error::{RelayError, RelayResult};
use crate::store::RelayStore;
use crate::subscriber::ServerFrame;

/// Shared state behind every relay route.
pub struct RelayServerState {
    store: Arc<RelayStore>,
    config: RelayConfig,
}

impl RelayServerState {
    /// Builds relay server state over `store`, using `config` for
    /// freshness windows and envelope/connection ceilings.
    #[must_use]
    pub fn new(store: Arc<RelayStore>, config: RelayConfig) -> Self {
        Self { store, config }
    }

    /// Currently connected WebSocket subscribers, for the combined
    /// `/metrics` endpoint `http_adapter` exposes.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.store.subscribers().len()
    }

    /// Messages queued for offline recipients, for the combined
    /// `/metrics` endpoint `http_adapter` exposes.
    #[must_use]
    pub fn pending_message_count(&self) -> usize {
        self.store.pending_count()
    }
}

/// Builds the relay's axum router: `/send`, `/messages/:address`,
/// `/message/:id`, `/read/:id`, `/ws`.
///
/// Metrics are not mounted here: `http_adapter` owns a single combined
/// `/metrics` endpoint across Node, relay, and rate-limiter counters, and
/// calls [`RelayServerState::subscriber_count`] directly for the relay's
/// contribution.
pub fn router(state: Arc<RelayServerState>) -> Router {
    Router::new()
        .route("/send", post(send))
        .route("/messages/{address}", get(mailbox))
        .route("/message/{id}", get(message))
        .route("/read/{id}", post(mark_read))
        .route("/ws", get(websocket))
        .with_state(state)
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

#[derive(Debug, Serialize)]
struct SendResponse {
    success: bool,
    #[serde(rename = "messageId")]
    message_id: String,
    cid: String,
    timestamp: u64,
    delivered: bool,
}

async fn send(
    State(state): State<Arc<RelayServerState>>,
    Json(envelope): Json<MessageEnvelope>,
) -> RelayResult<Json<SendResponse>> {
    let outcome = state.store.submit(envelope, now_ms())?;
    Ok(Json(SendResponse {
        success: true,
        message_id: outcome.message_id,
        cid: outcome.cid,
        timestamp: outcome.timestamp,
        delivered: outcome.delivered,
    }))
}

/// Verifies the `x-jeju-signature`/`x-jeju-timestamp` headers against
/// `challenge`, and confirms the recovered address is one of
/// `authorized`. Returns the recovered address.
fn verify_auth_headers(
    headers: &HeaderMap,
    challenge: &str,
    authorized: &[&str],
    auth_window: Duration,
) -> RelayResult<String> {
    let signature = headers
        .get("x-jeju-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| RelayError::AuthError("missing x-jeju-signature".to_string()))?;
    let timestamp: u64 = headers
        .get("x-jeju-timestamp")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| RelayError::AuthError("missing or malformed x-jeju-timestamp".to_string()))?;

    let age = now_ms().saturating_sub(timestamp);
    if age > auth_window.as_millis() as u64 {
        return Err(RelayError::AuthError("timestamp expired".to_string()));
    }

    let recovered = recover_address(challenge, signature)?;
    if !authorized.iter().any(|addr| addresses_match(addr, &recovered)) {
        return Err(RelayError::AuthError("signer is not authorized for this resource".to_string()));
    }
    Ok(recovered)
}

async fn mailbox(
    State(state): State<Arc<RelayServerState>>,
    Path(address): Path<String>,
    headers: HeaderMap,
) -> RelayResult<Json<Vec<MessageEnvelope>>> {
    let timestamp = header_timestamp(&headers)?;
    let challenge = mailbox_challenge(&address, timestamp);
    verify_auth_headers(&headers, &challenge, &[&address], state.config.auth_window)?;
    Ok(Json(state.store.mailbox(&address)?))
}

async fn message(
    State(state): State<Arc<RelayServerState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> RelayResult<Json<MessageEnvelope>> {
    let envelope = state.store.message(&id)?;
    let timestamp = header_timestamp(&headers)?;
    let challenge = message_challenge(&id, timestamp);
    verify_auth_headers(&headers, &challenge, &[&envelope.from, &envelope.to], state.config.auth_window)?;
    Ok(Json(envelope))
}

#[derive(Debug, Serialize)]
struct ReadReceiptResponse {
    success: bool,
    #[serde(rename = "messageId")]
    message_id: String,
}

async fn mark_read(
    State(state): State<Arc<RelayServerState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> RelayResult<Json<ReadReceiptResponse>> {
    let envelope = state.store.message(&id)?;
    let timestamp = header_timestamp(&headers)?;
    let challenge = read_receipt_challenge(&id, timestamp);
    verify_auth_headers(&headers, &challenge, &[&envelope.to], state.config.auth_window)?;

    let envelope = state.store.mark_read(&id)?;
    let now = now_ms();
    state
        .store
        .subscribers()
        .send(&envelope.from, ServerFrame::ReadReceipt { message_id: id.clone(), timestamp: now });

    Ok(Json(ReadReceiptResponse { success: true, message_id: id }))
}

fn header_timestamp(headers: &HeaderMap) -> RelayResult<u64> {
    headers
        .get("x-jeju-timestamp")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| RelayError::AuthError("missing or malformed x-jeju-timestamp".to_string()))
}

#[derive(Debug, Deserialize)]
struct SubscribeMessage {
    address: String,
    signature: String,
    timestamp: u64,
}

async fn websocket(
    ws: WebSocketUpgrade,
    State(state): State<Arc<RelayServerState>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<RelayServerState>) {
    let Some(Ok(Message::Text(text))) = socket.next().await else {
        let _ = send_frame(&mut socket, &ServerFrame::Error { message: "expected subscribe message".to_string() }).await;
        return;
    };

    let subscribe: SubscribeMessage = match serde_json::from_str(&text) {
        Ok(msg) => msg,
        Err(_) => {
            let _ = send_frame(&mut socket, &ServerFrame::Error { message: "malformed subscribe message".to_string() }).await;
            return;
        }
    };

    let age = now_ms().saturating_sub(subscribe.timestamp);
    if age > state.config.auth_window.as_millis() as u64 {
        let _ = send_frame(&mut socket, &ServerFrame::Error { message: "subscribe timestamp expired".to_string() }).await;
        return;
    }

    let challenge = subscribe_challenge(&subscribe.address, subscribe.timestamp);
    let recovered = match recover_address(&challenge, &subscribe.signature) {
        Ok(address) => address,
        Err(err) => {
            let _ = send_frame(&mut socket, &ServerFrame::Error { message: err.to_string() }).await;
            return;
        }
    };
    if !addresses_match(&recovered, &subscribe.address) {
        let _ = send_frame(&mut socket, &ServerFrame::Error { message: "signature does not match address".to_string() }).await;
        return;
    }

    if state.store.subscribers().at_capacity(&subscribe.address) {
        let _ = send_frame(&mut socket, &ServerFrame::Error { message: "server at capacity".to_string() }).await;
        return;
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<ServerFrame>();
    let generation = state.store.subscribers().subscribe(&subscribe.address, tx);

    let _ = send_frame(&mut socket, &ServerFrame::Subscribed { address: subscribe.address.clone() }).await;

    for envelope in state.store.replay_pending(&subscribe.address).unwrap_or_default() {
        let _ = send_frame(&mut socket, &ServerFrame::Message { envelope }).await;
    }

    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            outgoing = rx.recv() => {
                match outgoing {
                    Some(frame) => {
                        let Ok(json) = serde_json::to_string(&frame) else { continue };
                        if sink.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    Some(Ok(Message::Ping(data))) => {
                        if sink.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    state.store.subscribers().unsubscribe(&subscribe.address, generation);
}

async fn send_frame(socket: &mut WebSocket, frame: &ServerFrame) -> Result<(), axum::Error> {
    let json = serde_json::to_string(frame).unwrap_or_default();
    socket.send(Message::Text(json.into())).await
}

async fn metrics(State(state): State<Arc<RelayServerState>>) -> String {
    let subscribers = state.store.subscribers().len();
    format!(
        "# HELP relay_subscribers_active Currently connected WebSocket subscribers.\n\
         # TYPE relay_subscribers_active gauge\n\
         relay_subscribers_active {subscribers}\n"
    )
}

#[cfg(test)]
mod tests {
    use k256::ecdsa::{SigningKey, VerifyingKey};
    use node_core::{Node, NodeConfig};
    use tower::ServiceExt;

    use super::*;
    use crate::auth::addresses_match as addr_eq;
    use crate::envelope::EncryptedContent;
    use crate::subscriber::SubscriberRegistry;

    fn address_from_key(signing_key: &SigningKey) -> String {
        let verifying_key = VerifyingKey::from(signing_key);
        crate::auth::recover_address(
            "probe",
            &sign(signing_key, "probe"),
        )
        .map(|recovered| {
            let _ = &verifying_key;
            recovered
        })
        .unwrap()
    }

    fn sign(signing_key: &SigningKey, message: &str) -> String {
        use sha3::{Digest, Keccak256};
        let digest = Keccak256::digest(message.as_bytes());
        let (signature, recovery_id) = signing_key.sign_prehash_recoverable(&digest).unwrap();
        let mut bytes = Vec::with_capacity(65);
        bytes.extend_from_slice(&signature.to_bytes());
        bytes.push(recovery_id.to_byte());
        format!("0x{}", hex(&bytes))
    }

    fn hex(bytes: &[u8]) -> String {
        use std::fmt::Write;
        let mut out = String::new();
        for b in bytes {
            let _ = write!(out, "{b:02x}");
        }
        out
    }

    fn state() -> Arc<RelayServerState> {
        let node = Arc::new(Node::new(NodeConfig::default()));
        node.start();
        let registry = Arc::new(SubscriberRegistry::new(10));
        let store = Arc::new(RelayStore::open(node, RelayConfig::default(), registry).unwrap());
        Arc::new(RelayServerState::new(store, RelayConfig::default()))
    }

    fn envelope(id: &str, from: &str, to: &str, timestamp: u64) -> MessageEnvelope {
        MessageEnvelope {
            id: id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            encrypted_content: EncryptedContent {
                ciphertext: "cafe".to_string(),
                ephemeral_public_key: "pub".to_string(),
                nonce: "nonce".to_string(),
            },
            timestamp,
            signature: None,
        }
    }

    #[tokio::test]
    async fn send_then_unauthenticated_mailbox_read_is_rejected() {
        use axum::body::Body;
        use axum::http::{Request, StatusCode};

        let state = state();
        let app = router(state.clone());

        let id = uuid::Uuid::new_v4().to_string();
        let body = serde_json::to_vec(&envelope(&id, "0xa", "0xb", now_ms())).unwrap();
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/send")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::builder().uri("/messages/0xb").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn authenticated_mailbox_read_succeeds() {
        use axum::body::Body;
        use axum::http::{Request, StatusCode};

        let state = state();
        let app = router(state.clone());

        let signing_key = SigningKey::random(&mut rand::thread_rng());
        let address = address_from_key(&signing_key);

        let id = uuid::Uuid::new_v4().to_string();
        let body = serde_json::to_vec(&envelope(&id, "0xsender", &address, now_ms())).unwrap();
        app.clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/send")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        let timestamp = now_ms();
        let challenge = mailbox_challenge(&address, timestamp);
        let signature = sign(&signing_key, &challenge);

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/messages/{address}"))
                    .header("x-jeju-signature", signature)
                    .header("x-jeju-timestamp", timestamp.to_string())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(addr_eq(&address, &address));
    }

    #[tokio::test]
    async fn metrics_reports_subscriber_count() {
        let state = state();
        let body = metrics(State(state)).await;
        assert!(body.contains("relay_subscribers_active 0"));
    }
}
