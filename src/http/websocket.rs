//! Persistent connection handling.
//!
//! # Responsibilities
//! - Detect upgrade intent on an incoming request
//! - Complete the WebSocket handshake with the client
//! - Hand the upgraded socket to the realtime engine
//! - Provide a default engine relaying messages between peers
//!
//! # Data Flow
//! ```text
//! Client ──── Upgrade: websocket ────▶ Gateway ── 101 ──▶ Client
//!                                         │
//!                                         ▼
//!                             RealtimeEngine::attach(socket)
//! ```
//!
//! # Design Decisions
//! - WebSocket handled separately from HTTP request/response
//! - The gateway keeps no reference to a socket after handoff
//! - Ping/pong handled transparently by the protocol layer

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, FromRequestParts, WebSocketUpgrade,
    },
    http::{header, HeaderMap, Request},
    response::Response,
};
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::http::response;
use crate::net::{ConnectionHandle, ConnectionId, ConnectionState};
use crate::observability::metrics::{self, UpgradeOutcome};

/// What the engine learns about an upgraded connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeerInfo {
    /// Gateway connection ID, when served by the gateway's accept loop.
    pub connection_id: Option<ConnectionId>,
    /// Remote address, when known.
    pub remote_addr: Option<SocketAddr>,
}

/// Receives exclusive ownership of every upgraded connection.
///
/// Implementations run the connection to completion inside the returned
/// future; the gateway spawns it and never touches the socket again.
pub trait RealtimeEngine: Send + Sync + 'static {
    fn attach(&self, socket: WebSocket, peer: PeerInfo) -> BoxFuture<'static, ()>;
}

/// Whether the request asks to become a persistent connection.
pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    let upgrade_websocket = headers
        .get_all(header::UPGRADE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("websocket"));

    upgrade_websocket || headers.contains_key(header::SEC_WEBSOCKET_KEY)
}

/// Why an upgrade attempt was refused.
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("connection already serving plain HTTP")]
    AlreadyClassified,
    #[error("malformed handshake: {0}")]
    Malformed(String),
}

/// Validate the handshake and schedule the handoff to `engine`.
///
/// Returns the `101 Switching Protocols` response on success. On failure the
/// engine is never called and the response closes the connection.
pub async fn upgrade(engine: Arc<dyn RealtimeEngine>, req: Request<Body>) -> Response {
    let handle = req.extensions().get::<ConnectionHandle>().cloned();
    let peer = PeerInfo {
        connection_id: handle.as_ref().map(ConnectionHandle::id),
        remote_addr: req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr),
    };

    match handshake(handle.as_ref(), req).await {
        Ok(ws) => {
            let failed_handle = handle.clone();
            ws.on_failed_upgrade(move |e| {
                tracing::warn!(error = %e, "Upgrade failed after handshake");
                metrics::record_upgrade(UpgradeOutcome::Failed);
                if let Some(handle) = failed_handle {
                    let _ = handle.transition(ConnectionState::Closed);
                }
            })
            .on_upgrade(move |socket| async move {
                if let Some(handle) = &handle {
                    let _ = handle.transition(ConnectionState::Persistent);
                }
                metrics::record_upgrade(UpgradeOutcome::Accepted);
                tracing::info!(
                    connection_id = ?peer.connection_id.map(|id| id.as_u64()),
                    remote_addr = ?peer.remote_addr,
                    "Connection handed to realtime engine"
                );
                engine.attach(socket, peer).await;
            })
        }
        Err(e) => {
            tracing::warn!(error = %e, remote_addr = ?peer.remote_addr, "Rejected upgrade");
            metrics::record_upgrade(UpgradeOutcome::Rejected);
            if let Some(handle) = &handle {
                let _ = handle.transition(ConnectionState::Closed);
            }
            response::handshake_rejected()
        }
    }
}

async fn handshake(
    handle: Option<&ConnectionHandle>,
    req: Request<Body>,
) -> Result<WebSocketUpgrade, HandshakeError> {
    if let Some(handle) = handle {
        handle
            .transition(ConnectionState::Upgrading)
            .map_err(|_| HandshakeError::AlreadyClassified)?;
    }

    let (mut parts, _body) = req.into_parts();
    WebSocketUpgrade::from_request_parts(&mut parts, &())
        .await
        .map_err(|rejection| HandshakeError::Malformed(rejection.body_text()))
}

/// Default engine: every message a peer sends is relayed to all other peers.
#[derive(Debug, Default)]
pub struct BroadcastEngine {
    peers: Arc<DashMap<Uuid, mpsc::UnboundedSender<Message>>>,
}

impl BroadcastEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of currently attached peers.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }
}

impl RealtimeEngine for BroadcastEngine {
    fn attach(&self, socket: WebSocket, peer: PeerInfo) -> BoxFuture<'static, ()> {
        let peers = Arc::clone(&self.peers);
        Box::pin(run_peer(peers, socket, peer))
    }
}

async fn run_peer(
    peers: Arc<DashMap<Uuid, mpsc::UnboundedSender<Message>>>,
    mut socket: WebSocket,
    peer: PeerInfo,
) {
    let id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::unbounded_channel();
    peers.insert(id, tx);
    tracing::debug!(peer_id = %id, remote_addr = ?peer.remote_addr, peers = peers.len(), "Peer joined");

    loop {
        tokio::select! {
            incoming = socket.recv() => match incoming {
                Some(Ok(msg @ (Message::Text(_) | Message::Binary(_)))) => {
                    for entry in peers.iter().filter(|e| *e.key() != id) {
                        let _ = entry.value().send(msg.clone());
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(peer_id = %id, error = %e, "Peer socket error");
                    break;
                }
            },
            outgoing = rx.recv() => match outgoing {
                Some(msg) => {
                    if socket.send(msg).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
        }
    }

    peers.remove(&id);
    tracing::debug!(peer_id = %id, peers = peers.len(), "Peer left");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.append(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn detects_websocket_upgrade() {
        assert!(is_upgrade_request(&headers(&[
            ("connection", "Upgrade"),
            ("upgrade", "websocket"),
        ])));
        assert!(is_upgrade_request(&headers(&[("upgrade", "WebSocket")])));
        assert!(is_upgrade_request(&headers(&[(
            "sec-websocket-key",
            "dGhlIHNhbXBsZSBub25jZQ=="
        )])));
    }

    #[test]
    fn plain_requests_are_not_upgrades() {
        assert!(!is_upgrade_request(&headers(&[("connection", "keep-alive")])));
        assert!(!is_upgrade_request(&headers(&[("upgrade", "h2c")])));
        assert!(!is_upgrade_request(&HeaderMap::new()));
    }

    #[tokio::test]
    async fn rejected_handshake_never_reaches_engine() {
        struct Panicking;
        impl RealtimeEngine for Panicking {
            fn attach(&self, _: WebSocket, _: PeerInfo) -> BoxFuture<'static, ()> {
                panic!("engine must not be called");
            }
        }

        let req = Request::builder()
            .uri("/socket")
            .header("upgrade", "websocket")
            .body(Body::empty())
            .unwrap();

        let res = upgrade(Arc::new(Panicking), req).await;
        assert_eq!(res.status(), axum::http::StatusCode::BAD_REQUEST);
        assert_eq!(res.headers()[header::CONNECTION], "close");
    }
}
