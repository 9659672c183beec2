//! WebSocket relay between streamers and players
//!
//! Every `speak` a peer sends is forwarded to every other connected peer as
//! `getSpeak`. Packets are never inspected beyond envelope validation.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::constants::RELAY_PATH;
use crate::error::{Error, Result};
use crate::protocol::{Message, MAX_PACKET_SIZE};

/// Largest text frame accepted: a full packet as a JSON byte array plus envelope
const MAX_FRAME_BYTES: usize = MAX_PACKET_SIZE * 4 + 256;

/// Connected peers and counters
#[derive(Default)]
pub struct RelayState {
    peers: DashMap<Uuid, mpsc::UnboundedSender<WsMessage>>,
    packets_forwarded: AtomicU64,
    invalid_frames: AtomicU64,
    sessions_ended: AtomicU64,
}

/// Relay counters
#[derive(Debug, Clone, Serialize)]
pub struct RelayStats {
    pub peers: usize,
    pub packets_forwarded: u64,
    pub invalid_frames: u64,
    pub sessions_ended: u64,
}

impl RelayState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn stats(&self) -> RelayStats {
        RelayStats {
            peers: self.peers.len(),
            packets_forwarded: self.packets_forwarded.load(Ordering::Relaxed),
            invalid_frames: self.invalid_frames.load(Ordering::Relaxed),
            sessions_ended: self.sessions_ended.load(Ordering::Relaxed),
        }
    }

    /// Send `message` to every peer except `from`
    fn broadcast(&self, from: Uuid, message: &Message) -> usize {
        let text = message.to_json();
        let mut delivered = 0;
        for peer in self.peers.iter() {
            if *peer.key() == from {
                continue;
            }
            if peer.value().send(WsMessage::Text(text.clone())).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    fn handle_frame(&self, peer: Uuid, text: &str) {
        match Message::from_json(text) {
            Ok(Message::Speak(payload)) => {
                let delivered = self.broadcast(peer, &Message::GetSpeak(payload));
                self.packets_forwarded.fetch_add(1, Ordering::Relaxed);
                tracing::trace!("Forwarded packet from {} to {} peers", peer, delivered);
            }
            Ok(Message::Disconnect) => {
                self.sessions_ended.fetch_add(1, Ordering::Relaxed);
                tracing::info!("Peer {} ended its audio session", peer);
            }
            Ok(Message::GetSpeak(_)) => {
                self.invalid_frames.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Peer {} sent getSpeak, which only the relay emits", peer);
            }
            Err(e) => {
                self.invalid_frames.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Invalid frame from {}: {}", peer, e);
            }
        }
    }
}

/// Routes: the relay socket and a health endpoint
pub fn router(state: Arc<RelayState>) -> Router {
    Router::new()
        .route(RELAY_PATH, get(ws_handler))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the relay on `listener` until the future is dropped
pub async fn serve(listener: TcpListener, state: Arc<RelayState>) -> Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!("Relay listening on ws://{}{}", addr, RELAY_PATH);
    axum::serve(listener, router(state))
        .await
        .map_err(Error::Io)
}

/// Bind `server.host:server.port` and serve
pub async fn run(config: &ServerConfig) -> Result<()> {
    let addr: SocketAddr = tokio::net::lookup_host(config.bind_address())
        .await?
        .next()
        .ok_or_else(|| Error::Config(format!("cannot resolve {}", config.bind_address())))?;
    let listener = TcpListener::bind(addr).await?;
    serve(listener, RelayState::new()).await
}

async fn health(State(state): State<Arc<RelayState>>) -> Json<RelayStats> {
    Json(state.stats())
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<RelayState>>,
) -> impl IntoResponse {
    ws.max_message_size(MAX_FRAME_BYTES)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<RelayState>) {
    let peer = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();
    state.peers.insert(peer, tx);
    tracing::info!("Peer {} joined ({} connected)", peer, state.peer_count());

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = receiver.next().await {
        let Ok(frame) = frame else { break };
        match frame {
            WsMessage::Text(text) => state.handle_frame(peer, &text),
            WsMessage::Binary(_) => {
                state.invalid_frames.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Peer {} sent a binary frame", peer);
            }
            WsMessage::Close(_) => break,
            WsMessage::Ping(_) | WsMessage::Pong(_) => {}
        }
    }

    state.peers.remove(&peer);
    writer.abort();
    tracing::info!("Peer {} left ({} connected)", peer, state.peer_count());
}
