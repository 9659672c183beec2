//! WebSocket channel client
//!
//! Connects to a relay and speaks the JSON envelope from `protocol`. A reader
//! task dispatches inbound messages to listeners; a writer task drains the
//! outgoing queue so `emit` never blocks an audio callback. There is no
//! reconnection: once the socket closes the channel stays disconnected.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::error::TransportError;
use crate::network::channel::{Channel, ListenerId, Listeners, MessageHandler};
use crate::protocol::{Message, MessageKind};

struct Inner {
    url: String,
    connected: AtomicBool,
    listeners: Listeners,
    outgoing: mpsc::UnboundedSender<WsMessage>,
}

/// Channel over a WebSocket connection to a relay
#[derive(Clone)]
pub struct WsChannel {
    inner: Arc<Inner>,
}

impl WsChannel {
    /// Connect to `url` (e.g. `ws://127.0.0.1:5000/ws`); must run inside a tokio runtime
    pub async fn connect(url: &str) -> Result<Self, TransportError> {
        let (stream, _) = connect_async(url)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        let (mut write, mut read) = stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();

        let inner = Arc::new(Inner {
            url: url.to_string(),
            connected: AtomicBool::new(true),
            listeners: Listeners::new(),
            outgoing: tx,
        });
        tracing::info!("Connected to {}", url);

        let writer_state = inner.clone();
        tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                let closing = matches!(frame, WsMessage::Close(_));
                if let Err(e) = write.send(frame).await {
                    tracing::warn!("Send to {} failed: {}", writer_state.url, e);
                    break;
                }
                if closing {
                    break;
                }
            }
            writer_state.connected.store(false, Ordering::SeqCst);
        });

        let reader_state = inner.clone();
        tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                let frame = match frame {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::warn!("Receive from {} failed: {}", reader_state.url, e);
                        break;
                    }
                };
                match frame {
                    WsMessage::Text(text) => match Message::from_json(&text) {
                        Ok(message) => {
                            reader_state.listeners.dispatch(&message);
                        }
                        Err(e) => tracing::warn!("Dropping frame: {}", e),
                    },
                    WsMessage::Close(_) => break,
                    WsMessage::Binary(_) => tracing::warn!("Dropping binary frame"),
                    _ => {}
                }
            }
            reader_state.connected.store(false, Ordering::SeqCst);
            tracing::info!("Channel to {} closed", reader_state.url);
        });

        Ok(Self { inner })
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    fn send_frame(&self, frame: WsMessage) -> Result<(), TransportError> {
        self.inner
            .outgoing
            .send(frame)
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }
}

impl Channel for WsChannel {
    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    fn emit(&self, message: Message) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotReady);
        }
        self.send_frame(WsMessage::Text(message.to_json()))
    }

    fn on(&self, kind: MessageKind, handler: MessageHandler) -> ListenerId {
        self.inner.listeners.add(kind, handler)
    }

    fn off(&self, id: ListenerId) {
        self.inner.listeners.remove(id);
    }

    fn disconnect(&self) {
        if self.is_connected() {
            if let Err(e) = self.send_frame(WsMessage::Text(Message::Disconnect.to_json())) {
                tracing::debug!("Disconnect signal to {} not sent: {}", self.inner.url, e);
            }
        }
    }
}

impl WsChannel {
    /// Close the socket; the channel reports disconnected afterwards
    pub fn close(&self) {
        if self.inner.connected.swap(false, Ordering::SeqCst) {
            if let Err(e) = self.send_frame(WsMessage::Close(None)) {
                tracing::debug!("Close frame to {} not sent: {}", self.inner.url, e);
            }
        }
    }
}
