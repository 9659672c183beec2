//! In-memory loopback channel
//!
//! Records what a role emits and lets the owner deliver messages back to the
//! role's listeners, including the relay step that turns `speak` into
//! `getSpeak`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::error::TransportError;
use crate::network::channel::{Channel, ListenerId, Listeners, MessageHandler};
use crate::protocol::{Message, MessageKind};

pub struct MemoryChannel {
    connected: AtomicBool,
    listeners: Listeners,
    /// Emitted and not yet looped back
    outbox: Mutex<VecDeque<Message>>,
    /// Every message ever emitted
    sent: Mutex<Vec<Message>>,
    disconnects: AtomicUsize,
}

impl MemoryChannel {
    /// A connected channel
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            listeners: Listeners::new(),
            outbox: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            disconnects: AtomicUsize::new(0),
        }
    }

    /// A channel that has not connected
    pub fn disconnected() -> Self {
        let channel = Self::new();
        channel.set_connected(false);
        channel
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Hand `message` to local listeners as if it came from the remote side
    pub fn deliver(&self, message: Message) -> usize {
        self.listeners.dispatch(&message)
    }

    /// Relay every pending `speak` back as `getSpeak`; returns how many were delivered
    pub fn loopback(&self) -> usize {
        let pending: Vec<Message> = self.outbox.lock().drain(..).collect();
        let mut delivered = 0;
        for message in pending.into_iter().filter_map(Message::into_get_speak) {
            self.deliver(message);
            delivered += 1;
        }
        delivered
    }

    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self, kind: MessageKind) -> usize {
        self.sent.lock().iter().filter(|m| m.kind() == kind).count()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Session-ended signals received
    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

impl Default for MemoryChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl Channel for MemoryChannel {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn emit(&self, message: Message) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotReady);
        }
        self.sent.lock().push(message.clone());
        self.outbox.lock().push_back(message);
        Ok(())
    }

    fn on(&self, kind: MessageKind, handler: MessageHandler) -> ListenerId {
        self.listeners.add(kind, handler)
    }

    fn off(&self, id: ListenerId) {
        self.listeners.remove(id);
    }

    fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().push(Message::Disconnect);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_emit_requires_connection() {
        let channel = MemoryChannel::disconnected();
        assert_eq!(
            channel.emit(Message::speak(vec![1u8])),
            Err(TransportError::NotReady)
        );
        assert!(channel.sent().is_empty());
    }

    #[test]
    fn test_loopback_turns_speak_into_get_speak() {
        let channel = MemoryChannel::new();
        let received = Arc::new(Mutex::new(Vec::new()));

        let sink = received.clone();
        channel.on(
            MessageKind::GetSpeak,
            Arc::new(move |m: &Message| sink.lock().push(m.clone())),
        );

        channel.emit(Message::speak(vec![1u8, 2])).unwrap();
        channel.emit(Message::speak(vec![3u8])).unwrap();
        assert_eq!(channel.loopback(), 2);
        assert_eq!(channel.loopback(), 0);

        assert_eq!(
            *received.lock(),
            vec![Message::get_speak(vec![1u8, 2]), Message::get_speak(vec![3u8])]
        );
    }

    #[test]
    fn test_disconnect_is_recorded() {
        let channel = MemoryChannel::new();
        channel.disconnect();
        assert_eq!(channel.disconnect_count(), 1);
        assert_eq!(channel.sent_count(MessageKind::Disconnect), 1);
        assert!(channel.is_connected());
    }
}
