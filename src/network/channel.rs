//! Bidirectional message channel contract
//!
//! Roles are bound to an already established channel. They only need to know
//! whether it is connected, to emit messages, to listen for a message kind and
//! to signal that their audio session ended.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::TransportError;
use crate::protocol::{Message, MessageKind};

/// Listener invoked for every inbound message of its kind
pub type MessageHandler = Arc<dyn Fn(&Message) + Send + Sync + 'static>;

/// Handle returned by `Channel::on`, used to remove the listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub trait Channel: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Send a message to the remote side
    fn emit(&self, message: Message) -> Result<(), TransportError>;

    fn on(&self, kind: MessageKind, handler: MessageHandler) -> ListenerId;

    fn off(&self, id: ListenerId);

    /// Tell the remote side this audio session ended
    fn disconnect(&self);
}

/// Listener registry shared by the channel implementations
#[derive(Default)]
pub struct Listeners {
    next_id: AtomicU64,
    handlers: DashMap<ListenerId, (MessageKind, MessageHandler)>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, kind: MessageKind, handler: MessageHandler) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.insert(id, (kind, handler));
        id
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        self.handlers.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Call every listener registered for the message's kind; returns how many ran
    pub fn dispatch(&self, message: &Message) -> usize {
        let kind = message.kind();
        // Collect first so handlers may add or remove listeners
        let matching: Vec<MessageHandler> = self
            .handlers
            .iter()
            .filter(|entry| entry.value().0 == kind)
            .map(|entry| entry.value().1.clone())
            .collect();

        for handler in &matching {
            handler(message);
        }
        matching.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_dispatch_by_kind() {
        let listeners = Listeners::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        let id = listeners.add(
            MessageKind::GetSpeak,
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert_eq!(listeners.dispatch(&Message::get_speak(vec![1u8])), 1);
        assert_eq!(listeners.dispatch(&Message::speak(vec![1u8])), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        assert!(listeners.remove(id));
        assert!(!listeners.remove(id));
        assert_eq!(listeners.dispatch(&Message::get_speak(vec![1u8])), 0);
        assert!(listeners.is_empty());
    }
}
