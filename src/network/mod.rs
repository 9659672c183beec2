//! Message channel implementations and the relay server

pub mod channel;
pub mod memory;
pub mod relay;
pub mod websocket;

pub use channel::{Channel, ListenerId, Listeners, MessageHandler};
pub use memory::MemoryChannel;
pub use relay::RelayState;
pub use websocket::WsChannel;
