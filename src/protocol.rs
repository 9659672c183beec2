//! Message schema shared by both roles and the relay
//!
//! Every frame on the wire is a JSON envelope:
//!
//! ```text
//! {"event": "speak",    "data": {"array": [<opus packet bytes>]}}   streamer -> relay
//! {"event": "getSpeak", "data": {"array": [<opus packet bytes>]}}   relay -> player
//! {"event": "disconnect"}                                           either side, session ended
//! ```
//!
//! The packet is opaque to this layer; only its size is checked.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// Largest single Opus frame
pub const MAX_FRAME_SIZE: usize = 1275;

/// Largest packet the encoder emits: a 60ms packet holds three full frames
/// behind a TOC byte, a frame count and two frame lengths
pub const MAX_PACKET_SIZE: usize = 3 * MAX_FRAME_SIZE + 6;

/// Application-level event names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Encoded packet leaving a streamer
    Speak,
    /// Encoded packet arriving at a player
    GetSpeak,
    /// Audio session ended
    Disconnect,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Speak => "speak",
            MessageKind::GetSpeak => "getSpeak",
            MessageKind::Disconnect => "disconnect",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "speak" => Some(MessageKind::Speak),
            "getSpeak" => Some(MessageKind::GetSpeak),
            "disconnect" => Some(MessageKind::Disconnect),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of `speak` / `getSpeak`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakPayload {
    /// One encoded packet
    pub array: Bytes,
}

impl SpeakPayload {
    pub fn new(packet: impl Into<Bytes>) -> Self {
        Self {
            array: packet.into(),
        }
    }

    pub fn validate(&self) -> Result<(), TransportError> {
        if self.array.is_empty() {
            return Err(TransportError::InvalidMessage("empty packet".into()));
        }
        if self.array.len() > MAX_PACKET_SIZE {
            return Err(TransportError::InvalidMessage(format!(
                "packet of {} bytes exceeds {}",
                self.array.len(),
                MAX_PACKET_SIZE
            )));
        }
        Ok(())
    }
}

/// A validated channel message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Speak(SpeakPayload),
    GetSpeak(SpeakPayload),
    Disconnect,
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<SpeakPayload>,
    /// Acknowledgement id some senders attach; accepted and ignored
    #[serde(default, skip_serializing)]
    #[allow(dead_code)]
    ack: Option<serde_json::Value>,
}

impl Message {
    pub fn speak(packet: impl Into<Bytes>) -> Self {
        Message::Speak(SpeakPayload::new(packet))
    }

    pub fn get_speak(packet: impl Into<Bytes>) -> Self {
        Message::GetSpeak(SpeakPayload::new(packet))
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Speak(_) => MessageKind::Speak,
            Message::GetSpeak(_) => MessageKind::GetSpeak,
            Message::Disconnect => MessageKind::Disconnect,
        }
    }

    pub fn payload(&self) -> Option<&SpeakPayload> {
        match self {
            Message::Speak(p) | Message::GetSpeak(p) => Some(p),
            Message::Disconnect => None,
        }
    }

    /// What a relay forwards to the other peers for this message
    pub fn into_get_speak(self) -> Option<Message> {
        match self {
            Message::Speak(p) => Some(Message::GetSpeak(p)),
            _ => None,
        }
    }

    pub fn to_json(&self) -> String {
        let envelope = Envelope {
            event: self.kind().as_str().to_string(),
            data: self.payload().cloned(),
            ack: None,
        };
        // Envelope holds only strings and byte arrays, serialization cannot fail
        serde_json::to_string(&envelope).unwrap_or_default()
    }

    pub fn from_json(text: &str) -> Result<Self, TransportError> {
        let envelope: Envelope = serde_json::from_str(text)
            .map_err(|e| TransportError::InvalidMessage(e.to_string()))?;

        let kind = MessageKind::from_name(&envelope.event).ok_or_else(|| {
            TransportError::InvalidMessage(format!("unknown event {:?}", envelope.event))
        })?;

        match kind {
            MessageKind::Disconnect => Ok(Message::Disconnect),
            MessageKind::Speak | MessageKind::GetSpeak => {
                let payload = envelope.data.ok_or_else(|| {
                    TransportError::InvalidMessage(format!("{} without payload", kind))
                })?;
                payload.validate()?;
                Ok(if kind == MessageKind::Speak {
                    Message::Speak(payload)
                } else {
                    Message::GetSpeak(payload)
                })
            }
        }
    }
}
