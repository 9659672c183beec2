//! # WS Audio API
//!
//! Opus voice streaming over a bidirectional message channel.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────── STREAMER ────────────────────────────┐
//! │  Microphone ─▶ Gain ─▶ Capture processor (fixed block size)      │
//! │                               │                                  │
//! │                               ▼                                  │
//! │               Resampler (host rate ─▶ codec rate)                │
//! │                               │                                  │
//! │                               ▼                                  │
//! │               Opus encoder (buffers partial frames)              │
//! │                               │  zero or more packets            │
//! │                               ▼                                  │
//! │               channel.emit("speak", { array })                   │
//! └───────────────────────────────┼──────────────────────────────────┘
//!                                 │  WebSocket
//!                                 ▼
//!                   Relay: "speak" ─▶ "getSpeak" to other peers
//!                                 │
//! ┌───────────────────────────────┼──── PLAYER ──────────────────────┐
//! │               channel.on("getSpeak")                             │
//! │                               │                                  │
//! │                               ▼                                  │
//! │               Opus decoder ─▶ Resampler (codec ─▶ host rate)     │
//! │                               │                                  │
//! │                               ▼                                  │
//! │               Bounded audio queue (oldest samples evicted)       │
//! │                               │                                  │
//! │                               ▼                                  │
//! │  Speakers ◀─ Gain ◀─ Playback processor (full block or silence)  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Both roles receive their audio host (`audio::AudioHost`) and channel
//! (`network::Channel`) explicitly, so the same wiring runs against cpal
//! devices and a WebSocket relay, or against `FakeHost` and `MemoryChannel`.

pub mod audio;
pub mod codec;
pub mod config;
pub mod error;
pub mod network;
pub mod player;
pub mod protocol;
pub mod streamer;

pub use config::AudioConfig;
pub use error::{Error, Result};
pub use player::Player;
pub use streamer::Streamer;

/// Application-wide constants
pub mod constants {
    /// Default Opus sample rate
    pub const DEFAULT_SAMPLE_RATE: u32 = 24000;

    /// Default channel count (mono)
    pub const DEFAULT_CHANNELS: u16 = 1;

    /// Default frame duration in milliseconds
    pub const DEFAULT_FRAME_DURATION_MS: f32 = 20.0;

    /// Default host block size, `24000 / 6000 * 1024`
    pub const DEFAULT_BUFFER_SIZE: usize = 4096;

    /// Default relay port
    pub const DEFAULT_SERVER_PORT: u16 = 5000;

    /// Default bound on audio queued in a player
    pub const DEFAULT_MAX_LATENCY_MS: u32 = 1000;

    /// Path of the relay WebSocket endpoint
    pub const RELAY_PATH: &str = "/ws";
}
