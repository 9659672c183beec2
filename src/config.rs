//! Configuration for the streamer, the player and the relay
//!
//! A configuration is fixed once a role is constructed; there is no runtime
//! renegotiation. Files are TOML:
//!
//! ```toml
//! [codec]
//! sample_rate = 24000
//! channels = 1
//! app = 2048
//! frame_duration = 20.0
//! buffer_size = 4096
//!
//! [server]
//! host = "127.0.0.1"
//! port = 5000
//!
//! [playback]
//! max_latency_ms = 1000
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::{Error, Result};

/// Sample rates accepted by Opus
pub const SUPPORTED_SAMPLE_RATES: [u32; 5] = [8000, 12000, 16000, 24000, 48000];

/// Frame durations accepted by Opus, in milliseconds
pub const SUPPORTED_FRAME_DURATIONS: [f32; 6] = [2.5, 5.0, 10.0, 20.0, 40.0, 60.0];

/// Opus encoder application mode, stored as the numeric libopus constant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum OpusApplication {
    /// 2048
    Voip,
    /// 2049
    Audio,
    /// 2051
    LowDelay,
}

impl OpusApplication {
    pub fn code(self) -> u16 {
        match self {
            OpusApplication::Voip => 2048,
            OpusApplication::Audio => 2049,
            OpusApplication::LowDelay => 2051,
        }
    }
}

impl TryFrom<u16> for OpusApplication {
    type Error = String;

    fn try_from(code: u16) -> std::result::Result<Self, Self::Error> {
        match code {
            2048 => Ok(OpusApplication::Voip),
            2049 => Ok(OpusApplication::Audio),
            2051 => Ok(OpusApplication::LowDelay),
            other => Err(format!(
                "unknown Opus application {} (expected 2048, 2049 or 2051)",
                other
            )),
        }
    }
}

impl From<OpusApplication> for u16 {
    fn from(app: OpusApplication) -> Self {
        app.code()
    }
}

impl From<OpusApplication> for opus::Application {
    fn from(app: OpusApplication) -> Self {
        match app {
            OpusApplication::Voip => opus::Application::Voip,
            OpusApplication::Audio => opus::Application::Audio,
            OpusApplication::LowDelay => opus::Application::LowDelay,
        }
    }
}

/// Codec parameters shared by the encoder and the decoder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Opus sample rate in Hz
    pub sample_rate: u32,
    /// Channel count
    pub channels: u16,
    /// Encoder application mode
    pub app: OpusApplication,
    /// Frame duration in milliseconds
    pub frame_duration: f32,
    /// Host callback block size in samples
    pub buffer_size: usize,
    /// Target bitrate in bits per second, encoder default when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u32>,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            app: OpusApplication::Voip,
            frame_duration: DEFAULT_FRAME_DURATION_MS,
            buffer_size: DEFAULT_BUFFER_SIZE,
            bitrate: None,
        }
    }
}

impl CodecConfig {
    /// Samples per channel in one encoded frame
    pub fn frame_size(&self) -> usize {
        Self::frame_size_from_ms(self.sample_rate, self.frame_duration)
    }

    /// Samples per channel for a frame of `ms` milliseconds at `sample_rate`
    pub fn frame_size_from_ms(sample_rate: u32, ms: f32) -> usize {
        (sample_rate as f32 * ms / 1000.0).round() as usize
    }

    /// Block size recommended for a codec rate: `rate / 6000 * 1024`
    pub fn recommended_buffer_size(sample_rate: u32) -> usize {
        (sample_rate as usize * 1024) / 6000
    }

    pub fn validate(&self) -> Result<()> {
        if !SUPPORTED_SAMPLE_RATES.contains(&self.sample_rate) {
            return Err(Error::Config(format!(
                "codec.sample_rate {} is not one of {:?}",
                self.sample_rate, SUPPORTED_SAMPLE_RATES
            )));
        }
        if !(1..=2).contains(&self.channels) {
            return Err(Error::Config(format!(
                "codec.channels {} is not supported (1 or 2)",
                self.channels
            )));
        }
        if !SUPPORTED_FRAME_DURATIONS
            .iter()
            .any(|d| (d - self.frame_duration).abs() < f32::EPSILON)
        {
            return Err(Error::Config(format!(
                "codec.frame_duration {} is not one of {:?}",
                self.frame_duration, SUPPORTED_FRAME_DURATIONS
            )));
        }
        if self.buffer_size == 0 {
            return Err(Error::Config("codec.buffer_size must be positive".into()));
        }
        if self.bitrate == Some(0) {
            return Err(Error::Config("codec.bitrate must be positive".into()));
        }
        Ok(())
    }
}

/// Relay endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_SERVER_PORT,
        }
    }
}

impl ServerConfig {
    /// `host:port`, suitable for binding the relay
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// WebSocket URL clients connect to
    pub fn url(&self) -> String {
        format!("ws://{}:{}{}", self.host, self.port, RELAY_PATH)
    }
}

/// Player queue bounds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Maximum audio held in the player queue; older samples are evicted past it
    pub max_latency_ms: u32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            max_latency_ms: DEFAULT_MAX_LATENCY_MS,
        }
    }
}

impl PlaybackConfig {
    /// Queue capacity in samples at the given playback rate
    pub fn queue_capacity(&self, sample_rate: u32, channels: u16) -> usize {
        (sample_rate as u64 * self.max_latency_ms as u64 / 1000) as usize * channels as usize
    }
}

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub codec: CodecConfig,
    pub server: ServerConfig,
    pub playback: PlaybackConfig,
}

impl AudioConfig {
    pub fn validate(&self) -> Result<()> {
        self.codec.validate()?;
        if self.server.host.is_empty() {
            return Err(Error::Config("server.host must not be empty".into()));
        }
        if self.playback.max_latency_ms == 0 {
            return Err(Error::Config(
                "playback.max_latency_ms must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Parse and validate a TOML document
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: AudioConfig =
            toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Load from `path` if given, else from the per-user config file if it
    /// exists, else defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => {
                tracing::info!("Loading config from {}", path.display());
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Write the configuration as TOML
    pub fn save(&self, path: &Path) -> Result<()> {
        let text = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, text)?;
        Ok(())
    }

    /// `<config dir>/ws-audio-api/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "ws-audio-api")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}
