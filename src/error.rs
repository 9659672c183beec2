//! Error types for the voice streaming roles

use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Host audio errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    /// The host refused access to the capture device
    #[error("Device access denied: {0}")]
    DeviceAccessDenied(String),

    /// No usable capture device exists
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Stream not started yet")]
    NotStarted,
}

impl AudioError {
    /// Category name of the host failure, carried into the raised error
    pub fn category(&self) -> &'static str {
        match self {
            AudioError::DeviceAccessDenied(_) => "NotAllowedError",
            AudioError::DeviceUnavailable(_) => "NotFoundError",
            AudioError::DeviceNotFound(_) => "NotFoundError",
            AudioError::StreamError(_) => "AbortError",
            AudioError::UnsupportedFormat(_) => "NotSupportedError",
            AudioError::NotStarted => "InvalidStateError",
        }
    }
}

/// Codec errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Encoder initialization failed: {0}")]
    EncoderInit(String),

    #[error("Decoder initialization failed: {0}")]
    DecoderInit(String),

    #[error("Encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Decoding failed: {0}")]
    DecodingFailed(String),

    #[error("Invalid frame size: {0}")]
    InvalidFrameSize(usize),
}

/// Message channel errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Socket is in CLOSED state")]
    NotReady,

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_error_categories() {
        let denied = AudioError::DeviceAccessDenied("permission".into());
        assert_eq!(denied.category(), "NotAllowedError");

        let missing = AudioError::DeviceUnavailable("no input".into());
        assert_eq!(missing.category(), "NotFoundError");

        assert_eq!(AudioError::NotStarted.category(), "InvalidStateError");
    }

    #[test]
    fn test_error_conversion() {
        let err: Error = TransportError::NotReady.into();
        assert!(matches!(err, Error::Transport(TransportError::NotReady)));
        assert_eq!(
            err.to_string(),
            "Transport error: Socket is in CLOSED state"
        );
    }
}
