//! Opus encoder wrapper
//!
//! Accepts arbitrary-length blocks and emits one packet per complete frame,
//! keeping the remainder until the next call.

use bytes::Bytes;
use opus::{Channels, Encoder};

use crate::config::CodecConfig;
use crate::error::CodecError;
use crate::protocol::MAX_PACKET_SIZE;

/// Opus encoder with partial-frame buffering
pub struct OpusEncoder {
    encoder: Encoder,
    config: CodecConfig,
    /// Samples waiting for a complete frame
    pending: Vec<f32>,
    /// Encoding buffer; its length caps the packet size libopus produces
    encode_buffer: Vec<u8>,
    frames_encoded: u64,
    bytes_produced: u64,
}

impl OpusEncoder {
    /// Create an encoder for the codec rate, channels, application and frame duration
    pub fn new(config: &CodecConfig) -> Result<Self, CodecError> {
        let channels = match config.channels {
            1 => Channels::Mono,
            2 => Channels::Stereo,
            _ => {
                return Err(CodecError::EncoderInit(format!(
                    "Unsupported channel count: {}",
                    config.channels
                )))
            }
        };

        let mut encoder = Encoder::new(config.sample_rate, channels, config.app.into())
            .map_err(|e| CodecError::EncoderInit(e.to_string()))?;

        if let Some(bitrate) = config.bitrate {
            encoder
                .set_bitrate(opus::Bitrate::Bits(bitrate as i32))
                .map_err(|e| CodecError::EncoderInit(format!("Failed to set bitrate: {}", e)))?;
        }

        let samples_per_frame = config.frame_size() * config.channels as usize;
        if samples_per_frame == 0 {
            return Err(CodecError::InvalidFrameSize(0));
        }

        Ok(Self {
            encoder,
            config: config.clone(),
            pending: Vec::with_capacity(samples_per_frame * 2),
            encode_buffer: vec![0u8; MAX_PACKET_SIZE],
            frames_encoded: 0,
            bytes_produced: 0,
        })
    }

    /// Buffer `samples` and encode every complete frame
    ///
    /// Returns zero or more packets; leftover samples are kept for the next call.
    pub fn encode_float(&mut self, samples: &[f32]) -> Result<Vec<Bytes>, CodecError> {
        self.pending.extend_from_slice(samples);

        let frame_len = self.samples_per_frame();
        let mut packets = Vec::with_capacity(self.pending.len() / frame_len);
        let mut consumed = 0;

        while self.pending.len() - consumed >= frame_len {
            let size = self
                .encoder
                .encode_float(
                    &self.pending[consumed..consumed + frame_len],
                    &mut self.encode_buffer,
                )
                .map_err(|e| CodecError::EncodingFailed(e.to_string()))?;
            consumed += frame_len;

            self.frames_encoded += 1;
            self.bytes_produced += size as u64;
            packets.push(Bytes::copy_from_slice(&self.encode_buffer[..size]));
        }

        self.pending.drain(..consumed);
        Ok(packets)
    }

    /// Encode exactly one frame
    ///
    /// Input must be interleaved f32 samples with length = frame_size * channels
    pub fn encode(&mut self, samples: &[f32]) -> Result<Bytes, CodecError> {
        if samples.len() != self.samples_per_frame() {
            return Err(CodecError::InvalidFrameSize(samples.len()));
        }

        let size = self
            .encoder
            .encode_float(samples, &mut self.encode_buffer)
            .map_err(|e| CodecError::EncodingFailed(e.to_string()))?;

        self.frames_encoded += 1;
        self.bytes_produced += size as u64;

        Ok(Bytes::copy_from_slice(&self.encode_buffer[..size]))
    }

    /// Drop buffered samples and reset the codec state
    pub fn reset(&mut self) -> Result<(), CodecError> {
        self.pending.clear();
        self.encoder
            .reset_state()
            .map_err(|e| CodecError::EncoderInit(e.to_string()))
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Samples per channel in one frame
    pub fn frame_size(&self) -> usize {
        self.config.frame_size()
    }

    /// Interleaved samples in one frame
    pub fn samples_per_frame(&self) -> usize {
        self.config.frame_size() * self.config.channels as usize
    }

    /// Samples buffered but not yet encoded
    pub fn pending_samples(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> EncoderStats {
        EncoderStats {
            frames_encoded: self.frames_encoded,
            bytes_produced: self.bytes_produced,
            average_frame_size: if self.frames_encoded > 0 {
                self.bytes_produced as f32 / self.frames_encoded as f32
            } else {
                0.0
            },
        }
    }
}

/// Encoder statistics
#[derive(Debug, Clone)]
pub struct EncoderStats {
    pub frames_encoded: u64,
    pub bytes_produced: u64,
    pub average_frame_size: f32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OpusApplication;

    #[test]
    fn test_encoder_creation() {
        let encoder = OpusEncoder::new(&CodecConfig::default()).unwrap();
        assert_eq!(encoder.frame_size(), 480);
        assert_eq!(encoder.samples_per_frame(), 480);
    }

    #[test]
    fn test_encode_float_buffers_partial_frames() {
        let mut encoder = OpusEncoder::new(&CodecConfig::default()).unwrap();

        // Less than one 20ms frame at 24kHz
        let packets = encoder.encode_float(&vec![0.0f32; 300]).unwrap();
        assert!(packets.is_empty());
        assert_eq!(encoder.pending_samples(), 300);

        // Completes the first frame and most of a second
        let packets = encoder.encode_float(&vec![0.0f32; 600]).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(encoder.pending_samples(), 420);
        assert!(!packets[0].is_empty());
        assert!(packets[0].len() <= MAX_PACKET_SIZE);
    }

    #[test]
    fn test_encode_float_multiple_frames() {
        let config = CodecConfig {
            frame_duration: 10.0,
            ..CodecConfig::default()
        };
        let mut encoder = OpusEncoder::new(&config).unwrap();

        let packets = encoder.encode_float(&vec![0.1f32; 240 * 4 + 5]).unwrap();
        assert_eq!(packets.len(), 4);
        assert_eq!(encoder.pending_samples(), 5);
        assert_eq!(encoder.stats().frames_encoded, 4);
    }

    #[test]
    fn test_single_frame_size_checked() {
        let mut encoder = OpusEncoder::new(&CodecConfig::default()).unwrap();
        assert!(matches!(
            encoder.encode(&[0.0; 100]),
            Err(CodecError::InvalidFrameSize(100))
        ));
        assert!(encoder.encode(&[0.0; 480]).is_ok());
    }

    #[test]
    fn test_low_delay_stereo() {
        let config = CodecConfig {
            sample_rate: 48000,
            channels: 2,
            app: OpusApplication::LowDelay,
            frame_duration: 2.5,
            ..CodecConfig::default()
        };
        let encoder = OpusEncoder::new(&config).unwrap();
        assert_eq!(encoder.frame_size(), 120);
        assert_eq!(encoder.samples_per_frame(), 240);
    }

    #[test]
    fn test_long_frames_at_high_bitrate_fit_the_wire() {
        let config = CodecConfig {
            sample_rate: 48000,
            frame_duration: 60.0,
            app: OpusApplication::Audio,
            bitrate: Some(256_000),
            ..CodecConfig::default()
        };
        let mut encoder = OpusEncoder::new(&config).unwrap();

        // Pseudo-random noise keeps the encoder near its target bitrate
        let mut seed = 0x2545_f491u32;
        let noise: Vec<f32> = (0..2880 * 5)
            .map(|_| {
                seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (seed >> 8) as f32 / (1u32 << 24) as f32 - 0.5
            })
            .collect();
        let packets = encoder.encode_float(&noise).unwrap();
        assert_eq!(packets.len(), 5);
        assert!(packets.iter().any(|p| p.len() > crate::protocol::MAX_FRAME_SIZE));

        for packet in packets {
            assert!(packet.len() <= MAX_PACKET_SIZE);
            let message = crate::protocol::Message::speak(packet.clone());
            let parsed = crate::protocol::Message::from_json(&message.to_json()).unwrap();
            assert_eq!(parsed.payload().map(|p| p.array.clone()), Some(packet));
        }
    }

    #[test]
    fn test_reset_clears_pending() {
        let mut encoder = OpusEncoder::new(&CodecConfig::default()).unwrap();
        encoder.encode_float(&[0.0; 100]).unwrap();
        encoder.reset().unwrap();
        assert_eq!(encoder.pending_samples(), 0);
    }
}
