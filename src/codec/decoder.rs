//! Opus decoder for inbound packets
//!
//! Every packet is decoded on its own; a packet that fails to decode is
//! counted and reported to the caller, and the decoder keeps going with the
//! next one.

use opus::{Channels, Decoder};

use crate::error::CodecError;

/// Largest frame Opus can return: 120ms at 48kHz
const MAX_FRAME_SAMPLES_PER_CHANNEL: usize = 48000 * 120 / 1000;

pub struct OpusDecoder {
    decoder: Decoder,
    sample_rate: u32,
    channels: u16,
    /// Scratch output, sized for the longest frame
    decode_buffer: Vec<f32>,
    stats: DecoderStats,
}

impl OpusDecoder {
    pub fn new(sample_rate: u32, channels: u16) -> Result<Self, CodecError> {
        let opus_channels = match channels {
            1 => Channels::Mono,
            2 => Channels::Stereo,
            _ => {
                return Err(CodecError::DecoderInit(format!(
                    "Unsupported channel count: {}",
                    channels
                )))
            }
        };

        let decoder = Decoder::new(sample_rate, opus_channels)
            .map_err(|e| CodecError::DecoderInit(e.to_string()))?;

        Ok(Self {
            decoder,
            sample_rate,
            channels,
            decode_buffer: vec![0.0f32; MAX_FRAME_SAMPLES_PER_CHANNEL * channels as usize],
            stats: DecoderStats::default(),
        })
    }

    /// Decode one packet to interleaved f32 samples
    pub fn decode_float(&mut self, packet: &[u8]) -> Result<Vec<f32>, CodecError> {
        let frames = self.decode_frames(packet)?;
        Ok(self.decode_buffer[..frames * self.channels as usize].to_vec())
    }

    /// Decode one packet and average its channels into a mono signal
    pub fn decode_mono(&mut self, packet: &[u8]) -> Result<Vec<f32>, CodecError> {
        let frames = self.decode_frames(packet)?;
        let channels = self.channels as usize;
        let decoded = &self.decode_buffer[..frames * channels];
        if channels == 1 {
            return Ok(decoded.to_vec());
        }
        Ok(decoded
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect())
    }

    /// Decode into the scratch buffer; returns samples per channel
    fn decode_frames(&mut self, packet: &[u8]) -> Result<usize, CodecError> {
        let result = if packet.is_empty() {
            Err(CodecError::DecodingFailed("empty packet".into()))
        } else {
            self.decoder
                .decode_float(packet, &mut self.decode_buffer, false)
                .map_err(|e| CodecError::DecodingFailed(e.to_string()))
        };

        match result {
            Ok(frames) => {
                self.stats.packets_decoded += 1;
                self.stats.samples_produced += (frames * self.channels as usize) as u64;
                Ok(frames)
            }
            Err(e) => {
                self.stats.packets_rejected += 1;
                Err(e)
            }
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats.clone()
    }
}

/// Decoder counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecoderStats {
    pub packets_decoded: u64,
    /// Packets that were empty or failed to decode
    pub packets_rejected: u64,
    pub samples_produced: u64,
}
