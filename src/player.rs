//! Receive-and-play role
//!
//! ```text
//! "getSpeak" -> Opus decode -> resample -> queue -> playback processor -> gain -> speakers
//! ```
//!
//! Packet arrival and playback pull run on independent clocks; the bounded
//! queue decouples them. A pull takes a full block when one is queued and
//! plays silence otherwise.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::audio::queue::QueueStats;
use crate::audio::{AudioHost, AudioQueue, GainNode, ProcessorNode};
use crate::codec::{OpusDecoder, Resampler};
use crate::config::AudioConfig;
use crate::error::Result;
use crate::network::{Channel, ListenerId};
use crate::protocol::{Message, MessageKind};

/// Decoder and resampler used by the inbound listener
struct DecodePipeline {
    decoder: OpusDecoder,
    resampler: Resampler,
}

impl DecodePipeline {
    /// Decode one packet and return mono samples at the playback rate
    fn process(&mut self, packet: &[u8]) -> Option<Vec<f32>> {
        match self.decoder.decode_mono(packet) {
            Ok(mono) => Some(self.resampler.resample(&mono)),
            Err(e) => {
                tracing::warn!("Dropping undecodable packet: {}", e);
                None
            }
        }
    }
}

struct Session {
    queue: Arc<AudioQueue>,
    pipeline: Arc<Mutex<DecodePipeline>>,
    gain: GainNode,
    processor: Box<dyn ProcessorNode>,
    listener: ListenerId,
}

/// Player statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerStats {
    pub packets_decoded: u64,
    pub packets_rejected: u64,
    pub queue: QueueStats,
}

/// Packet player bound to a channel
pub struct Player {
    config: AudioConfig,
    host: Arc<dyn AudioHost>,
    channel: Arc<dyn Channel>,
    session: Option<Session>,
}

impl Player {
    pub fn new(
        config: AudioConfig,
        host: Arc<dyn AudioHost>,
        channel: Arc<dyn Channel>,
    ) -> Result<Self> {
        config.validate()?;
        OpusDecoder::new(config.codec.sample_rate, config.codec.channels)?;

        tracing::info!(
            "Player with codec {}Hz x{}, playback {}Hz, block {}",
            config.codec.sample_rate,
            config.codec.channels,
            host.sample_rate(),
            config.codec.buffer_size
        );

        Ok(Self {
            config,
            host,
            channel,
            session: None,
        })
    }

    /// Allocate the queue, wire playback and listen for packets
    pub fn start(&mut self) -> Result<()> {
        if self.session.is_some() {
            tracing::debug!("Player already started");
            return Ok(());
        }

        let playback_rate = self.host.sample_rate();
        let buffer_size = self.config.codec.buffer_size;
        let capacity = self
            .config
            .playback
            .queue_capacity(playback_rate, 1)
            .max(buffer_size);

        let pipeline = Arc::new(Mutex::new(DecodePipeline {
            decoder: OpusDecoder::new(self.config.codec.sample_rate, self.config.codec.channels)?,
            resampler: Resampler::new(self.config.codec.sample_rate, playback_rate, 1, buffer_size),
        }));
        let queue = Arc::new(AudioQueue::new(capacity));
        let gain = self.host.create_gain();

        let pull_queue = queue.clone();
        let processor = self.host.connect_playback(
            gain.clone(),
            buffer_size,
            Box::new(move |out: &mut [f32]| {
                // Only this callback drains, so a full block stays available
                if pull_queue.len() >= out.len() {
                    pull_queue.read_into(out);
                } else {
                    out.fill(0.0);
                }
            }),
        )?;

        let inbound_queue = queue.clone();
        let inbound_pipeline = pipeline.clone();
        let listener = self.channel.on(
            MessageKind::GetSpeak,
            Arc::new(move |message: &Message| {
                let Some(payload) = message.payload() else {
                    return;
                };
                let samples = inbound_pipeline.lock().process(&payload.array);
                if let Some(samples) = samples {
                    inbound_queue.write(&samples);
                }
            }),
        );

        tracing::info!("Player started, queue capacity {} samples", capacity);
        self.session = Some(Session {
            queue,
            pipeline,
            gain,
            processor,
            listener,
        });
        Ok(())
    }

    /// Output gain, `None` while the stream is not started
    pub fn get_volume(&self) -> Option<f32> {
        self.session.as_ref().map(|s| s.gain.value())
    }

    /// Set the output gain; ignored before start. Returns whether it was applied.
    pub fn set_volume(&self, value: f32) -> bool {
        match &self.session {
            Some(session) => session.gain.set_value(value),
            None => {
                tracing::debug!("Stream not started yet, volume unchanged");
                false
            }
        }
    }

    /// Samples waiting for playback, `None` while not started
    pub fn queued_samples(&self) -> Option<usize> {
        self.session.as_ref().map(|s| s.queue.len())
    }

    pub fn is_started(&self) -> bool {
        self.session.is_some()
    }

    pub fn stats(&self) -> Option<PlayerStats> {
        self.session.as_ref().map(|s| {
            let decoder = s.pipeline.lock().decoder.stats();
            PlayerStats {
                packets_decoded: decoder.packets_decoded,
                packets_rejected: decoder.packets_rejected,
                queue: s.queue.stats(),
            }
        })
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    /// Stop listening, release the queue, disconnect playback and tell the
    /// channel the session ended. Later calls do nothing.
    pub fn stop(&mut self) {
        let Some(mut session) = self.session.take() else {
            tracing::debug!("Player not running");
            return;
        };

        self.channel.off(session.listener);
        session.processor.disconnect();
        session.queue.clear();
        self.channel.disconnect();

        tracing::info!("Player stopped");
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.stop();
    }
}
