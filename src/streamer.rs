//! Capture-and-send role
//!
//! ```text
//! microphone -> gain -> capture processor -> resample -> Opus encode -> "speak"
//! ```
//!
//! The host drives the pipeline: every captured block is resampled from the
//! host rate to the codec rate and fed to the encoder, and each packet the
//! encoder completes is emitted on the channel while it is connected.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::audio::{AudioHost, GainNode, InputStream, ProcessorNode};
use crate::codec::{OpusEncoder, Resampler};
use crate::config::AudioConfig;
use crate::error::{AudioError, Error, Result, TransportError};
use crate::network::Channel;
use crate::protocol::Message;

/// Resampler and encoder owned by the capture callback
struct EncodePipeline {
    resampler: Resampler,
    encoder: OpusEncoder,
    channels: u16,
}

impl EncodePipeline {
    fn new(config: &AudioConfig, host_rate: u32) -> Result<Self> {
        Ok(Self {
            resampler: Resampler::new(
                host_rate,
                config.codec.sample_rate,
                1,
                config.codec.buffer_size,
            ),
            encoder: OpusEncoder::new(&config.codec)?,
            channels: config.codec.channels,
        })
    }

    fn process(&mut self, block: &[f32]) -> Result<Vec<bytes::Bytes>> {
        let resampled = self.resampler.resample(block);
        let samples = if self.channels == 2 {
            resampled.iter().flat_map(|s| [*s, *s]).collect()
        } else {
            resampled
        };
        Ok(self.encoder.encode_float(&samples)?)
    }
}

#[derive(Default)]
struct Counters {
    blocks_captured: AtomicU64,
    packets_sent: AtomicU64,
    packets_dropped: AtomicU64,
}

/// Streamer statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamerStats {
    pub blocks_captured: u64,
    pub packets_sent: u64,
    /// Packets produced while the channel was down or refused them
    pub packets_dropped: u64,
}

struct Session {
    input: Box<dyn InputStream>,
    gain: GainNode,
    processor: Box<dyn ProcessorNode>,
}

/// Microphone streamer bound to a channel
pub struct Streamer {
    config: AudioConfig,
    host: Arc<dyn AudioHost>,
    channel: Arc<dyn Channel>,
    session: Option<Session>,
    counters: Arc<Counters>,
}

impl Streamer {
    pub fn new(
        config: AudioConfig,
        host: Arc<dyn AudioHost>,
        channel: Arc<dyn Channel>,
    ) -> Result<Self> {
        config.validate()?;
        // Surface codec setup problems at construction rather than at start
        EncodePipeline::new(&config, host.sample_rate())?;

        tracing::info!(
            "Streamer with codec {}Hz x{} app {} {}ms, block {}",
            config.codec.sample_rate,
            config.codec.channels,
            config.codec.app.code(),
            config.codec.frame_duration,
            config.codec.buffer_size
        );

        Ok(Self {
            config,
            host,
            channel,
            session: None,
            counters: Arc::new(Counters::default()),
        })
    }

    /// Start streaming; a device access failure is returned as the error
    pub fn start(&mut self) -> Result<()> {
        match self.try_start()? {
            Ok(()) => Ok(()),
            Err(e) => Err(Self::default_error(e)),
        }
    }

    /// Start streaming, routing a device access failure to `on_error`
    pub fn start_with<F>(&mut self, on_error: F) -> Result<()>
    where
        F: FnOnce(AudioError),
    {
        if let Err(e) = self.try_start()? {
            on_error(e);
        }
        Ok(())
    }

    /// Outer error: transport or codec. Inner error: the host refused the device.
    fn try_start(&mut self) -> Result<std::result::Result<(), AudioError>> {
        if self.session.is_some() {
            tracing::debug!("Streamer already started");
            return Ok(Ok(()));
        }

        if !self.channel.is_connected() {
            tracing::error!("{}", TransportError::NotReady);
            return Err(TransportError::NotReady.into());
        }

        let mut input = match self.host.request_input() {
            Ok(input) => input,
            Err(e) => {
                tracing::warn!("Microphone request failed: {}", e);
                return Ok(Err(e));
            }
        };

        let mut pipeline = EncodePipeline::new(&self.config, self.host.sample_rate())?;
        let gain = self.host.create_gain();
        let channel = self.channel.clone();
        let counters = self.counters.clone();

        let on_block = Box::new(move |block: &[f32]| {
            counters.blocks_captured.fetch_add(1, Ordering::Relaxed);

            let packets = match pipeline.process(block) {
                Ok(packets) => packets,
                Err(e) => {
                    tracing::warn!("Encoding failed: {}", e);
                    return;
                }
            };

            for packet in packets {
                if !channel.is_connected() {
                    counters.packets_dropped.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                let len = packet.len();
                match channel.emit(Message::speak(packet)) {
                    Ok(()) => {
                        counters.packets_sent.fetch_add(1, Ordering::Relaxed);
                        tracing::trace!("Sent packet of {} bytes", len);
                    }
                    Err(e) => {
                        counters.packets_dropped.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!("Dropped packet: {}", e);
                    }
                }
            }
        });

        let processor = match self.host.connect_capture(
            input.as_ref(),
            gain.clone(),
            self.config.codec.buffer_size,
            on_block,
        ) {
            Ok(processor) => processor,
            Err(e) => {
                input.stop();
                tracing::warn!("Could not wire capture: {}", e);
                return Ok(Err(e));
            }
        };

        tracing::info!("Streamer started on {}", input.device_id());
        self.session = Some(Session {
            input,
            gain,
            processor,
        });
        Ok(Ok(()))
    }

    /// Handler used when the caller gives none: the failure becomes the error
    pub fn default_error(error: AudioError) -> Error {
        tracing::error!("NavigatorUserMediaError: {} ({})", error.category(), error);
        Error::Audio(error)
    }

    /// Silence the microphone; packets keep flowing
    pub fn mute(&self) -> Result<()> {
        self.session()?.gain.mute();
        tracing::info!("Mic muted");
        Ok(())
    }

    pub fn un_mute(&self) -> Result<()> {
        self.session()?.gain.set_value(1.0);
        tracing::info!("Mic unmuted");
        Ok(())
    }

    fn session(&self) -> Result<&Session> {
        Ok(self.session.as_ref().ok_or(AudioError::NotStarted)?)
    }

    /// Current input gain, `None` before start
    pub fn gain(&self) -> Option<f32> {
        self.session.as_ref().map(|s| s.gain.value())
    }

    pub fn is_muted(&self) -> bool {
        self.session
            .as_ref()
            .map(|s| s.gain.is_muted())
            .unwrap_or(false)
    }

    pub fn is_started(&self) -> bool {
        self.session.is_some()
    }

    /// Release the microphone, tear down the capture graph and tell the
    /// channel the session ended. Later calls do nothing.
    pub fn stop(&mut self) {
        let Some(mut session) = self.session.take() else {
            tracing::debug!("Streamer not running");
            return;
        };

        // Source first, then the capture sink
        session.input.stop();
        session.processor.disconnect();
        self.channel.disconnect();

        let stats = self.stats();
        tracing::info!(
            "Streamer stopped: {} blocks, {} packets sent, {} dropped",
            stats.blocks_captured,
            stats.packets_sent,
            stats.packets_dropped
        );
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    pub fn stats(&self) -> StreamerStats {
        StreamerStats {
            blocks_captured: self.counters.blocks_captured.load(Ordering::Relaxed),
            packets_sent: self.counters.packets_sent.load(Ordering::Relaxed),
            packets_dropped: self.counters.packets_dropped.load(Ordering::Relaxed),
        }
    }
}

impl Drop for Streamer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{FakeHost, HostEvent};
    use crate::network::MemoryChannel;
    use crate::config::{CodecConfig, SUPPORTED_FRAME_DURATIONS, SUPPORTED_SAMPLE_RATES};
    use crate::protocol::MessageKind;
    use proptest::prelude::*;

    fn setup(host_rate: u32, channel: MemoryChannel) -> (Streamer, Arc<FakeHost>, Arc<MemoryChannel>) {
        let host = Arc::new(FakeHost::new(host_rate));
        let channel = Arc::new(channel);
        let streamer = Streamer::new(AudioConfig::default(), host.clone(), channel.clone()).unwrap();
        (streamer, host, channel)
    }

    fn tone(len: usize) -> Vec<f32> {
        (0..len).map(|i| (i as f32 * 0.05).sin() * 0.3).collect()
    }

    #[test]
    fn test_start_on_disconnected_channel() {
        let (mut streamer, host, channel) = setup(24000, MemoryChannel::disconnected());

        let result = streamer.start();
        assert!(matches!(result, Err(Error::Transport(TransportError::NotReady))));
        assert_eq!(host.access_requests(), 0);
        assert!(!channel.is_connected());
        assert!(channel.sent().is_empty());
        assert!(!streamer.is_started());
    }

    #[test]
    fn test_denied_access_default_handler() {
        let (mut streamer, host, _channel) = setup(24000, MemoryChannel::new());
        host.deny_access(AudioError::DeviceAccessDenied("permission dismissed".into()));

        match streamer.start() {
            Err(Error::Audio(e)) => assert_eq!(e.category(), "NotAllowedError"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(!streamer.is_started());
    }

    #[test]
    fn test_denied_access_custom_handler() {
        let (mut streamer, host, _channel) = setup(24000, MemoryChannel::new());
        host.deny_access(AudioError::DeviceUnavailable("no microphone".into()));

        let mut seen = None;
        streamer.start_with(|e| seen = Some(e)).unwrap();
        assert_eq!(seen, Some(AudioError::DeviceUnavailable("no microphone".into())));
        assert_eq!(host.live_inputs(), 0);
    }

    #[test]
    fn test_capture_emits_speak_packets() {
        let (mut streamer, host, channel) = setup(24000, MemoryChannel::new());
        streamer.start().unwrap();
        assert_eq!(host.live_connections(), 1);

        // 4096 samples at the codec rate hold eight 20ms frames
        host.push_capture(&tone(4096));
        assert_eq!(channel.sent_count(MessageKind::Speak), 8);

        let stats = streamer.stats();
        assert_eq!(stats.blocks_captured, 1);
        assert_eq!(stats.packets_sent, 8);
    }

    #[test]
    fn test_disconnected_channel_drops_silently() {
        let (mut streamer, host, channel) = setup(24000, MemoryChannel::new());
        streamer.start().unwrap();

        channel.set_connected(false);
        host.push_capture(&tone(4096));
        assert_eq!(channel.sent_count(MessageKind::Speak), 0);
        assert_eq!(streamer.stats().packets_dropped, 8);
    }

    #[test]
    fn test_mute_and_unmute() {
        let (mut streamer, host, channel) = setup(24000, MemoryChannel::new());
        assert!(matches!(
            streamer.mute(),
            Err(Error::Audio(AudioError::NotStarted))
        ));
        assert_eq!(streamer.gain(), None);

        streamer.start().unwrap();
        streamer.mute().unwrap();
        assert_eq!(streamer.gain(), Some(0.0));
        assert!(streamer.is_muted());

        // Muting is applied in the graph; encoding continues
        host.push_capture(&tone(4096));
        assert_eq!(channel.sent_count(MessageKind::Speak), 8);

        streamer.un_mute().unwrap();
        assert_eq!(streamer.gain(), Some(1.0));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (mut streamer, host, channel) = setup(44100, MemoryChannel::new());
        streamer.start().unwrap();
        assert_eq!(host.live_inputs(), 1);

        streamer.stop();
        assert_eq!(host.live_connections(), 0);
        assert_eq!(host.live_inputs(), 0);
        assert_eq!(channel.disconnect_count(), 1);

        streamer.stop();
        streamer.stop();
        assert_eq!(host.live_connections(), 0);
        assert_eq!(channel.disconnect_count(), 1);
        assert_eq!(host.push_capture(&tone(4096)), 0);
    }

    #[test]
    fn test_stop_releases_input_before_capture_sink() {
        let (mut streamer, host, _channel) = setup(24000, MemoryChannel::new());
        streamer.start().unwrap();
        streamer.stop();

        assert_eq!(
            host.events(),
            vec![HostEvent::InputStopped, HostEvent::CaptureDisconnected]
        );
    }

    #[test]
    fn test_restart_after_stop() {
        let (mut streamer, host, channel) = setup(24000, MemoryChannel::new());
        streamer.start().unwrap();
        streamer.stop();
        streamer.start().unwrap();

        host.push_capture(&tone(4096));
        assert_eq!(channel.sent_count(MessageKind::Speak), 8);
        assert_eq!(host.access_requests(), 2);
    }

    #[test]
    fn test_stereo_codec_from_mono_capture() {
        let host = Arc::new(FakeHost::new(24000));
        let channel = Arc::new(MemoryChannel::new());
        let mut config = AudioConfig::default();
        config.codec.channels = 2;
        let mut streamer = Streamer::new(config, host.clone(), channel.clone()).unwrap();
        streamer.start().unwrap();

        host.push_capture(&tone(4096));
        assert_eq!(channel.sent_count(MessageKind::Speak), 8);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let host = Arc::new(FakeHost::new(44100));
        let channel = Arc::new(MemoryChannel::new());
        let mut config = AudioConfig::default();
        config.codec.sample_rate = 22050;
        assert!(matches!(
            Streamer::new(config, host, channel),
            Err(Error::Config(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_disconnected_start_never_touches_the_device(
            sample_rate in prop::sample::select(SUPPORTED_SAMPLE_RATES.to_vec()),
            frame_duration in prop::sample::select(SUPPORTED_FRAME_DURATIONS.to_vec()),
            host_rate in prop::sample::select(vec![22050u32, 44100, 48000]),
        ) {
            let mut config = AudioConfig::default();
            config.codec.sample_rate = sample_rate;
            config.codec.frame_duration = frame_duration;
            config.codec.buffer_size = CodecConfig::recommended_buffer_size(sample_rate);

            let host = Arc::new(FakeHost::new(host_rate));
            let channel = Arc::new(MemoryChannel::disconnected());
            let mut streamer = Streamer::new(config, host.clone(), channel.clone()).unwrap();

            prop_assert!(matches!(
                streamer.start(),
                Err(Error::Transport(TransportError::NotReady))
            ));
            prop_assert_eq!(host.access_requests(), 0);
            prop_assert_eq!(host.live_connections(), 0);
            prop_assert!(channel.sent().is_empty());
            prop_assert!(!streamer.is_started());
        }
    }
}
