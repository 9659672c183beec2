//! Audio host backed by cpal devices
//!
//! Each processor runs its cpal stream on a dedicated thread, which keeps the
//! stream alive until the node is disconnected. Device callbacks deliver
//! whatever block size the backend prefers; the processors rebuffer so the
//! role callbacks always see exactly `buffer_size` mono samples at the host
//! rate.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{DefaultStreamConfigError, SampleFormat, StreamConfig};
use crossbeam_channel::{bounded, Receiver, Sender};

use crate::audio::device::{get_default_input_device, get_default_output_device, get_device_by_id};
use crate::audio::gain::GainNode;
use crate::audio::host::{AudioHost, CaptureCallback, InputStream, PlaybackCallback, ProcessorNode};
use crate::codec::Resampler;
use crate::error::AudioError;

/// Audio host using the platform's default cpal backend
pub struct CpalHost {
    sample_rate: u32,
    input_device: Option<String>,
    output_device: Option<String>,
}

impl CpalHost {
    /// Host on the default devices, running at the default output rate
    pub fn new() -> Result<Self, AudioError> {
        Self::with_devices(None, None)
    }

    /// Host on specific devices (ids from `list_devices`)
    pub fn with_devices(
        input_device: Option<String>,
        output_device: Option<String>,
    ) -> Result<Self, AudioError> {
        let output = match &output_device {
            Some(id) => get_device_by_id(id)?,
            None => get_default_output_device()?,
        };
        let config = output
            .inner()
            .default_output_config()
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        tracing::info!(
            "Audio host on {} at {}Hz",
            output.name,
            config.sample_rate().0
        );

        Ok(Self {
            sample_rate: config.sample_rate().0,
            input_device,
            output_device,
        })
    }

    fn output_device(&self) -> Result<cpal::Device, AudioError> {
        let device = match &self.output_device {
            Some(id) => get_device_by_id(id)?,
            None => get_default_output_device()?,
        };
        Ok(device.into_inner())
    }
}

impl AudioHost for CpalHost {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn request_input(&self) -> Result<Box<dyn InputStream>, AudioError> {
        let device = match &self.input_device {
            Some(id) => get_device_by_id(id).map_err(|e| match e {
                AudioError::DeviceNotFound(id) => AudioError::DeviceUnavailable(id),
                other => other,
            })?,
            None => get_default_input_device()?,
        };

        // Opening the default config is where backends report permission problems
        device
            .inner()
            .default_input_config()
            .map_err(|e| match e {
                DefaultStreamConfigError::DeviceNotAvailable => {
                    AudioError::DeviceUnavailable(format!("{} is not available", device.name))
                }
                DefaultStreamConfigError::StreamTypeNotSupported => {
                    AudioError::DeviceUnavailable(format!("{} cannot capture", device.name))
                }
                DefaultStreamConfigError::BackendSpecific { err } => {
                    AudioError::DeviceAccessDenied(err.to_string())
                }
            })?;

        tracing::info!("Microphone access granted: {}", device.name);
        Ok(Box::new(CpalInput {
            device_id: device.id,
            live: true,
        }))
    }

    fn connect_capture(
        &self,
        input: &dyn InputStream,
        gain: GainNode,
        buffer_size: usize,
        mut on_block: CaptureCallback,
    ) -> Result<Box<dyn ProcessorNode>, AudioError> {
        if !input.is_live() {
            return Err(AudioError::StreamError("input stream already stopped".into()));
        }

        let device = get_device_by_id(input.device_id())?.into_inner();
        let supported = device
            .default_input_config()
            .map_err(|e| AudioError::StreamError(e.to_string()))?;
        if supported.sample_format() != SampleFormat::F32 {
            return Err(AudioError::UnsupportedFormat(format!(
                "{:?} capture",
                supported.sample_format()
            )));
        }

        let config: StreamConfig = supported.config();
        let device_channels = config.channels as usize;
        let mut resampler = Resampler::new(config.sample_rate.0, self.sample_rate, 1, buffer_size);
        let mut pending: Vec<f32> = Vec::with_capacity(buffer_size * 2);

        let name = format!("capture-{}", input.device_id());
        spawn_stream(name, move |error_tx| {
            device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    // Channel 0 only, as a mono source
                    let mono: Vec<f32> = data.iter().step_by(device_channels).copied().collect();
                    pending.extend(resampler.resample(&mono));

                    let mut consumed = 0;
                    while pending.len() - consumed >= buffer_size {
                        let block = &mut pending[consumed..consumed + buffer_size];
                        gain.apply(block);
                        on_block(block);
                        consumed += buffer_size;
                    }
                    pending.drain(..consumed);
                },
                move |err| {
                    let _ = error_tx.try_send(AudioError::StreamError(err.to_string()));
                },
                None,
            )
        })
    }

    fn connect_playback(
        &self,
        gain: GainNode,
        buffer_size: usize,
        mut fill: PlaybackCallback,
    ) -> Result<Box<dyn ProcessorNode>, AudioError> {
        let device = self.output_device()?;
        let supported = device
            .default_output_config()
            .map_err(|e| AudioError::StreamError(e.to_string()))?;
        if supported.sample_format() != SampleFormat::F32 {
            return Err(AudioError::UnsupportedFormat(format!(
                "{:?} playback",
                supported.sample_format()
            )));
        }

        let config: StreamConfig = supported.config();
        let device_channels = config.channels as usize;
        let mut block = vec![0.0f32; buffer_size];
        let mut pending: VecDeque<f32> = VecDeque::with_capacity(buffer_size * 2);

        spawn_stream("playback".to_string(), move |error_tx| {
            device.build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for frame in data.chunks_mut(device_channels) {
                        if pending.is_empty() {
                            fill(&mut block);
                            gain.apply(&mut block);
                            pending.extend(block.iter().copied());
                        }
                        let sample = pending.pop_front().unwrap_or(0.0);
                        frame.fill(sample);
                    }
                },
                move |err| {
                    let _ = error_tx.try_send(AudioError::StreamError(err.to_string()));
                },
                None,
            )
        })
    }
}

/// Build and run a stream on its own thread; returns once it is playing
fn spawn_stream<F>(name: String, build: F) -> Result<Box<dyn ProcessorNode>, AudioError>
where
    F: FnOnce(Sender<AudioError>) -> Result<cpal::Stream, cpal::BuildStreamError> + Send + 'static,
{
    let running = Arc::new(AtomicBool::new(true));
    let running_for_loop = running.clone();
    let (error_tx, error_rx) = bounded::<AudioError>(16);
    let (ready_tx, ready_rx) = bounded::<Result<(), AudioError>>(1);

    let handle = thread::Builder::new()
        .name(name.clone())
        .spawn(move || {
            let stream = match build(error_tx) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
                return;
            }
            let _ = ready_tx.send(Ok(()));

            // Keep thread alive while running; the stream stops when dropped
            while running_for_loop.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(10));
            }
        })
        .map_err(|e| AudioError::StreamError(e.to_string()))?;

    let ready = ready_rx
        .recv()
        .unwrap_or_else(|_| Err(AudioError::StreamError(format!("{} thread exited", name))));
    if let Err(e) = ready {
        let _ = handle.join();
        return Err(e);
    }

    tracing::debug!("Stream {} running", name);
    Ok(Box::new(CpalNode {
        name,
        running,
        thread_handle: Some(handle),
        error_rx,
    }))
}

struct CpalInput {
    device_id: String,
    live: bool,
}

impl InputStream for CpalInput {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn is_live(&self) -> bool {
        self.live
    }

    fn stop(&mut self) {
        if self.live {
            self.live = false;
            tracing::debug!("Released {}", self.device_id);
        }
    }
}

/// A running cpal stream
struct CpalNode {
    name: String,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
    error_rx: Receiver<AudioError>,
}

impl CpalNode {
    fn drain_errors(&self) {
        while let Ok(err) = self.error_rx.try_recv() {
            tracing::warn!("Stream {} reported: {}", self.name, err);
        }
    }
}

impl ProcessorNode for CpalNode {
    fn disconnect(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
            self.drain_errors();
            tracing::debug!("Stream {} stopped", self.name);
        }
    }

    fn is_connected(&self) -> bool {
        self.drain_errors();
        self.thread_handle.is_some()
    }
}

impl Drop for CpalNode {
    fn drop(&mut self) {
        self.disconnect();
    }
}
