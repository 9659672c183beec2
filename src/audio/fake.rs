//! In-process audio host
//!
//! No devices, no threads: test code pushes capture blocks and pulls playback
//! blocks by hand, so everything the roles do with the host is observable.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::audio::gain::GainNode;
use crate::audio::host::{AudioHost, CaptureCallback, InputStream, PlaybackCallback, ProcessorNode};
use crate::error::AudioError;

struct CaptureSlot {
    gain: GainNode,
    buffer_size: usize,
    callback: CaptureCallback,
    connected: Arc<AtomicBool>,
}

struct PlaybackSlot {
    gain: GainNode,
    buffer_size: usize,
    callback: PlaybackCallback,
    connected: Arc<AtomicBool>,
}

/// Teardown steps, in the order the host saw them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    InputStopped,
    CaptureDisconnected,
    PlaybackDisconnected,
}

/// Deterministic host for tests and demos
pub struct FakeHost {
    sample_rate: u32,
    denial: Mutex<Option<AudioError>>,
    access_requests: AtomicUsize,
    capture: Mutex<Vec<CaptureSlot>>,
    playback: Mutex<Vec<PlaybackSlot>>,
    live_inputs: Arc<AtomicUsize>,
    events: Arc<Mutex<Vec<HostEvent>>>,
}

impl FakeHost {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            denial: Mutex::new(None),
            access_requests: AtomicUsize::new(0),
            capture: Mutex::new(Vec::new()),
            playback: Mutex::new(Vec::new()),
            live_inputs: Arc::new(AtomicUsize::new(0)),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Make every following `request_input` fail with `error`
    pub fn deny_access(&self, error: AudioError) {
        *self.denial.lock() = Some(error);
    }

    pub fn allow_access(&self) {
        *self.denial.lock() = None;
    }

    /// Number of `request_input` calls so far
    pub fn access_requests(&self) -> usize {
        self.access_requests.load(Ordering::SeqCst)
    }

    /// Input streams granted and not yet stopped
    pub fn live_inputs(&self) -> usize {
        self.live_inputs.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<HostEvent> {
        self.events.lock().clone()
    }

    /// Processor nodes still wired into the graph
    pub fn live_connections(&self) -> usize {
        let capture = self
            .capture
            .lock()
            .iter()
            .filter(|s| s.connected.load(Ordering::SeqCst))
            .count();
        let playback = self
            .playback
            .lock()
            .iter()
            .filter(|s| s.connected.load(Ordering::SeqCst))
            .count();
        capture + playback
    }

    /// Feed one block to every connected capture processor
    ///
    /// The block must be exactly the processor's buffer size, as a real host
    /// guarantees. Returns how many processors ran.
    pub fn push_capture(&self, block: &[f32]) -> usize {
        let mut slots = self.capture.lock();
        slots.retain(|s| s.connected.load(Ordering::SeqCst));

        let mut ran = 0;
        for slot in slots.iter_mut() {
            assert_eq!(
                block.len(),
                slot.buffer_size,
                "capture block must match the processor buffer size"
            );
            let mut samples = block.to_vec();
            slot.gain.apply(&mut samples);
            (slot.callback)(&samples);
            ran += 1;
        }
        ran
    }

    /// Run the first connected playback processor once and return what the
    /// host would send to the speakers
    pub fn pull_playback(&self) -> Option<Vec<f32>> {
        let mut slots = self.playback.lock();
        slots.retain(|s| s.connected.load(Ordering::SeqCst));

        let slot = slots.first_mut()?;
        let mut out = vec![0.0f32; slot.buffer_size];
        (slot.callback)(&mut out);
        slot.gain.apply(&mut out);
        Some(out)
    }
}

impl AudioHost for FakeHost {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn request_input(&self) -> Result<Box<dyn InputStream>, AudioError> {
        self.access_requests.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.denial.lock().clone() {
            return Err(error);
        }
        self.live_inputs.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeInput {
            live: true,
            counter: self.live_inputs.clone(),
            events: self.events.clone(),
        }))
    }

    fn connect_capture(
        &self,
        input: &dyn InputStream,
        gain: GainNode,
        buffer_size: usize,
        on_block: CaptureCallback,
    ) -> Result<Box<dyn ProcessorNode>, AudioError> {
        if !input.is_live() {
            return Err(AudioError::StreamError("input stream already stopped".into()));
        }
        let connected = Arc::new(AtomicBool::new(true));
        self.capture.lock().push(CaptureSlot {
            gain,
            buffer_size,
            callback: on_block,
            connected: connected.clone(),
        });
        Ok(Box::new(FakeNode {
            connected,
            kind: HostEvent::CaptureDisconnected,
            events: self.events.clone(),
        }))
    }

    fn connect_playback(
        &self,
        gain: GainNode,
        buffer_size: usize,
        fill: PlaybackCallback,
    ) -> Result<Box<dyn ProcessorNode>, AudioError> {
        let connected = Arc::new(AtomicBool::new(true));
        self.playback.lock().push(PlaybackSlot {
            gain,
            buffer_size,
            callback: fill,
            connected: connected.clone(),
        });
        Ok(Box::new(FakeNode {
            connected,
            kind: HostEvent::PlaybackDisconnected,
            events: self.events.clone(),
        }))
    }
}

struct FakeInput {
    live: bool,
    counter: Arc<AtomicUsize>,
    events: Arc<Mutex<Vec<HostEvent>>>,
}

impl InputStream for FakeInput {
    fn device_id(&self) -> &str {
        "fake:input"
    }

    fn is_live(&self) -> bool {
        self.live
    }

    fn stop(&mut self) {
        if self.live {
            self.live = false;
            self.counter.fetch_sub(1, Ordering::SeqCst);
            self.events.lock().push(HostEvent::InputStopped);
        }
    }
}

impl Drop for FakeInput {
    fn drop(&mut self) {
        self.stop();
    }
}

struct FakeNode {
    connected: Arc<AtomicBool>,
    kind: HostEvent,
    events: Arc<Mutex<Vec<HostEvent>>>,
}

impl ProcessorNode for FakeNode {
    fn disconnect(&mut self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.events.lock().push(self.kind);
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for FakeNode {
    fn drop(&mut self) {
        self.disconnect();
    }
}
