//! Host audio capability interface
//!
//! The roles never touch a device API directly. They receive an `AudioHost`
//! explicitly and ask it for an input stream, gain nodes and periodic
//! processors. `CpalHost` drives real devices; `FakeHost` drives everything
//! from test code.

use crate::audio::gain::GainNode;
use crate::error::AudioError;

/// Invoked with exactly `buffer_size` captured samples (after input gain)
pub type CaptureCallback = Box<dyn FnMut(&[f32]) + Send + 'static>;

/// Must fill exactly `buffer_size` samples for output (before output gain)
pub type PlaybackCallback = Box<dyn FnMut(&mut [f32]) + Send + 'static>;

/// A granted capture device
pub trait InputStream: Send {
    /// Identifier the host uses to open the device
    fn device_id(&self) -> &str;

    /// False once `stop` has released the device
    fn is_live(&self) -> bool;

    /// Release the device; further calls do nothing
    fn stop(&mut self);
}

/// A periodic processor wired into the host graph
pub trait ProcessorNode: Send {
    /// Detach from the graph and stop callbacks; further calls do nothing
    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;
}

/// Audio context passed to each role
pub trait AudioHost: Send + Sync {
    /// Rate of the host capture and playback graph
    fn sample_rate(&self) -> u32;

    /// Ask for microphone access
    fn request_input(&self) -> Result<Box<dyn InputStream>, AudioError>;

    fn create_gain(&self) -> GainNode {
        GainNode::default()
    }

    /// Wire input -> gain -> processor, calling `on_block` once per block
    fn connect_capture(
        &self,
        input: &dyn InputStream,
        gain: GainNode,
        buffer_size: usize,
        on_block: CaptureCallback,
    ) -> Result<Box<dyn ProcessorNode>, AudioError>;

    /// Wire processor -> gain -> output, calling `fill` whenever output needs a block
    fn connect_playback(
        &self,
        gain: GainNode,
        buffer_size: usize,
        fill: PlaybackCallback,
    ) -> Result<Box<dyn ProcessorNode>, AudioError>;
}
