//! Audio subsystem module

pub mod cpal_host;
pub mod device;
pub mod fake;
pub mod gain;
pub mod host;
pub mod queue;

pub use cpal_host::CpalHost;
pub use device::{list_devices, AudioDeviceInfo};
pub use fake::{FakeHost, HostEvent};
pub use gain::GainNode;
pub use host::{AudioHost, CaptureCallback, InputStream, PlaybackCallback, ProcessorNode};
pub use queue::AudioQueue;
