//! Opus codec wrapper and sample rate conversion

pub mod decoder;
pub mod encoder;
pub mod resampler;

pub use decoder::OpusDecoder;
pub use encoder::OpusEncoder;
pub use resampler::{resample_buffer, Resampler};
