//! Linear interpolation sample rate conversion
//!
//! The converter keeps its fractional read position and the last input frame
//! between calls, so blocks handed over by a host callback join up without
//! discontinuities.

/// Stateful linear resampler over interleaved f32 frames
pub struct Resampler {
    input_rate: u32,
    output_rate: u32,
    channels: usize,
    /// Input frames advanced per output frame
    step: f64,
    /// Next output position, in input frames relative to the start of the next block.
    /// Values in [-1, 0) interpolate from the carried `last` frame.
    position: f64,
    last: Option<Vec<f32>>,
    /// Expected input block size, used to size output allocations
    buffer_size: usize,
}

impl Resampler {
    pub fn new(input_rate: u32, output_rate: u32, channels: u16, buffer_size: usize) -> Self {
        assert!(input_rate > 0 && output_rate > 0, "sample rates must be positive");
        let channels = channels.max(1) as usize;
        Self {
            input_rate,
            output_rate,
            channels,
            step: input_rate as f64 / output_rate as f64,
            position: 0.0,
            last: None,
            buffer_size,
        }
    }

    /// Whether input passes through untouched
    pub fn is_identity(&self) -> bool {
        self.input_rate == self.output_rate
    }

    /// Upper bound on output samples for `input_len` input samples
    pub fn output_len_hint(&self, input_len: usize) -> usize {
        let frames = input_len / self.channels;
        let out_frames =
            (frames as u64 * self.output_rate as u64).div_ceil(self.input_rate as u64) as usize;
        (out_frames + 1) * self.channels
    }

    /// Convert one block; a trailing partial frame is ignored
    pub fn resample(&mut self, input: &[f32]) -> Vec<f32> {
        if self.is_identity() {
            return input.to_vec();
        }

        let channels = self.channels;
        let frames = input.len() / channels;
        if frames == 0 {
            return Vec::new();
        }

        let hint = self.output_len_hint(input.len().max(self.buffer_size));
        let mut output = Vec::with_capacity(hint);
        let last_frame = (frames - 1) as f64;

        while self.position <= last_frame {
            let base = self.position.floor();
            let frac = (self.position - base) as f32;
            let index = base as isize;

            for ch in 0..channels {
                let a = self.sample_at(input, index, ch);
                let value = if frac == 0.0 {
                    a
                } else {
                    let b = self.sample_at(input, index + 1, ch);
                    a + (b - a) * frac
                };
                output.push(value);
            }

            self.position += self.step;
        }

        self.position -= frames as f64;
        let tail = (frames - 1) * channels;
        self.last = Some(input[tail..tail + channels].to_vec());

        output
    }

    /// Forget carried state, as if no block had been seen
    pub fn reset(&mut self) {
        self.position = 0.0;
        self.last = None;
    }

    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    fn sample_at(&self, input: &[f32], frame: isize, ch: usize) -> f32 {
        if frame < 0 {
            self.last.as_ref().map(|l| l[ch]).unwrap_or(0.0)
        } else {
            input[frame as usize * self.channels + ch]
        }
    }
}

/// One-shot conversion of a whole buffer
pub fn resample_buffer(input: &[f32], input_rate: u32, output_rate: u32, channels: u16) -> Vec<f32> {
    Resampler::new(input_rate, output_rate, channels, input.len()).resample(input)
}
