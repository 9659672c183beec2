//! Scalar volume multiplier shared between a role and the host audio graph

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Gain node: 0 is muted, 1 is unity
///
/// Clones share the same value, so the role can adjust what the host applies
/// from its audio thread.
#[derive(Debug, Clone)]
pub struct GainNode {
    bits: Arc<AtomicU32>,
}

impl GainNode {
    pub fn new(value: f32) -> Self {
        Self {
            bits: Arc::new(AtomicU32::new(value.to_bits())),
        }
    }

    pub fn value(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }

    /// Set the multiplier; non-finite or negative values are ignored
    pub fn set_value(&self, value: f32) -> bool {
        if !value.is_finite() || value < 0.0 {
            tracing::warn!("Ignoring invalid gain value {}", value);
            return false;
        }
        self.bits.store(value.to_bits(), Ordering::Relaxed);
        true
    }

    pub fn mute(&self) {
        self.bits.store(0.0f32.to_bits(), Ordering::Relaxed);
    }

    pub fn is_muted(&self) -> bool {
        self.value() == 0.0
    }

    /// Multiply `samples` in place
    pub fn apply(&self, samples: &mut [f32]) {
        let gain = self.value();
        if gain == 1.0 {
            return;
        }
        for sample in samples.iter_mut() {
            *sample *= gain;
        }
    }
}

impl Default for GainNode {
    fn default() -> Self {
        Self::new(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_value() {
        let gain = GainNode::default();
        let host_side = gain.clone();
        assert_eq!(host_side.value(), 1.0);

        gain.mute();
        assert!(host_side.is_muted());
        assert!(gain.set_value(1.0));
        assert!(!host_side.is_muted());
    }

    #[test]
    fn test_apply() {
        let gain = GainNode::new(0.5);
        let mut samples = [1.0, -0.5, 0.25];
        gain.apply(&mut samples);
        assert_eq!(samples, [0.5, -0.25, 0.125]);
    }

    #[test]
    fn test_rejects_invalid_values() {
        let gain = GainNode::new(0.8);
        assert!(!gain.set_value(f32::NAN));
        assert!(!gain.set_value(-1.0));
        assert_eq!(gain.value(), 0.8);
    }
}
