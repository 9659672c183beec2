//! Bounded sample queue between packet arrival and playback pull
//!
//! One producer (the decode path) appends, one consumer (the playback
//! callback) drains, with no lock between them. Reads always return the
//! requested length; when the queue runs short the tail is padded with
//! silence. When a write would exceed the capacity the oldest samples are
//! evicted, which caps playback latency.

use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free FIFO of decoded samples at playback rate
pub struct AudioQueue {
    queue: ArrayQueue<f32>,
    /// Samples evicted to honor the capacity
    dropped_samples: AtomicU64,
    /// Reads that had to be padded with silence
    underrun_count: AtomicU64,
    samples_written: AtomicU64,
    samples_read: AtomicU64,
}

impl AudioQueue {
    /// Create a queue holding at most `capacity` samples
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be positive");
        Self {
            queue: ArrayQueue::new(capacity),
            dropped_samples: AtomicU64::new(0),
            underrun_count: AtomicU64::new(0),
            samples_written: AtomicU64::new(0),
            samples_read: AtomicU64::new(0),
        }
    }

    /// Append `samples`, evicting the oldest ones past capacity
    pub fn write(&self, samples: &[f32]) {
        self.samples_written
            .fetch_add(samples.len() as u64, Ordering::Relaxed);

        // Only the newest `capacity` samples can survive this write
        let skipped = samples.len().saturating_sub(self.queue.capacity());
        let mut dropped = skipped as u64;
        for sample in &samples[skipped..] {
            if self.queue.force_push(*sample).is_some() {
                dropped += 1;
            }
        }
        if dropped > 0 {
            self.dropped_samples.fetch_add(dropped, Ordering::Relaxed);
        }
    }

    /// Take exactly `n` samples: the oldest queued ones, zero padded when short
    pub fn read(&self, n: usize) -> Vec<f32> {
        let mut out = vec![0.0f32; n];
        self.read_into(&mut out);
        out
    }

    /// Like `read` but into a caller buffer; returns how many samples were real
    pub fn read_into(&self, out: &mut [f32]) -> usize {
        let mut available = 0;
        for slot in out.iter_mut() {
            match self.queue.pop() {
                Some(sample) => {
                    *slot = sample;
                    available += 1;
                }
                None => break,
            }
        }
        if available < out.len() {
            self.underrun_count.fetch_add(1, Ordering::Relaxed);
            out[available..].fill(0.0);
        }
        self.samples_read
            .fetch_add(available as u64, Ordering::Relaxed);
        available
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub fn clear(&self) {
        while self.queue.pop().is_some() {}
    }

    pub fn dropped_samples(&self) -> u64 {
        self.dropped_samples.load(Ordering::Relaxed)
    }

    pub fn underrun_count(&self) -> u64 {
        self.underrun_count.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            queued: self.len(),
            capacity: self.capacity(),
            samples_written: self.samples_written.load(Ordering::Relaxed),
            samples_read: self.samples_read.load(Ordering::Relaxed),
            dropped_samples: self.dropped_samples(),
            underruns: self.underrun_count(),
        }
    }
}

/// Queue statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStats {
    pub queued: usize,
    pub capacity: usize,
    pub samples_written: u64,
    pub samples_read: u64,
    pub dropped_samples: u64,
    pub underruns: u64,
}

impl QueueStats {
    /// Fill level as a fraction of capacity
    pub fn fill_level(&self) -> f32 {
        self.queued as f32 / self.capacity as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_queue_basic() {
        let queue = AudioQueue::new(16);
        queue.write(&[1.0, 2.0, 3.0]);
        queue.write(&[4.0]);
        assert_eq!(queue.len(), 4);

        assert_eq!(queue.read(2), vec![1.0, 2.0]);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.read(2), vec![3.0, 4.0]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_short_read_is_padded() {
        let queue = AudioQueue::new(16);
        queue.write(&[0.5, 0.25]);

        let out = queue.read(5);
        assert_eq!(out, vec![0.5, 0.25, 0.0, 0.0, 0.0]);
        assert!(queue.is_empty());
        assert_eq!(queue.underrun_count(), 1);

        assert_eq!(queue.read(3), vec![0.0; 3]);
        assert_eq!(queue.underrun_count(), 2);
    }

    #[test]
    fn test_overflow_evicts_oldest() {
        let queue = AudioQueue::new(4);
        queue.write(&[1.0, 2.0, 3.0]);
        queue.write(&[4.0, 5.0, 6.0]);

        assert_eq!(queue.len(), 4);
        assert_eq!(queue.dropped_samples(), 2);
        assert_eq!(queue.read(4), vec![3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_write_larger_than_capacity() {
        let queue = AudioQueue::new(3);
        queue.write(&[9.0]);
        queue.write(&[1.0, 2.0, 3.0, 4.0, 5.0]);

        assert_eq!(queue.dropped_samples(), 3);
        assert_eq!(queue.read(3), vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_read_into() {
        let queue = AudioQueue::new(8);
        queue.write(&[1.0, 2.0]);

        let mut out = [7.0f32; 4];
        assert_eq!(queue.read_into(&mut out), 2);
        assert_eq!(out, [1.0, 2.0, 0.0, 0.0]);
    }

    #[test]
    fn test_stats() {
        let queue = AudioQueue::new(8);
        queue.write(&[0.0; 6]);
        queue.read(4);
        let stats = queue.stats();
        assert_eq!(stats.queued, 2);
        assert_eq!(stats.samples_written, 6);
        assert_eq!(stats.samples_read, 4);
        assert_eq!(stats.underruns, 0);
        assert_eq!(stats.fill_level(), 0.25);
    }

    #[test]
    fn test_producer_and_consumer_threads() {
        let queue = std::sync::Arc::new(AudioQueue::new(64));
        let producer = {
            let queue = queue.clone();
            std::thread::spawn(move || {
                for i in 0..1000 {
                    queue.write(&[i as f32]);
                }
            })
        };

        let mut out = [0.0f32; 8];
        let mut last = -1.0f32;
        for _ in 0..10_000 {
            if queue.len() >= out.len() {
                let real = queue.read_into(&mut out);
                // Eviction may skip samples but never reorders them
                for sample in &out[..real] {
                    assert!(*sample > last);
                    last = *sample;
                }
            }
        }
        producer.join().unwrap();
        assert!(queue.len() <= 64);
    }

    proptest! {
        #[test]
        fn prop_fifo_order(
            writes in prop::collection::vec(prop::collection::vec(-1.0f32..1.0, 0..64), 1..8),
            take in 0usize..512,
        ) {
            let all: Vec<f32> = writes.iter().flatten().copied().collect();
            let k = take.min(all.len());

            let queue = AudioQueue::new(all.len().max(1));
            for chunk in &writes {
                queue.write(chunk);
            }

            prop_assert_eq!(queue.read(k), all[..k].to_vec());
            prop_assert_eq!(queue.len(), all.len() - k);
            prop_assert_eq!(queue.read(all.len() - k), all[k..].to_vec());
        }
    }
}
