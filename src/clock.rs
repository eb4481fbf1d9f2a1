// src/clock.rs
//
// Monotonic audio clocks.
//
// The scheduler only ever reads time; it never advances it. Time moves
// forward because the audio side renders samples (SampleClock) or because
// the host reports its own audio time (ManualClock).

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

/// A monotonic, high-resolution time source in seconds.
///
/// The epoch is arbitrary. Reading must have no side effects so it can be
/// called as often as the scheduler likes.
pub trait AudioClock {
    fn now(&self) -> f64;
}

/// Clock derived from the number of frames the renderer has produced.
///
/// Only the renderer writes the counter, so the clock advances in
/// block-sized steps, the same way a browser audio context's
/// `currentTime` moves in render quanta.
#[derive(Debug, Clone)]
pub struct SampleClock {
    frames: Arc<AtomicU64>,
    sample_rate: f64,
}

impl SampleClock {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            frames: Arc::new(AtomicU64::new(0)),
            sample_rate,
        }
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Frames rendered so far.
    #[inline]
    pub fn frame_position(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    /// Advance by `frames`. Called by the renderer after each block.
    pub(crate) fn advance(&self, frames: u64) {
        self.frames.fetch_add(frames, Ordering::Release);
    }

    /// Convert a clock time to the nearest frame index.
    #[inline]
    pub fn seconds_to_frames(&self, seconds: f64) -> u64 {
        (seconds.max(0.0) * self.sample_rate).round() as u64
    }
}

impl AudioClock for SampleClock {
    #[inline]
    fn now(&self) -> f64 {
        self.frame_position() as f64 / self.sample_rate
    }
}

/// Clock whose time is set from outside.
///
/// Used when the host owns the real audio clock (the browser passes
/// `AudioContext.currentTime` on every frame) and in tests.
/// Time stored as f64 bits (no AtomicF64 in std).
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    seconds_bits: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            seconds_bits: Arc::new(AtomicU64::new(start.to_bits())),
        }
    }

    /// Move the clock to `seconds`. Earlier times are ignored.
    pub fn set(&self, seconds: f64) {
        if seconds > self.now() {
            self.seconds_bits.store(seconds.to_bits(), Ordering::Release);
        }
    }

    pub fn advance(&self, seconds: f64) {
        self.set(self.now() + seconds);
    }
}

impl AudioClock for ManualClock {
    #[inline]
    fn now(&self) -> f64 {
        f64::from_bits(self.seconds_bits.load(Ordering::Acquire))
    }
}
