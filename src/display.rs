// src/display.rs
//
// Visual beat indicator.

use std::fmt;

/// Receives beat highlights from the scheduler.
///
/// Implementations must return quickly; they are called from inside the
/// scheduling loop.
pub trait BeatDisplay {
    /// Show beat `index` as active and every other beat as inactive.
    fn highlight_beat(&mut self, index: usize);

    /// Called before playback starts with the number of beat slots.
    fn set_beat_count(&mut self, _count: usize) {}
}

/// A row of beat slots with at most one active.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BeatIndicator {
    slots: Vec<bool>,
    highlights: u64,
}

impl BeatIndicator {
    pub fn new(count: usize) -> Self {
        Self {
            slots: vec![false; count],
            highlights: 0,
        }
    }

    pub fn slots(&self) -> &[bool] {
        &self.slots
    }

    pub fn active(&self) -> Option<usize> {
        self.slots.iter().position(|&on| on)
    }

    /// Total number of highlights received.
    pub fn highlight_count(&self) -> u64 {
        self.highlights
    }
}

impl BeatDisplay for BeatIndicator {
    fn highlight_beat(&mut self, index: usize) {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            *slot = i == index;
        }
        self.highlights += 1;
    }

    fn set_beat_count(&mut self, count: usize) {
        self.slots = vec![false; count];
    }
}

impl fmt::Display for BeatIndicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &on in &self.slots {
            f.write_str(if on { "[●]" } else { "[○]" })?;
        }
        Ok(())
    }
}
