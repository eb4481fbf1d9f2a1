// src/testing.rs
//
// Test doubles shared by the unit tests.

use crate::clock::{AudioClock, ManualClock};
use crate::display::BeatDisplay;
use crate::player::{SoundOutput, VoiceId};
use crate::sound::{SoundBank, SoundBuffer, SoundVariant};

/// Frames in the synthetic accent buffer, used to tell variants apart.
pub const ACCENT_FRAMES: usize = 30;
/// Frames in the synthetic regular buffer.
pub const REGULAR_FRAMES: usize = 20;

/// One `schedule_sound` call as seen by [`RecordingOutput`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scheduled {
    pub voice: VoiceId,
    pub start: f64,
    pub duration: f64,
    pub frames: usize,
    /// Clock reading when the request was made.
    pub emitted_at: f64,
}

impl Scheduled {
    pub fn variant(&self) -> SoundVariant {
        if self.frames == ACCENT_FRAMES {
            SoundVariant::Accent
        } else {
            SoundVariant::Regular
        }
    }
}

/// Sound output that records requests against a manual clock.
#[derive(Debug, Default)]
pub struct RecordingOutput {
    pub clock: ManualClock,
    pub sounds: Vec<Scheduled>,
    pub silenced: Vec<VoiceId>,
    next_voice: u64,
}

impl RecordingOutput {
    pub fn new(start: f64) -> Self {
        Self {
            clock: ManualClock::new(start),
            ..Default::default()
        }
    }

    pub fn starts(&self) -> Vec<f64> {
        self.sounds.iter().map(|s| s.start).collect()
    }
}

impl AudioClock for RecordingOutput {
    fn now(&self) -> f64 {
        self.clock.now()
    }
}

impl SoundOutput for RecordingOutput {
    fn schedule_sound(&mut self, buffer: &SoundBuffer, start_time: f64, duration: f64) -> VoiceId {
        let voice = VoiceId(self.next_voice);
        self.next_voice += 1;
        self.sounds.push(Scheduled {
            voice,
            start: start_time,
            duration,
            frames: buffer.frames,
            emitted_at: self.clock.now(),
        });
        voice
    }

    fn silence(&mut self, voice: VoiceId) {
        self.silenced.push(voice);
    }
}

/// Display that keeps every highlighted index in order.
#[derive(Debug, Default)]
pub struct RecordingDisplay {
    pub highlights: Vec<usize>,
    pub beat_count: Option<usize>,
}

impl BeatDisplay for RecordingDisplay {
    fn highlight_beat(&mut self, index: usize) {
        self.highlights.push(index);
    }

    fn set_beat_count(&mut self, count: usize) {
        self.beat_count = Some(count);
    }
}

/// Bank whose variants can be identified by buffer length.
pub fn test_bank() -> SoundBank {
    let mut bank = SoundBank::new();
    bank.install(
        SoundVariant::Accent,
        SoundBuffer::from_samples(vec![1.0; ACCENT_FRAMES], 1, 1000.0).unwrap(),
    );
    bank.install(
        SoundVariant::Regular,
        SoundBuffer::from_samples(vec![0.5; REGULAR_FRAMES], 1, 1000.0).unwrap(),
    );
    bank
}

/// Frame times `from..=until` at `rate` frames per second.
pub fn frame_times(from: f64, until: f64, rate: f64) -> impl Iterator<Item = f64> {
    let first = (from * rate).ceil() as u64;
    let last = (until * rate).floor() as u64;
    (first..=last).map(move |k| k as f64 / rate)
}
