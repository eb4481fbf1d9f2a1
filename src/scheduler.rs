// src/scheduler.rs

use crate::display::BeatDisplay;
use crate::player::{SoundOutput, VoiceId};
use crate::sound::{SoundBank, SoundVariant};
use crate::tempo::{BeatCount, Settings, Tempo};

/// How far ahead of the clock each wake-up schedules beats, in seconds.
pub const LOOKAHEAD_SECONDS: f64 = 0.1;

/// Fraction of the beat interval each sound is allowed to ring.
pub const DEFAULT_DURATION_RATIO: f64 = 0.5;

/// What to do with beats that fell behind while the host was stalled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CatchUpPolicy {
    /// Schedule every missed beat on the next wake-up, even if that
    /// produces a rapid burst.
    #[default]
    Burst,
    /// Drop beats more than one lookahead window late and resume on the
    /// original beat grid.
    Resync,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerConfig {
    /// Scheduling horizon in seconds.
    pub lookahead: f64,
    pub catch_up: CatchUpPolicy,
    /// Sound duration as a fraction of the beat interval.
    pub duration_ratio: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            lookahead: LOOKAHEAD_SECONDS,
            catch_up: CatchUpPolicy::default(),
            duration_ratio: DEFAULT_DURATION_RATIO,
        }
    }
}

/// One scheduled sound + highlight. Produced and consumed inside a wake-up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatEvent {
    /// Absolute clock time the sound starts.
    pub start_time: f64,
    /// Seconds the sound plays for.
    pub duration: f64,
    pub beat_index: usize,
}

impl BeatEvent {
    #[inline]
    pub fn variant(&self) -> SoundVariant {
        SoundVariant::for_beat(self.beat_index)
    }
}

/// Mutable state of a running scheduler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerState {
    pub is_playing: bool,
    /// Clock time of the next beat's sound.
    pub next_beat_time: f64,
    /// Earliest clock time at which the next highlight may fire.
    pub next_visual_time: f64,
    /// Beat slot about to play, in `[0, beat_count)`.
    pub current_beat: usize,
}

/// Result of one wake-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// Register another wake-up on the next host frame.
    Reschedule,
    /// Playback was stopped; end the chain.
    Finished,
}

/// Turns tempo and beat count into precisely timed beat events.
///
/// Driven by a coarse, irregular host callback. Each wake-up fills the
/// next `lookahead` seconds with sounds timed from the audio clock, so
/// accuracy depends on the clock and not on when the wake-up ran.
///
/// One instance covers one playback run. Tempo or beat count changes
/// need a new instance.
#[derive(Debug, Clone)]
pub struct LookaheadScheduler {
    state: SchedulerState,
    beat_count: BeatCount,
    tempo: Tempo,
    beat_interval: f64,
    config: SchedulerConfig,

    /// Clock time of beat 0.
    origin: f64,

    /// Beats emitted or skipped since the origin. Beat times are derived
    /// from it so rounding never accumulates.
    beat_ordinal: u64,

    /// Most recent voice handed to the output.
    last_voice: Option<VoiceId>,

    /// Voices whose start time had not been reached at the last wake-up.
    pending: Vec<(VoiceId, f64)>,
}

impl LookaheadScheduler {
    /// Begin a run with `now` as the origin of both beat and visual time.
    pub fn start(settings: Settings, config: SchedulerConfig, now: f64) -> Self {
        log::debug!(
            "Scheduler start: {} beats at {} (origin {:.3}s)",
            settings.beat_count.get(),
            settings.tempo,
            now
        );

        Self {
            state: SchedulerState {
                is_playing: true,
                next_beat_time: now,
                next_visual_time: now,
                current_beat: 0,
            },
            beat_count: settings.beat_count,
            tempo: settings.tempo,
            beat_interval: settings.tempo.beat_interval(),
            config,
            origin: now,
            beat_ordinal: 0,
            last_voice: None,
            pending: Vec::new(),
        }
    }

    /// Run one wake-up.
    ///
    /// Schedules every beat that starts before `now + lookahead`. The
    /// cancellation flag is checked before any work, so a wake-up that was
    /// already registered when playback stopped does nothing.
    pub fn wake<O, D>(&mut self, output: &mut O, sounds: &SoundBank, display: &mut D) -> Wake
    where
        O: SoundOutput + ?Sized,
        D: BeatDisplay + ?Sized,
    {
        if !self.state.is_playing {
            return Wake::Finished;
        }

        let now = output.now();
        self.pending.retain(|&(_, start)| start > now);

        if self.config.catch_up == CatchUpPolicy::Resync {
            let skipped = self.resync(now);
            if skipped > 0 {
                log::warn!("Host stalled, skipped {} beats", skipped);
            }
        }

        let mut stale = 0usize;
        while self.state.next_beat_time < output.now() + self.config.lookahead {
            let now = output.now();
            let event = self.next_event();
            if event.start_time < now - self.config.lookahead {
                stale += 1;
            }

            match sounds.get(event.variant()) {
                Some(buffer) => {
                    let voice = output.schedule_sound(buffer, event.start_time, event.duration);
                    self.last_voice = Some(voice);
                    self.pending.push((voice, event.start_time));
                }
                None => log::debug!(
                    "No {} sound loaded, beat {} is silent",
                    event.variant().name(),
                    event.beat_index
                ),
            }
            log::trace!(
                "Beat {} at {:.4}s (now {:.4}s)",
                event.beat_index,
                event.start_time,
                now
            );

            // Only highlight once the clock has reached the previous beat
            if self.state.next_visual_time <= now {
                display.highlight_beat(event.beat_index);
                self.state.next_visual_time = event.start_time;
            }

            self.advance(1);
        }

        if stale > 0 {
            log::warn!("Host stalled, caught up {} late beats", stale);
        }

        Wake::Reschedule
    }

    /// The event for the beat about to play.
    #[inline]
    fn next_event(&self) -> BeatEvent {
        BeatEvent {
            start_time: self.state.next_beat_time,
            duration: self.beat_interval * self.config.duration_ratio,
            beat_index: self.state.current_beat,
        }
    }

    /// Move `beats` slots forward on the grid.
    fn advance(&mut self, beats: u64) {
        let count = self.beat_count.get() as u64;
        self.beat_ordinal += beats;
        self.state.next_beat_time = self.origin + self.beat_ordinal as f64 * self.beat_interval;
        self.state.current_beat = ((self.state.current_beat as u64 + beats % count) % count) as usize;
    }

    /// Skip beats that are more than one lookahead window late.
    /// Returns the number of beats skipped.
    fn resync(&mut self, now: f64) -> u64 {
        let late = (now - self.config.lookahead) - self.state.next_beat_time;
        if late <= 0.0 {
            return 0;
        }
        let skipped = (late / self.beat_interval).ceil() as u64;
        self.advance(skipped);
        skipped
    }

    /// Clear the playing flag. Idempotent.
    ///
    /// Returns the voices to cut off: the most recent one, which may be
    /// ringing mid-beat, plus any that have not started by `now`. A second
    /// call returns nothing.
    pub fn stop(&mut self, now: f64) -> Vec<VoiceId> {
        if !self.state.is_playing {
            return Vec::new();
        }
        log::debug!("Scheduler stop after {} beats", self.beat_ordinal);
        self.state.is_playing = false;

        let mut voices: Vec<VoiceId> = self
            .pending
            .drain(..)
            .filter(|&(_, start)| start > now)
            .map(|(voice, _)| voice)
            .collect();
        if let Some(last) = self.last_voice.filter(|last| !voices.contains(last)) {
            voices.push(last);
        }
        voices
    }

    // -------------------------------
    // MARK: Accessors
    // -------------------------------

    #[inline]
    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.state.is_playing
    }

    #[inline]
    pub fn beat_interval(&self) -> f64 {
        self.beat_interval
    }

    #[inline]
    pub fn beat_count(&self) -> BeatCount {
        self.beat_count
    }

    #[inline]
    pub fn tempo(&self) -> Tempo {
        self.tempo
    }

    /// Beats emitted or skipped so far.
    #[inline]
    pub fn beats_scheduled(&self) -> u64 {
        self.beat_ordinal
    }

    #[inline]
    pub fn last_voice(&self) -> Option<VoiceId> {
        self.last_voice
    }
}
