// src/tempo.rs
//
// Validated tempo and beat-count inputs.
//
// The scheduler never sees raw numbers from the UI. Everything that
// reaches it has been through one of the constructors below.

use std::fmt;
use std::num::NonZeroU32;

/// Seconds per minute, used to turn BPM into a beat interval.
pub const SECONDS_PER_MINUTE: f64 = 60.0;

/// Lowest tempo accepted by [`Tempo::clamped`].
pub const MIN_BPM: f64 = 1.0;

/// Highest tempo accepted by [`Tempo::clamped`].
pub const MAX_BPM: f64 = 400.0;

/// Rejected metronome input.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum SettingsError {
    #[error("beat count must be at least 1")]
    ZeroBeatCount,

    #[error("tempo must be a positive, finite BPM value (got {0})")]
    InvalidTempo(f64),
}

/// Tempo in beats per minute. Always positive and finite.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Tempo(f64);

impl Tempo {
    pub fn new(bpm: f64) -> Result<Self, SettingsError> {
        if bpm.is_finite() && bpm > 0.0 {
            Ok(Self(bpm))
        } else {
            Err(SettingsError::InvalidTempo(bpm))
        }
    }

    /// Clamp UI input into `[MIN_BPM, MAX_BPM]`.
    ///
    /// NaN falls back to the lower bound.
    pub fn clamped(bpm: f64) -> Self {
        if bpm.is_nan() {
            return Self(MIN_BPM);
        }
        Self(bpm.clamp(MIN_BPM, MAX_BPM))
    }

    #[inline]
    pub fn bpm(self) -> f64 {
        self.0
    }

    /// Seconds between consecutive beat onsets.
    #[inline]
    pub fn beat_interval(self) -> f64 {
        SECONDS_PER_MINUTE / self.0
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self(60.0)
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} BPM", self.0)
    }
}

/// Number of beat slots in one cycle. Always at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BeatCount(NonZeroU32);

impl BeatCount {
    pub fn new(count: u32) -> Result<Self, SettingsError> {
        NonZeroU32::new(count)
            .map(Self)
            .ok_or(SettingsError::ZeroBeatCount)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0.get() as usize
    }
}

impl Default for BeatCount {
    fn default() -> Self {
        Self(NonZeroU32::new(4).unwrap_or(NonZeroU32::MIN))
    }
}

/// Everything needed to start playback.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Settings {
    pub beat_count: BeatCount,
    pub tempo: Tempo,
}

impl Settings {
    pub fn new(beat_count: u32, bpm: f64) -> Result<Self, SettingsError> {
        Ok(Self {
            beat_count: BeatCount::new(beat_count)?,
            tempo: Tempo::new(bpm)?,
        })
    }

    /// Settings from user input. The tempo is clamped to the supported
    /// range instead of rejected; the beat count is still validated.
    pub fn clamped(beat_count: u32, bpm: f64) -> Result<Self, SettingsError> {
        Ok(Self {
            beat_count: BeatCount::new(beat_count)?,
            tempo: Tempo::clamped(bpm),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beat_interval() {
        assert_eq!(Tempo::new(60.0).unwrap().beat_interval(), 1.0);
        assert_eq!(Tempo::new(120.0).unwrap().beat_interval(), 0.5);
        assert_eq!(Tempo::new(240.0).unwrap().beat_interval(), 0.25);
    }

    #[test]
    fn test_invalid_tempo_rejected() {
        assert_eq!(Tempo::new(0.0), Err(SettingsError::InvalidTempo(0.0)));
        assert_eq!(Tempo::new(-10.0), Err(SettingsError::InvalidTempo(-10.0)));
        assert!(Tempo::new(f64::NAN).is_err());
        assert!(Tempo::new(f64::INFINITY).is_err());
    }

    #[test]
    fn test_clamped_tempo() {
        assert_eq!(Tempo::clamped(0.0).bpm(), MIN_BPM);
        assert_eq!(Tempo::clamped(1000.0).bpm(), MAX_BPM);
        assert_eq!(Tempo::clamped(f64::NAN).bpm(), MIN_BPM);
        assert_eq!(Tempo::clamped(90.0).bpm(), 90.0);
    }

    #[test]
    fn test_beat_count() {
        assert_eq!(BeatCount::new(0), Err(SettingsError::ZeroBeatCount));
        assert_eq!(BeatCount::new(7).unwrap().get(), 7);
        assert_eq!(BeatCount::default().get(), 4);
    }

    #[test]
    fn test_settings() {
        let settings = Settings::default();
        assert_eq!(settings.beat_count.get(), 4);
        assert_eq!(settings.tempo.bpm(), 60.0);

        assert!(Settings::new(3, 90.0).is_ok());
        assert_eq!(Settings::new(0, 90.0), Err(SettingsError::ZeroBeatCount));
    }

    #[test]
    fn test_settings_from_user_input() {
        assert_eq!(Settings::clamped(4, 2000.0).unwrap().tempo.bpm(), MAX_BPM);
        assert_eq!(Settings::clamped(4, 0.0).unwrap().tempo.bpm(), MIN_BPM);
        assert_eq!(Settings::clamped(4, 90.0).unwrap().tempo.bpm(), 90.0);
        assert_eq!(Settings::clamped(0, 90.0), Err(SettingsError::ZeroBeatCount));
        // Every accepted tempo spaces beats further apart than the lookahead
        assert!(Settings::clamped(4, f64::MAX).unwrap().tempo.beat_interval() > 0.1);
    }
}
