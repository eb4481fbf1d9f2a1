// src/sound.rs
//
// Decoded sound buffers and the bank the scheduler picks them from.
//
// Buffers are immutable once built and shared by reference count, so the
// scheduler and the renderer can hold the same samples without copying.
// Loading happens off the scheduling path; the bank simply reports a
// variant as missing until its buffer arrives.

use std::sync::Arc;

#[cfg(feature = "cli")]
use std::path::{Path, PathBuf};
#[cfg(feature = "cli")]
use std::sync::mpsc::{self, Receiver, Sender};

/// Errors while building or decoding a sound buffer.
#[derive(Debug, thiserror::Error)]
pub enum SoundError {
    #[error("sound buffer contains no samples")]
    Empty,

    #[error("invalid channel layout: {channels} channel(s) for {samples} samples")]
    InvalidChannels { channels: usize, samples: usize },

    #[error("invalid sample rate {0}")]
    InvalidSampleRate(f64),

    #[cfg(feature = "cli")]
    #[error("failed to decode WAV: {0}")]
    Wav(#[from] hound::Error),
}

/// Which sound a beat uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoundVariant {
    /// First beat of the cycle.
    Accent,
    /// Every other beat.
    Regular,
}

impl SoundVariant {
    #[inline]
    pub fn for_beat(beat_index: usize) -> Self {
        if beat_index == 0 {
            SoundVariant::Accent
        } else {
            SoundVariant::Regular
        }
    }

    /// Logical asset name ("accent" / "regular").
    pub fn name(self) -> &'static str {
        match self {
            SoundVariant::Accent => "accent",
            SoundVariant::Regular => "regular",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "accent" => Some(SoundVariant::Accent),
            "regular" => Some(SoundVariant::Regular),
            _ => None,
        }
    }
}

/// Pre-decoded audio, interleaved if it has more than one channel.
#[derive(Debug, Clone)]
pub struct SoundBuffer {
    pub sample_rate: f64,
    pub channels: usize,
    pub frames: usize,
    samples: Arc<[f32]>,
}

impl SoundBuffer {
    pub fn from_samples(
        samples: Vec<f32>,
        channels: usize,
        sample_rate: f64,
    ) -> Result<Self, SoundError> {
        if samples.is_empty() {
            return Err(SoundError::Empty);
        }
        if channels == 0 || samples.len() % channels != 0 {
            return Err(SoundError::InvalidChannels {
                channels,
                samples: samples.len(),
            });
        }
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(SoundError::InvalidSampleRate(sample_rate));
        }

        Ok(Self {
            sample_rate,
            channels,
            frames: samples.len() / channels,
            samples: samples.into(),
        })
    }

    /// Synthesise a mono click: a sine burst with exponential decay.
    pub fn click(freq: f32, seconds: f32, gain: f32, sample_rate: f64) -> Self {
        let num_frames = ((sample_rate as f32 * seconds) as usize).max(1);
        let samples: Vec<f32> = (0..num_frames)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                let envelope = (-t * 40.0).exp();
                (t * freq * std::f32::consts::TAU).sin() * envelope * gain
            })
            .collect();

        Self {
            sample_rate,
            channels: 1,
            frames: num_frames,
            samples: samples.into(),
        }
    }

    /// Default downbeat click.
    pub fn default_accent(sample_rate: f64) -> Self {
        Self::click(1000.0, 0.05, 0.8, sample_rate)
    }

    /// Default click for the remaining beats.
    pub fn default_regular(sample_rate: f64) -> Self {
        Self::click(800.0, 0.04, 0.5, sample_rate)
    }

    /// Decode a WAV file into floating point samples.
    #[cfg(feature = "cli")]
    pub fn from_wav(path: impl AsRef<Path>) -> Result<Self, SoundError> {
        let reader = hound::WavReader::open(path)?;
        let spec = reader.spec();

        let samples = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<Vec<_>, _>>()?,
            hound::SampleFormat::Int => {
                let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|s| s as f32 / scale))
                    .collect::<Result<Vec<_>, _>>()?
            }
        };

        Self::from_samples(samples, spec.channels as usize, spec.sample_rate as f64)
    }

    #[inline]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Length of the buffer in seconds.
    #[inline]
    pub fn duration(&self) -> f64 {
        self.frames as f64 / self.sample_rate
    }

    /// Whether both handles share the same sample storage.
    pub fn same_samples(&self, other: &SoundBuffer) -> bool {
        Arc::ptr_eq(&self.samples, &other.samples)
    }
}

/// Sound buffers by variant.
///
/// Starts empty. An accent that was never loaded falls back to the regular
/// sound, so a single tone is enough to play every beat.
#[derive(Debug, Clone, Default)]
pub struct SoundBank {
    accent: Option<SoundBuffer>,
    regular: Option<SoundBuffer>,
}

impl SoundBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bank with the synthesised default clicks already loaded.
    pub fn with_default_clicks(sample_rate: f64) -> Self {
        Self {
            accent: Some(SoundBuffer::default_accent(sample_rate)),
            regular: Some(SoundBuffer::default_regular(sample_rate)),
        }
    }

    pub fn install(&mut self, variant: SoundVariant, buffer: SoundBuffer) {
        log::debug!(
            "Installed {} sound ({} frames @ {} Hz)",
            variant.name(),
            buffer.frames,
            buffer.sample_rate
        );
        match variant {
            SoundVariant::Accent => self.accent = Some(buffer),
            SoundVariant::Regular => self.regular = Some(buffer),
        }
    }

    /// The buffer to play for `variant`, if one has arrived.
    pub fn get(&self, variant: SoundVariant) -> Option<&SoundBuffer> {
        match variant {
            SoundVariant::Accent => self.accent.as_ref().or(self.regular.as_ref()),
            SoundVariant::Regular => self.regular.as_ref(),
        }
    }

    pub fn is_loaded(&self, variant: SoundVariant) -> bool {
        self.get(variant).is_some()
    }
}

/// Result of one background load.
#[cfg(feature = "cli")]
pub type LoadedSound = (SoundVariant, Result<SoundBuffer, SoundError>);

/// Loads WAV files on background threads.
///
/// Finished loads are collected with [`SoundLoader::poll`], which never
/// blocks, so playback can start before any buffer is ready.
#[cfg(feature = "cli")]
pub struct SoundLoader {
    tx: Sender<LoadedSound>,
    rx: Receiver<LoadedSound>,
    pending: usize,
}

#[cfg(feature = "cli")]
impl SoundLoader {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { tx, rx, pending: 0 }
    }

    pub fn load(&mut self, variant: SoundVariant, path: PathBuf) {
        let tx = self.tx.clone();
        self.pending += 1;
        std::thread::spawn(move || {
            let result = SoundBuffer::from_wav(&path);
            // Receiver gone means nobody wants the sound any more
            let _ = tx.send((variant, result));
        });
    }

    /// Drain every load that has finished since the last call.
    pub fn poll(&mut self) -> Vec<LoadedSound> {
        let done: Vec<LoadedSound> = self.rx.try_iter().collect();
        self.pending -= done.len().min(self.pending);
        done
    }

    /// Number of loads still in flight.
    pub fn pending(&self) -> usize {
        self.pending
    }
}

#[cfg(feature = "cli")]
impl Default for SoundLoader {
    fn default() -> Self {
        Self::new()
    }
}
