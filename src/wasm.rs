//! WebAssembly bindings via wasm-bindgen for browser integration.
//!
//! This module is only compiled when the `web` feature is enabled.
//!
//! The browser keeps the real audio clock and the decoded buffers. Rust
//! runs the scheduler: JavaScript passes `AudioContext.currentTime` on
//! every animation frame and plays whatever the scheduler queued.
//!
//! # Usage
//!
//! Build with wasm-pack:
//! ```bash
//! wasm-pack build --target web --no-default-features --features web
//! ```
//!
//! # JavaScript Example
//!
//! ```javascript
//! import init, { metronome_init, WebMetronome } from './metronome.js';
//!
//! await init();
//! metronome_init();
//!
//! const ctx = new AudioContext();
//! const met = new WebMetronome();
//! const buffers = [accentBuffer, regularBuffer];
//! const sources = new Map();
//! met.load_sound("regular", regularBuffer.getChannelData(0), 1, regularBuffer.sampleRate);
//!
//! met.start(4, 60, ctx.currentTime);
//! function frame() {
//!   const more = met.frame(ctx.currentTime);
//!   const q = met.drain_sounds(); // [voice, start, duration, variant, ...]
//!   for (let i = 0; i < q.length; i += 4) {
//!     const src = ctx.createBufferSource();
//!     src.buffer = buffers[q[i + 3]];
//!     src.connect(ctx.destination);
//!     src.start(q[i + 1], 0, q[i + 2]);
//!     sources.set(q[i], src);
//!   }
//!   for (const voice of met.drain_silenced()) {
//!     sources.get(voice)?.stop();
//!     sources.delete(voice);
//!   }
//!   const beat = met.take_highlight();
//!   if (beat >= 0) highlight(beat);
//!   if (more) requestAnimationFrame(frame);
//! }
//! requestAnimationFrame(frame);
//! ```

use wasm_bindgen::prelude::*;

use crate::clock::{AudioClock, ManualClock};
use crate::display::BeatDisplay;
use crate::metronome::Metronome;
use crate::player::{SoundOutput, VoiceId};
use crate::scheduler::{CatchUpPolicy, SchedulerConfig};
use crate::sound::{SoundBank, SoundBuffer, SoundVariant};
use crate::tempo::Settings;

// ═══════════════════════════════════════════════════════════════════════════
// Initialization
// ═══════════════════════════════════════════════════════════════════════════

/// Initialize the wasm module. Call this once before using any other functions.
/// Sets up panic hooks and console logging.
#[wasm_bindgen]
pub fn metronome_init() {
    console_error_panic_hook::set_once();
    console_log::init_with_level(log::Level::Debug).ok();
}

// ═══════════════════════════════════════════════════════════════════════════
// Output queues
// ═══════════════════════════════════════════════════════════════════════════

/// Variant codes handed to JavaScript.
const VARIANT_ACCENT: f64 = 0.0;
const VARIANT_REGULAR: f64 = 1.0;

/// Sound output that queues requests for JavaScript to play.
#[derive(Default)]
struct QueuedOutput {
    clock: ManualClock,
    accent: Option<SoundBuffer>,
    regular: Option<SoundBuffer>,
    /// Flat `[voice, start, duration, variant]` records.
    scheduled: Vec<f64>,
    silenced: Vec<f64>,
    next_voice: u64,
}

impl QueuedOutput {
    fn register(&mut self, variant: SoundVariant, buffer: SoundBuffer) {
        match variant {
            SoundVariant::Accent => self.accent = Some(buffer),
            SoundVariant::Regular => self.regular = Some(buffer),
        }
    }

    /// Which JS buffer a scheduled Rust buffer stands for.
    fn variant_code(&self, buffer: &SoundBuffer) -> f64 {
        match &self.accent {
            Some(accent) if accent.same_samples(buffer) => VARIANT_ACCENT,
            _ => VARIANT_REGULAR,
        }
    }
}

impl AudioClock for QueuedOutput {
    fn now(&self) -> f64 {
        self.clock.now()
    }
}

impl SoundOutput for QueuedOutput {
    fn schedule_sound(&mut self, buffer: &SoundBuffer, start_time: f64, duration: f64) -> VoiceId {
        let voice = VoiceId(self.next_voice);
        self.next_voice += 1;

        let variant = self.variant_code(buffer);
        self.scheduled
            .extend_from_slice(&[voice.0 as f64, start_time, duration, variant]);
        voice
    }

    fn silence(&mut self, voice: VoiceId) {
        self.silenced.push(voice.0 as f64);
    }
}

/// Keeps the latest highlight until JavaScript picks it up.
#[derive(Default)]
struct HighlightQueue {
    latest: Option<usize>,
}

impl BeatDisplay for HighlightQueue {
    fn highlight_beat(&mut self, index: usize) {
        self.latest = Some(index);
    }

    fn set_beat_count(&mut self, _count: usize) {
        self.latest = None;
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Metronome (browser handle)
// ═══════════════════════════════════════════════════════════════════════════

/// Browser-side metronome handle.
#[wasm_bindgen]
pub struct WebMetronome {
    inner: Metronome<QueuedOutput, HighlightQueue>,
}

#[wasm_bindgen]
impl WebMetronome {
    /// Create a metronome that bursts through missed beats after a stall.
    #[wasm_bindgen(constructor)]
    pub fn new() -> WebMetronome {
        Self::new_with_resync(false)
    }

    /// Create a metronome; with `resync` set, beats missed while the tab
    /// was in the background are skipped instead.
    pub fn new_with_resync(resync: bool) -> WebMetronome {
        let config = SchedulerConfig {
            catch_up: if resync {
                CatchUpPolicy::Resync
            } else {
                CatchUpPolicy::Burst
            },
            ..Default::default()
        };

        WebMetronome {
            inner: Metronome::new(
                QueuedOutput::default(),
                HighlightQueue::default(),
                SoundBank::new(),
                config,
            ),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sounds
    // ─────────────────────────────────────────────────────────────────────────

    /// Register a decoded buffer under "accent" or "regular".
    pub fn load_sound(
        &mut self,
        name: &str,
        samples: Vec<f32>,
        channels: u32,
        sample_rate: f64,
    ) -> Result<(), JsError> {
        let variant = SoundVariant::from_name(name)
            .ok_or_else(|| JsError::new(&format!("unknown sound name {name:?}")))?;
        let buffer = SoundBuffer::from_samples(samples, channels as usize, sample_rate)?;

        self.inner.output_mut().register(variant, buffer.clone());
        self.inner.install_sound(variant, buffer);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transport
    // ─────────────────────────────────────────────────────────────────────────

    /// Start playback at audio time `now`. Restarts if already playing.
    ///
    /// `bpm` is clamped to the supported range; zero beats is an error.
    pub fn start(&mut self, beats: u32, bpm: f64, now: f64) -> Result<(), JsError> {
        let settings = Settings::clamped(beats, bpm)?;
        self.inner.output().clock.set(now);
        self.inner.start(settings);
        Ok(())
    }

    /// Stop playback. Safe to call when already stopped.
    pub fn stop(&mut self) {
        self.inner.stop();
    }

    /// Start/stop button. Returns the new playing state.
    pub fn toggle(&mut self, beats: u32, bpm: f64, now: f64) -> Result<bool, JsError> {
        if self.inner.is_playing() {
            self.inner.output().clock.set(now);
            self.inner.stop();
            Ok(false)
        } else {
            self.start(beats, bpm, now)?;
            Ok(true)
        }
    }

    /// Animation-frame callback. Returns true if another frame is needed.
    pub fn frame(&mut self, now: f64) -> bool {
        self.inner.output().clock.set(now);
        self.inner.on_frame()
    }

    pub fn is_playing(&self) -> bool {
        self.inner.is_playing()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Readback
    // ─────────────────────────────────────────────────────────────────────────

    /// Sounds queued since the last call, as `[voice, start, duration, variant]`
    /// quadruples. Variant 0 is the accent buffer, 1 the regular one.
    pub fn drain_sounds(&mut self) -> Vec<f64> {
        std::mem::take(&mut self.inner.output_mut().scheduled)
    }

    /// Voices to cut off immediately.
    pub fn drain_silenced(&mut self) -> Vec<f64> {
        std::mem::take(&mut self.inner.output_mut().silenced)
    }

    /// Beat to highlight, or -1 if nothing changed since the last call.
    pub fn take_highlight(&mut self) -> i32 {
        self.inner
            .display_mut()
            .latest
            .take()
            .map_or(-1, |index| index as i32)
    }
}

impl Default for WebMetronome {
    fn default() -> Self {
        Self::new()
    }
}
