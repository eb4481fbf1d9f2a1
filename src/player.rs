//! Sample-accurate sound playback.
//!
//! The scheduler asks for "play this buffer at time T for D seconds" and
//! forgets about it. Precise timing is the renderer's job: it owns the
//! clock and starts every voice on the exact frame its start time maps to,
//! however late or early the request arrived.
//!
//! # Architecture
//!
//! - **Scheduler side** owns an [`AudioPlayer`] that implements [`SoundOutput`]
//! - **Audio side** owns a [`Renderer`] that mixes voices block by block
//! - Requests travel over an MPSC channel; time flows back through the
//!   shared frame counter in [`SampleClock`]
//!
//! # Usage
//!
//! ```ignore
//! let (mut player, mut renderer) = create_player(PlayerConfig::default())?;
//!
//! // Scheduler side
//! let voice = player.schedule_sound(&click, player.now() + 0.05, 0.25);
//!
//! // Audio side, once per block
//! renderer.process_block(&mut output);
//! ```

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

use crate::clock::{AudioClock, SampleClock};
use crate::sound::SoundBuffer;

/// Handle to one scheduled sound. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VoiceId(pub u64);

/// Where the scheduler sends its sounds.
///
/// Every call to `schedule_sound` creates a fresh single-use voice, so
/// several voices may overlap when sounds outlast the beat interval.
pub trait SoundOutput: AudioClock {
    /// Start `buffer` at `start_time` (clock seconds) and stop it after
    /// `duration` seconds.
    fn schedule_sound(&mut self, buffer: &SoundBuffer, start_time: f64, duration: f64) -> VoiceId;

    /// Stop `voice` right away. Unknown or finished voices are ignored.
    fn silence(&mut self, voice: VoiceId);
}

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum PlayerError {
    #[error("invalid output sample rate {0}")]
    InvalidSampleRate(f64),
}

/// Audio output configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerConfig {
    /// Output sample rate in Hz.
    pub sample_rate: f64,
    /// Interleaved output channels.
    pub channels: usize,
    /// Maximum number of simultaneous voices.
    pub max_voices: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000.0,
            channels: 2,
            max_voices: 32,
        }
    }
}

/// Requests from the scheduler side to the renderer.
#[derive(Debug)]
enum PlayerCommand {
    Start(Voice),
    Silence(VoiceId),
}

/// One playing (or about to play) sound.
#[derive(Debug)]
struct Voice {
    id: VoiceId,
    data: SoundBuffer,
    /// Absolute output frame at which playback begins.
    start_frame: u64,
    /// Output frames left before the requested stop.
    remaining: u64,
    /// Read position in source frames.
    position: f64,
    /// Source frames consumed per output frame.
    step: f64,
}

impl Voice {
    fn new(
        id: VoiceId,
        data: SoundBuffer,
        start_frame: u64,
        duration_frames: u64,
        output_rate: f64,
    ) -> Self {
        let step = data.sample_rate / output_rate;
        Self {
            id,
            data,
            start_frame,
            remaining: duration_frames,
            position: 0.0,
            step,
        }
    }

    #[inline]
    fn finished(&self) -> bool {
        self.remaining == 0 || self.position >= self.data.frames as f64
    }

    /// Mix this voice into one interleaved block that starts at
    /// `block_start`. Returns true once the voice is done.
    fn render(&mut self, output: &mut [f32], channels: usize, block_start: u64) -> bool {
        let frames = output.len() / channels;
        // Start times already in the past play immediately
        let offset = self.start_frame.saturating_sub(block_start);
        if offset >= frames as u64 {
            return false;
        }

        let samples = self.data.samples();
        let src_channels = self.data.channels;
        let last_frame = self.data.frames - 1;

        for frame in offset as usize..frames {
            if self.finished() {
                break;
            }

            let index = self.position as usize;
            let frac = (self.position - index as f64) as f32;
            let next = (index + 1).min(last_frame);

            for ch in 0..channels {
                let src_ch = ch % src_channels; // mono -> stereo
                let a = samples[index * src_channels + src_ch];
                let b = samples[next * src_channels + src_ch];
                output[frame * channels + ch] += a + (b - a) * frac;
            }

            self.position += self.step;
            self.remaining -= 1;
        }

        self.finished()
    }
}

/// Scheduler-side handle. Cheap to call from the frame loop.
pub struct AudioPlayer {
    command_tx: Sender<PlayerCommand>,
    clock: SampleClock,
    next_voice: u64,
}

impl AudioPlayer {
    pub fn clock(&self) -> &SampleClock {
        &self.clock
    }

    fn send(&self, command: PlayerCommand) {
        if self.command_tx.send(command).is_err() {
            log::debug!("Renderer is gone, dropping player command");
        }
    }
}

impl AudioClock for AudioPlayer {
    #[inline]
    fn now(&self) -> f64 {
        self.clock.now()
    }
}

impl SoundOutput for AudioPlayer {
    fn schedule_sound(&mut self, buffer: &SoundBuffer, start_time: f64, duration: f64) -> VoiceId {
        let id = VoiceId(self.next_voice);
        self.next_voice += 1;

        let voice = Voice::new(
            id,
            buffer.clone(),
            self.clock.seconds_to_frames(start_time),
            self.clock.seconds_to_frames(duration),
            self.clock.sample_rate(),
        );
        self.send(PlayerCommand::Start(voice));
        id
    }

    fn silence(&mut self, voice: VoiceId) {
        self.send(PlayerCommand::Silence(voice));
    }
}

/// Audio-side mixer. Owns the voices and advances the clock.
///
/// This struct runs on the audio thread (or the offline render loop).
/// Apart from receiving new voices it does not allocate.
pub struct Renderer {
    command_rx: Receiver<PlayerCommand>,
    clock: SampleClock,
    channels: usize,
    voices: Vec<Option<Voice>>,
}

impl Renderer {
    /// Render one interleaved block and advance the clock by its length.
    pub fn process_block(&mut self, output: &mut [f32]) {
        self.apply_commands();
        output.fill(0.0);

        let block_start = self.clock.frame_position();
        let channels = self.channels;
        for slot in &mut self.voices {
            let done = slot
                .as_mut()
                .is_some_and(|voice| voice.render(output, channels, block_start));
            if done {
                *slot = None;
            }
        }

        self.clock.advance((output.len() / self.channels) as u64);
    }

    fn apply_commands(&mut self) {
        loop {
            match self.command_rx.try_recv() {
                Ok(PlayerCommand::Start(voice)) => self.start_voice(voice),
                Ok(PlayerCommand::Silence(id)) => self.silence_voice(id),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    fn start_voice(&mut self, voice: Voice) {
        match self.voices.iter_mut().find(|v| v.is_none()) {
            Some(slot) => *slot = Some(voice),
            None => log::warn!("All voices busy, dropping sound {:?}", voice.id),
        }
    }

    fn silence_voice(&mut self, id: VoiceId) {
        for slot in &mut self.voices {
            if slot.as_ref().is_some_and(|v| v.id == id) {
                *slot = None;
            }
        }
    }

    pub fn clock(&self) -> &SampleClock {
        &self.clock
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Voices started or waiting to start.
    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|v| v.is_some()).count()
    }
}

/// Create a linked player/renderer pair sharing one clock.
///
/// The sample rate must be finite and positive; the clock is derived from it.
pub fn create_player(config: PlayerConfig) -> Result<(AudioPlayer, Renderer), PlayerError> {
    if !config.sample_rate.is_finite() || config.sample_rate <= 0.0 {
        return Err(PlayerError::InvalidSampleRate(config.sample_rate));
    }

    let (command_tx, command_rx) = mpsc::channel();
    let clock = SampleClock::new(config.sample_rate);

    let player = AudioPlayer {
        command_tx,
        clock: clock.clone(),
        next_voice: 0,
    };

    let renderer = Renderer {
        command_rx,
        clock,
        channels: config.channels.max(1),
        voices: (0..config.max_voices).map(|_| None).collect(),
    };

    Ok((player, renderer))
}
