// src/lib.rs
//
// Library entry point for the command line player and browser (wasm) consumers.

mod clock;
mod display;
mod host;
mod metronome;
mod player;
mod scheduler;
mod sound;
mod tempo;

#[cfg(test)]
mod testing;

#[cfg(feature = "web")]
pub mod wasm;

// Re-export key types for Rust consumers
pub use clock::{AudioClock, ManualClock, SampleClock};
pub use display::{BeatDisplay, BeatIndicator};
pub use host::{HostConfig, OfflineHost, Rendered};
#[cfg(feature = "realtime")]
pub use host::{HostError, OutputDevice, RealtimeHost};
pub use metronome::Metronome;
pub use player::{
    AudioPlayer, PlayerConfig, PlayerError, Renderer, SoundOutput, VoiceId, create_player,
};
pub use scheduler::{
    BeatEvent, CatchUpPolicy, DEFAULT_DURATION_RATIO, LOOKAHEAD_SECONDS, LookaheadScheduler,
    SchedulerConfig, SchedulerState, Wake,
};
pub use sound::{SoundBank, SoundBuffer, SoundError, SoundVariant};
#[cfg(feature = "cli")]
pub use sound::{LoadedSound, SoundLoader};
pub use tempo::{BeatCount, MAX_BPM, MIN_BPM, SECONDS_PER_MINUTE, Settings, SettingsError, Tempo};
