// src/host.rs
//
// Frame drivers standing in for a browser's animation-frame loop.
//
// Both hosts call `Metronome::on_frame` at a fixed frame rate and feed the
// renderer; they differ only in how time passes. The offline host
// interleaves frames and audio blocks deterministically. The realtime one
// hands the renderer to the sound card's output callback and paces the
// frames by the wall clock.

#[cfg(feature = "realtime")]
use std::time::{Duration, Instant};

#[cfg(feature = "realtime")]
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::clock::AudioClock;
use crate::display::BeatDisplay;
use crate::metronome::Metronome;
#[cfg(feature = "realtime")]
use crate::player::PlayerConfig;
use crate::player::{AudioPlayer, Renderer};
use crate::tempo::Settings;

#[cfg(feature = "realtime")]
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("no audio output device available")]
    NoDevice,

    #[error("output device uses {0:?} samples, only f32 is supported")]
    UnsupportedFormat(cpal::SampleFormat),

    #[error(transparent)]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error(transparent)]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error(transparent)]
    PlayStream(#[from] cpal::PlayStreamError),
}

/// Frame loop configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostConfig {
    /// Host frame callbacks per second.
    pub frame_rate: f64,
    /// Clock time at which playback is stopped.
    pub seconds: f64,
    /// Audio rendered after the stop so the cut-off is captured.
    pub tail: f64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            frame_rate: 60.0,
            seconds: 8.0,
            tail: 0.25,
        }
    }
}

/// Audio produced by a host run.
#[derive(Debug, Clone, Default)]
pub struct Rendered {
    /// Interleaved samples.
    pub samples: Vec<f32>,
    pub channels: usize,
    pub sample_rate: f64,
    /// Host frames delivered.
    pub host_frames: u64,
}

impl Rendered {
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1)
    }
}

/// Deterministic driver: one host frame, then one frame's worth of audio.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineHost {
    config: HostConfig,
}

impl OfflineHost {
    pub fn new(config: HostConfig) -> Self {
        Self { config }
    }

    /// Play `settings` for `config.seconds` of audio clock time.
    ///
    /// `each_frame` runs after every host frame, e.g. to install sounds
    /// that finished loading or to redraw the indicator.
    pub fn run<D, F>(
        &self,
        metronome: &mut Metronome<AudioPlayer, D>,
        renderer: &mut Renderer,
        settings: Settings,
        mut each_frame: F,
    ) -> Rendered
    where
        D: BeatDisplay,
        F: FnMut(&mut Metronome<AudioPlayer, D>),
    {
        let clock = renderer.clock().clone();
        let channels = renderer.channels();
        let frames_per_callback = frames_per_callback(clock.sample_rate(), self.config.frame_rate);
        let mut block = vec![0.0f32; frames_per_callback * channels];

        let mut rendered = Rendered {
            samples: Vec::new(),
            channels,
            sample_rate: clock.sample_rate(),
            host_frames: 0,
        };

        metronome.start(settings);
        each_frame(metronome);

        let mut step = |metronome: &mut Metronome<AudioPlayer, D>, rendered: &mut Rendered| {
            renderer.process_block(&mut block);
            rendered.samples.extend_from_slice(&block);
            metronome.on_frame();
            rendered.host_frames += 1;
            each_frame(metronome);
        };

        while clock.now() < self.config.seconds {
            step(metronome, &mut rendered);
        }

        metronome.stop();
        let end = clock.now() + self.config.tail;
        while clock.now() < end || metronome.frame_requested() {
            step(metronome, &mut rendered);
        }

        log::debug!(
            "Offline run finished: {} host frames, {} audio frames",
            rendered.host_frames,
            rendered.frames()
        );
        rendered
    }
}

/// The default output device and its stream format.
///
/// Opened before the player so the renderer runs at the device's rate and
/// channel count.
#[cfg(feature = "realtime")]
pub struct OutputDevice {
    device: cpal::Device,
    config: cpal::StreamConfig,
}

#[cfg(feature = "realtime")]
impl OutputDevice {
    pub fn open_default() -> Result<Self, HostError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(HostError::NoDevice)?;

        let supported = device.default_output_config()?;
        if supported.sample_format() != cpal::SampleFormat::F32 {
            return Err(HostError::UnsupportedFormat(supported.sample_format()));
        }
        let config = supported.config();

        log::info!(
            "Audio output: {} ({} channels, {} Hz)",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            config.channels,
            config.sample_rate.0
        );
        Ok(Self { device, config })
    }

    /// Player settings matching this device.
    pub fn player_config(&self) -> PlayerConfig {
        PlayerConfig {
            sample_rate: self.config.sample_rate.0 as f64,
            channels: self.config.channels as usize,
            ..Default::default()
        }
    }
}

/// Driver that plays through a sound card, paced by the wall clock.
#[cfg(feature = "realtime")]
#[derive(Debug, Clone, Copy, Default)]
pub struct RealtimeHost {
    config: HostConfig,
}

#[cfg(feature = "realtime")]
impl RealtimeHost {
    pub fn new(config: HostConfig) -> Self {
        Self { config }
    }

    /// Same contract as [`OfflineHost::run`], but the renderer runs inside
    /// the output stream's callback and nothing is recorded.
    ///
    /// The renderer must come from [`OutputDevice::player_config`].
    /// Returns the number of host frames delivered.
    pub fn run<D, F>(
        &self,
        metronome: &mut Metronome<AudioPlayer, D>,
        mut renderer: Renderer,
        device: &OutputDevice,
        settings: Settings,
        mut each_frame: F,
    ) -> Result<u64, HostError>
    where
        D: BeatDisplay,
        F: FnMut(&mut Metronome<AudioPlayer, D>),
    {
        let clock = renderer.clock().clone();

        let stream = device.device.build_output_stream(
            &device.config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                renderer.process_block(data);
            },
            |err| log::error!("Audio stream error: {}", err),
            None,
        )?;
        stream.play()?;

        let frame_period = Duration::from_secs_f64(1.0 / self.config.frame_rate.max(1.0));
        let mut host_frames = 0u64;

        metronome.start(settings);
        each_frame(metronome);

        let mut next_frame = Instant::now();
        // The audio clock only moves while the device pulls samples
        let give_up =
            next_frame + Duration::from_secs_f64(self.config.seconds.max(0.0) * 2.0 + 1.0);
        while clock.now() < self.config.seconds {
            if next_frame > give_up {
                log::warn!("Audio clock stalled at {:.3}s, stopping", clock.now());
                break;
            }
            next_frame += frame_period;
            sleep_until(next_frame);
            metronome.on_frame();
            host_frames += 1;
            each_frame(metronome);
        }

        metronome.stop();
        while metronome.on_frame() {}

        // Let the cut-off reach the speakers before the stream is dropped
        sleep_until(Instant::now() + Duration::from_secs_f64(self.config.tail.max(0.0)));
        drop(stream);

        log::debug!("Realtime run finished: {} host frames", host_frames);
        Ok(host_frames)
    }
}

#[cfg(feature = "realtime")]
fn sleep_until(deadline: Instant) {
    let now = Instant::now();
    if deadline > now {
        std::thread::sleep(deadline - now);
    }
}

/// Audio frames between two host callbacks.
fn frames_per_callback(sample_rate: f64, frame_rate: f64) -> usize {
    ((sample_rate / frame_rate.max(1.0)).round() as usize).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::BeatIndicator;
    use crate::player::{PlayerConfig, create_player};
    use crate::scheduler::SchedulerConfig;
    use crate::sound::{SoundBank, SoundBuffer, SoundVariant};

    fn setup(sample_rate: f64) -> (Metronome<AudioPlayer, BeatIndicator>, Renderer) {
        let (player, renderer) = create_player(PlayerConfig {
            sample_rate,
            channels: 1,
            max_voices: 8,
        })
        .unwrap();
        let mut sounds = SoundBank::new();
        sounds.install(
            SoundVariant::Regular,
            SoundBuffer::from_samples(vec![1.0; 100], 1, sample_rate).unwrap(),
        );
        let metronome = Metronome::new(
            player,
            BeatIndicator::default(),
            sounds,
            SchedulerConfig::default(),
        );
        (metronome, renderer)
    }

    fn onsets(samples: &[f32]) -> Vec<usize> {
        (0..samples.len())
            .filter(|&i| samples[i] != 0.0 && (i == 0 || samples[i - 1] == 0.0))
            .collect()
    }

    #[test]
    fn test_frames_per_callback() {
        assert_eq!(frames_per_callback(48_000.0, 60.0), 800);
        assert_eq!(frames_per_callback(44_100.0, 60.0), 735);
        assert_eq!(frames_per_callback(10.0, 60.0), 1);
    }

    #[test]
    fn test_offline_run_places_beats_on_grid() {
        let (mut metronome, mut renderer) = setup(6000.0);
        let host = OfflineHost::new(HostConfig {
            frame_rate: 60.0,
            seconds: 3.0,
            tail: 0.25,
        });

        let mut frames_seen = 0;
        let rendered = host.run(
            &mut metronome,
            &mut renderer,
            Settings::new(4, 120.0).unwrap(),
            |_| frames_seen += 1,
        );

        // 120 BPM at 6 kHz: one beat every 3000 frames, 0.0s ..= 2.5s
        assert_eq!(onsets(&rendered.samples), vec![0, 3000, 6000, 9000, 12000, 15000]);
        assert!(rendered.frames() >= 3 * 6000);
        assert_eq!(frames_seen as u64, rendered.host_frames + 1);
        assert!(!metronome.is_playing());
        assert!(metronome.scheduler().is_none());
    }

    #[test]
    fn test_offline_run_highlights_every_beat() {
        let (mut metronome, mut renderer) = setup(6000.0);
        let host = OfflineHost::new(HostConfig {
            seconds: 2.0,
            ..Default::default()
        });

        let mut highlighted = Vec::new();
        host.run(
            &mut metronome,
            &mut renderer,
            Settings::new(3, 60.0).unwrap(),
            |m| {
                let active = m.display().active();
                if highlighted.last() != Some(&active) {
                    highlighted.push(active);
                }
            },
        );

        assert_eq!(highlighted, vec![Some(0), Some(1), Some(2)]);
    }

    #[test]
    fn test_irregular_device_callbacks_keep_beats_on_grid() {
        // Sound cards pull buffers of whatever size they like
        let (mut metronome, mut renderer) = setup(6000.0);
        metronome.start(Settings::new(4, 120.0).unwrap());

        // All shorter than the 600-frame lookahead at 6 kHz
        let sizes = [441, 512, 64, 300, 7];
        let mut rendered = Vec::new();
        let mut i = 0;
        while renderer.clock().now() < 2.0 {
            let mut block = vec![0.0f32; sizes[i % sizes.len()]];
            renderer.process_block(&mut block);
            rendered.extend_from_slice(&block);
            metronome.on_frame();
            i += 1;
        }

        assert_eq!(renderer.clock().frame_position(), rendered.len() as u64);
        assert_eq!(onsets(&rendered)[..4], [0, 3000, 6000, 9000]);
    }
}
