// src/metronome.rs
//
// Start/stop control surface around the lookahead scheduler.
//
// The host calls `on_frame` from its per-frame callback. Each run of the
// scheduler asks for the next frame instead of looping, so the metronome
// never blocks the host and stopping is a flag checked on the next frame.

use crate::display::BeatDisplay;
use crate::player::SoundOutput;
use crate::scheduler::{LookaheadScheduler, SchedulerConfig, Wake};
use crate::sound::{SoundBank, SoundBuffer, SoundVariant};
use crate::tempo::Settings;

/// Owns one output, one display and at most one running scheduler.
pub struct Metronome<O: SoundOutput, D: BeatDisplay> {
    output: O,
    display: D,
    sounds: SoundBank,
    config: SchedulerConfig,

    /// Present from `start` until the first wake-up after `stop`.
    scheduler: Option<LookaheadScheduler>,

    /// A wake-up is registered for the next host frame.
    frame_requested: bool,
}

impl<O: SoundOutput, D: BeatDisplay> Metronome<O, D> {
    pub fn new(output: O, display: D, sounds: SoundBank, config: SchedulerConfig) -> Self {
        Self {
            output,
            display,
            sounds,
            config,
            scheduler: None,
            frame_requested: false,
        }
    }

    /// Start playback. Restarts cleanly if already playing.
    pub fn start(&mut self, settings: Settings) {
        if self.is_playing() {
            log::debug!("Restarting metronome");
            self.stop();
        }

        self.display.set_beat_count(settings.beat_count.get());

        let scheduler = LookaheadScheduler::start(settings, self.config, self.output.now());
        self.scheduler = Some(scheduler);

        // First wake-up runs right away, later ones on host frames
        self.frame_requested = true;
        self.on_frame();
    }

    /// Stop playback and cut off the sound still ringing, along with any
    /// queued sound that has not started yet. No-op when stopped.
    pub fn stop(&mut self) {
        let Some(scheduler) = self.scheduler.as_mut().filter(|s| s.is_playing()) else {
            return;
        };

        for voice in scheduler.stop(self.output.now()) {
            self.output.silence(voice);
        }
    }

    /// Start when stopped, stop when playing. Returns the new playing state.
    pub fn toggle(&mut self, settings: Settings) -> bool {
        if self.is_playing() {
            self.stop();
        } else {
            self.start(settings);
        }
        self.is_playing()
    }

    /// Host per-frame callback.
    ///
    /// Returns true if another frame is requested.
    pub fn on_frame(&mut self) -> bool {
        if !std::mem::take(&mut self.frame_requested) {
            return false;
        }
        let Some(scheduler) = self.scheduler.as_mut() else {
            return false;
        };

        match scheduler.wake(&mut self.output, &self.sounds, &mut self.display) {
            Wake::Reschedule => self.frame_requested = true,
            Wake::Finished => self.scheduler = None,
        }
        self.frame_requested
    }

    /// Install a buffer that finished loading. Safe at any time; the next
    /// beat that needs it picks it up.
    pub fn install_sound(&mut self, variant: SoundVariant, buffer: SoundBuffer) {
        self.sounds.install(variant, buffer);
    }

    // -------------------------------
    // MARK: Accessors
    // -------------------------------

    pub fn is_playing(&self) -> bool {
        self.scheduler.as_ref().is_some_and(|s| s.is_playing())
    }

    /// Whether a wake-up is registered for the next frame.
    pub fn frame_requested(&self) -> bool {
        self.frame_requested
    }

    pub fn scheduler(&self) -> Option<&LookaheadScheduler> {
        self.scheduler.as_ref()
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut O {
        &mut self.output
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }

    pub fn sounds(&self) -> &SoundBank {
        &self.sounds
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::AudioClock;
    use crate::display::BeatIndicator;
    use crate::player::{PlayerConfig, VoiceId, create_player};
    use crate::testing::{RecordingDisplay, RecordingOutput, frame_times, test_bank};

    type TestMetronome = Metronome<RecordingOutput, RecordingDisplay>;

    fn metronome() -> TestMetronome {
        Metronome::new(
            RecordingOutput::new(0.0),
            RecordingDisplay::default(),
            test_bank(),
            SchedulerConfig::default(),
        )
    }

    fn run_frames(metronome: &mut TestMetronome, until: f64) {
        let from = metronome.output().now();
        for t in frame_times(from, until, 60.0) {
            metronome.output().clock.set(t);
            metronome.on_frame();
        }
    }

    #[test]
    fn test_scenario_stop_mid_beat() {
        let mut metronome = metronome();
        metronome.start(Settings::new(4, 60.0).unwrap());
        assert_eq!(metronome.display().beat_count, Some(4));

        run_frames(&mut metronome, 2.3);
        metronome.stop();

        let output = metronome.output();
        assert_eq!(output.starts(), vec![0.0, 1.0, 2.0]);
        assert_eq!(metronome.display().highlights, vec![0, 1, 2]);

        // The sound started at 2.0 (0.5s long) is cut off
        let in_flight = output.sounds.last().unwrap();
        assert_eq!(in_flight.duration, 0.5);
        assert_eq!(output.silenced, vec![in_flight.voice]);

        run_frames(&mut metronome, 5.0);
        let output = metronome.output();
        assert!(output.sounds.iter().all(|s| s.start < 2.3));
        assert!(!metronome.is_playing());
    }

    #[test]
    fn test_pending_frame_fires_once_after_stop() {
        let mut metronome = metronome();
        metronome.start(Settings::default());
        assert!(metronome.frame_requested());

        metronome.stop();
        // Registered before the stop, so it still fires and ends the chain
        assert!(metronome.frame_requested());
        assert!(metronome.scheduler().is_some());

        assert!(!metronome.on_frame());
        assert!(metronome.scheduler().is_none());
        assert!(!metronome.on_frame());
    }

    #[test]
    fn test_double_stop_matches_single_stop() {
        let mut once = metronome();
        let mut twice = metronome();
        for m in [&mut once, &mut twice] {
            m.start(Settings::default());
            run_frames(m, 1.2);
        }

        once.stop();
        twice.stop();
        twice.stop();

        assert_eq!(once.is_playing(), twice.is_playing());
        assert_eq!(
            once.scheduler().map(|s| *s.state()),
            twice.scheduler().map(|s| *s.state())
        );
        assert_eq!(once.output().silenced, twice.output().silenced);
    }

    #[test]
    fn test_stop_when_never_started() {
        let mut metronome = metronome();
        metronome.stop();
        assert!(!metronome.is_playing());
        assert!(metronome.output().silenced.is_empty());
        assert!(!metronome.on_frame());
    }

    #[test]
    fn test_start_while_playing_restarts() {
        let mut metronome = metronome();
        metronome.start(Settings::new(4, 60.0).unwrap());
        run_frames(&mut metronome, 1.5);

        metronome.start(Settings::new(3, 120.0).unwrap());
        assert!(metronome.is_playing());
        assert_eq!(metronome.display().beat_count, Some(3));
        // The old run's last sound was silenced
        assert_eq!(metronome.output().silenced.len(), 1);

        let scheduler = metronome.scheduler().unwrap();
        assert_eq!(scheduler.beat_interval(), 0.5);
        assert_eq!(scheduler.state().current_beat, 1);

        // New origin is the restart time
        let starts = metronome.output().starts();
        assert_eq!(starts.last(), Some(&1.5));
    }

    #[test]
    fn test_stop_at_high_tempo_silences_queued_sounds() {
        let mut metronome = metronome();
        metronome.start(Settings::new(4, 2000.0).unwrap());
        metronome.stop();

        let output = metronome.output();
        let upcoming: Vec<VoiceId> = output
            .sounds
            .iter()
            .filter(|s| s.start > 0.0)
            .map(|s| s.voice)
            .collect();
        assert_eq!(upcoming.len(), 3);
        assert!(upcoming.iter().all(|v| output.silenced.contains(v)));
    }

    #[test]
    fn test_clamped_settings_keep_one_beat_per_window() {
        let mut metronome = metronome();
        metronome.start(Settings::clamped(4, 2000.0).unwrap());

        let scheduler = metronome.scheduler().unwrap();
        assert_eq!(scheduler.tempo().bpm(), crate::tempo::MAX_BPM);
        assert_eq!(metronome.output().starts(), vec![0.0]);
    }

    #[test]
    fn test_toggle() {
        let mut metronome = metronome();
        assert!(metronome.toggle(Settings::default()));
        assert!(!metronome.toggle(Settings::default()));
        assert!(metronome.toggle(Settings::default()));
    }

    #[test]
    fn test_late_sound_install() {
        let mut metronome = Metronome::new(
            RecordingOutput::new(0.0),
            RecordingDisplay::default(),
            SoundBank::new(),
            SchedulerConfig::default(),
        );
        metronome.start(Settings::default());
        run_frames(&mut metronome, 0.5);
        assert!(metronome.output().sounds.is_empty());

        metronome.install_sound(
            SoundVariant::Regular,
            SoundBuffer::default_regular(48_000.0),
        );
        run_frames(&mut metronome, 1.5);
        assert_eq!(metronome.output().starts(), vec![1.0]);
        assert_eq!(metronome.display().highlights, vec![0, 1]);
    }

    #[test]
    fn test_with_renderer_and_indicator() {
        let config = PlayerConfig {
            sample_rate: 1000.0,
            channels: 1,
            max_voices: 8,
        };
        let (player, mut renderer) = create_player(config).unwrap();
        let mut sounds = SoundBank::new();
        sounds.install(
            SoundVariant::Regular,
            SoundBuffer::from_samples(vec![1.0; 1000], 1, 1000.0).unwrap(),
        );
        let mut metronome = Metronome::new(
            player,
            BeatIndicator::default(),
            sounds,
            SchedulerConfig::default(),
        );

        metronome.start(Settings::new(4, 120.0).unwrap());

        // 20-frame blocks ~ 50 host frames per second
        let mut rendered = Vec::new();
        let mut block = vec![0.0f32; 20];
        while metronome.output().now() < 2.0 {
            metronome.on_frame();
            renderer.process_block(&mut block);
            rendered.extend_from_slice(&block);
        }
        metronome.stop();
        for _ in 0..10 {
            metronome.on_frame();
            renderer.process_block(&mut block);
            rendered.extend_from_slice(&block);
        }

        // Each beat starts exactly on its frame: 0, 500, 1000, 1500
        for onset in [0usize, 500, 1000, 1500] {
            assert_eq!(rendered[onset], 1.0);
            if onset > 0 {
                assert_eq!(rendered[onset - 1], 0.0);
            }
        }
        // Sounds last a quarter second
        assert_eq!(rendered[249], 1.0);
        assert_eq!(rendered[250], 0.0);
        // Nothing after the stop at 2.0s
        assert!(rendered[2000..].iter().all(|s| *s == 0.0));

        assert_eq!(metronome.display().slots().len(), 4);
        assert!(metronome.display().highlight_count() >= 4);
        assert_eq!(renderer.active_voices(), 0);
    }
}
