// src/main.rs
//
// Command line metronome: plays a beat pattern through the lookahead
// scheduler, shows the beat indicator in the log and optionally writes the
// rendered audio to a WAV file.

use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

#[cfg(feature = "realtime")]
use metronome::{HostError, OutputDevice, RealtimeHost};
use metronome::{
    AudioPlayer, BeatIndicator, CatchUpPolicy, HostConfig, Metronome, OfflineHost, PlayerConfig,
    PlayerError, Rendered, SchedulerConfig, Settings, SettingsError, SoundBank, SoundLoader,
    SoundVariant, create_player,
};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Player(#[from] PlayerError),

    #[cfg(feature = "realtime")]
    #[error(transparent)]
    Host(#[from] HostError),

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: hound::Error,
    },
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Lookahead-scheduled metronome", long_about = None)]
struct Cli {
    /// Beats per cycle.
    #[arg(short, long, default_value_t = 4)]
    beats: u32,

    /// Tempo in beats per minute.
    #[arg(short = 't', long, default_value_t = 60.0)]
    bpm: f64,

    /// Seconds of audio clock time to play.
    #[arg(short, long, default_value_t = 8.0)]
    seconds: f64,

    /// Sample rate in Hz for offline rendering.
    #[arg(long, default_value_t = 48_000)]
    sample_rate: u32,

    /// Host frame callbacks per second.
    #[arg(long, default_value_t = 60.0)]
    frame_rate: f64,

    /// How to handle beats missed while the host was stalled.
    #[arg(long, value_enum, default_value_t = CatchUp::Burst)]
    catch_up: CatchUp,

    /// WAV file for the first beat of each cycle.
    #[arg(long)]
    accent: Option<PathBuf>,

    /// WAV file for the other beats.
    #[arg(long)]
    regular: Option<PathBuf>,

    /// Write the rendered audio to this WAV file.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Play through the default sound card instead of rendering offline.
    #[cfg(feature = "realtime")]
    #[arg(long, conflicts_with = "output")]
    realtime: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CatchUp {
    Burst,
    Resync,
}

impl From<CatchUp> for CatchUpPolicy {
    fn from(value: CatchUp) -> Self {
        match value {
            CatchUp::Burst => CatchUpPolicy::Burst,
            CatchUp::Resync => CatchUpPolicy::Resync,
        }
    }
}

fn main() {
    init_tracing();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let settings = Settings::clamped(cli.beats, cli.bpm)?;
    if settings.tempo.bpm() != cli.bpm {
        log::warn!("Tempo {} BPM is out of range, using {}", cli.bpm, settings.tempo);
    }

    let config = SchedulerConfig {
        catch_up: cli.catch_up.into(),
        ..Default::default()
    };
    let host_config = HostConfig {
        frame_rate: cli.frame_rate,
        seconds: cli.seconds,
        ..Default::default()
    };

    log::info!(
        "Playing {} beats at {} for {}s",
        settings.beat_count.get(),
        settings.tempo,
        cli.seconds
    );

    #[cfg(feature = "realtime")]
    if cli.realtime {
        return run_realtime(&cli, settings, config, host_config);
    }
    run_offline(&cli, settings, config, host_config)
}

fn run_offline(
    cli: &Cli,
    settings: Settings,
    config: SchedulerConfig,
    host_config: HostConfig,
) -> Result<(), CliError> {
    let sample_rate = cli.sample_rate as f64;
    let (player, mut renderer) = create_player(PlayerConfig {
        sample_rate,
        ..Default::default()
    })?;

    let (sounds, loader) = load_sounds(cli, sample_rate);
    let mut metronome = Metronome::new(player, BeatIndicator::default(), sounds, config);

    let rendered = OfflineHost::new(host_config).run(
        &mut metronome,
        &mut renderer,
        settings,
        frame_hook(loader),
    );

    log::info!(
        "Rendered {:.2}s of audio in {} host frames",
        rendered.frames() as f64 / rendered.sample_rate,
        rendered.host_frames
    );

    if let Some(path) = &cli.output {
        write_wav(path, &rendered)?;
        log::info!("Wrote {}", path.display());
    }

    Ok(())
}

#[cfg(feature = "realtime")]
fn run_realtime(
    cli: &Cli,
    settings: Settings,
    config: SchedulerConfig,
    host_config: HostConfig,
) -> Result<(), CliError> {
    let device = OutputDevice::open_default()?;
    let player_config = device.player_config();
    let (player, renderer) = create_player(player_config)?;

    let (sounds, loader) = load_sounds(cli, player_config.sample_rate);
    let mut metronome = Metronome::new(player, BeatIndicator::default(), sounds, config);

    let host_frames = RealtimeHost::new(host_config).run(
        &mut metronome,
        renderer,
        &device,
        settings,
        frame_hook(loader),
    )?;

    log::info!("Played {} host frames", host_frames);
    Ok(())
}

/// Synthesised clicks right away; files given on the command line replace
/// them whenever the loader finishes.
fn load_sounds(cli: &Cli, sample_rate: f64) -> (SoundBank, SoundLoader) {
    let sounds = SoundBank::with_default_clicks(sample_rate);
    let mut loader = SoundLoader::new();
    for (variant, path) in [
        (SoundVariant::Accent, &cli.accent),
        (SoundVariant::Regular, &cli.regular),
    ] {
        if let Some(path) = path {
            loader.load(variant, path.clone());
        }
    }
    (sounds, loader)
}

/// Per-frame work: install loaded sounds and log the indicator when the
/// active beat changes.
fn frame_hook(mut loader: SoundLoader) -> impl FnMut(&mut Metronome<AudioPlayer, BeatIndicator>) {
    let mut last_active = None;
    move |m: &mut Metronome<AudioPlayer, BeatIndicator>| {
        for (variant, result) in loader.poll() {
            match result {
                Ok(buffer) => m.install_sound(variant, buffer),
                Err(e) => log::warn!("Could not load {} sound: {}", variant.name(), e),
            }
        }

        let active = m.display().active();
        if active != last_active {
            last_active = active;
            log::info!("{}", m.display());
        }
    }
}

fn write_wav(path: &Path, rendered: &Rendered) -> Result<(), CliError> {
    let wrap = |source| CliError::Write {
        path: path.to_path_buf(),
        source,
    };

    let spec = hound::WavSpec {
        channels: rendered.channels as u16,
        sample_rate: rendered.sample_rate as u32,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut writer = hound::WavWriter::create(path, spec).map_err(wrap)?;
    for &sample in &rendered.samples {
        writer.write_sample(sample).map_err(wrap)?;
    }
    writer.finalize().map_err(wrap)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}
