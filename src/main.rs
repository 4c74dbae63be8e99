use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};

use beatgrid::analysis::{chop_regions, detect_buffer_bpm};
use beatgrid::audio::{self, SampleBuffer, SampleCache};
use beatgrid::pipeline::{persistence, ProjectState, Sample};
use beatgrid::render::{self, RenderMode};
use beatgrid::shared::{ChannelId, SAMPLE_RATE};
use beatgrid::synth::{synthesize_to_wav, MultiOscillatorParams, Preset};
use beatgrid::Middle;

#[derive(Parser, Debug)]
#[command(name = "beatgrid")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Step-sequencer drum machine engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Play the project's current pattern through the audio device
    Play {
        #[arg(value_name = "DIR", default_value = ".")]
        project_dir: PathBuf,

        /// Stop after this many seconds instead of waiting for Enter
        #[arg(long)]
        seconds: Option<f64>,
    },

    /// Render the song arrangement to WAV files
    Export {
        #[arg(value_name = "DIR", default_value = ".")]
        project_dir: PathBuf,

        #[arg(long, value_enum, default_value_t = ExportMode::Mix)]
        mode: ExportMode,

        /// Channel id for `--mode stem`
        #[arg(long)]
        channel: Option<u32>,

        /// Output directory (defaults to <DIR>/export)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Synthesize a preset or a JSON patch to a mono WAV
    Synth {
        /// kick, snare, hihat, clap, bass or lead
        #[arg(value_name = "PRESET", required_unless_present = "params")]
        preset: Option<String>,

        /// JSON file with oscillator parameters
        #[arg(long, value_name = "FILE")]
        params: Option<PathBuf>,

        #[arg(long)]
        duration_ms: Option<f64>,

        #[arg(short, long)]
        out: PathBuf,
    },

    /// Estimate the tempo of a WAV loop
    Bpm {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Beats per suggested chop slice
        #[arg(long, default_value_t = 1.0)]
        beats: f64,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ExportMode {
    Mix,
    Stems,
    Stem,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Play { project_dir, seconds } => play(&project_dir, seconds),
        Command::Export { project_dir, mode, channel, out } => {
            let mode = match (mode, channel) {
                (ExportMode::Mix, _) => RenderMode::Mix,
                (ExportMode::Stems, _) => RenderMode::Stems,
                (ExportMode::Stem, Some(id)) => RenderMode::Stem(ChannelId(id)),
                (ExportMode::Stem, None) => bail!("--mode stem needs --channel"),
            };
            let out = out.unwrap_or_else(|| project_dir.join("export"));
            export(&project_dir, mode, &out)
        }
        Command::Synth { preset, params, duration_ms, out } => synth(preset, params, duration_ms, &out),
        Command::Bpm { file, beats } => bpm(&file, beats),
    }
}

fn load_state(project_dir: &Path) -> anyhow::Result<ProjectState> {
    if let Some(state) = persistence::load_project(project_dir) {
        return Ok(state);
    }
    // fresh project: one channel per WAV in the directory
    let mut state = ProjectState::default();
    let wavs = persistence::index_wav_files(project_dir)
        .with_context(|| format!("cannot read {}", project_dir.display()))?;
    let mut next = 0;
    for path in wavs {
        let duration_ms = match hound::WavReader::open(&path) {
            Ok(r) => r.duration() as f64 * 1000.0 / r.spec().sample_rate.max(1) as f64,
            Err(e) => {
                warn!("skipping {}: {e}", path.display());
                continue;
            }
        };
        if next >= state.channels.len() {
            state.add_channel();
        }
        let ch = &mut state.channels[next];
        if let Some(stem) = path.file_stem() {
            ch.name = stem.to_string_lossy().into_owned();
        }
        ch.sample = Some(Sample::new(path.to_string_lossy(), duration_ms));
        next += 1;
    }
    Ok(state)
}

fn play(project_dir: &Path, seconds: Option<f64>) -> anyhow::Result<()> {
    let config = persistence::load_config(project_dir);
    let state = load_state(project_dir)?;
    let sink = audio::open_sink(&config.audio);
    let mut middle = Middle::new(state, config, sink).context("failed to start timing thread")?;

    let loaded = middle.restore_samples();
    info!("{loaded} sample(s) loaded, playing at {} BPM", middle.state.sequencer.bpm);

    let (quit_tx, quit_rx) = crossbeam_channel::bounded::<()>(1);
    if seconds.is_none() {
        std::thread::spawn(move || {
            let mut line = String::new();
            let _ = std::io::stdin().read_line(&mut line);
            let _ = quit_tx.send(());
        });
        info!("press Enter to stop");
    }
    let deadline = seconds.map(|s| Instant::now() + Duration::from_secs_f64(s.max(0.0)));

    middle.play();
    loop {
        middle.pump_timeout(Duration::from_millis(10));
        if quit_rx.try_recv().is_ok() || deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
    }
    middle.stop();

    persistence::save_project(project_dir, &middle.state).context("failed to save project")?;
    Ok(())
}

fn export(project_dir: &Path, mode: RenderMode, out: &Path) -> anyhow::Result<()> {
    let config = persistence::load_config(project_dir);
    let mut state = load_state(project_dir)?;
    if state.scenes.is_empty() {
        warn!("no scenes saved, exporting the current pattern");
        state.capture_scene("current");
    }

    let cache = SampleCache::new(config.render.sample_rate);
    let renders = render::render_song(&state.song_scenes(), &state.channels, mode, &config.render, &cache)
        .context("failed to render song")?;
    let paths = render::export_wavs(out, &renders, config.render.sample_rate)
        .with_context(|| format!("failed to write WAVs to {}", out.display()))?;
    info!("wrote {} file(s) to {}", paths.len(), out.display());
    Ok(())
}

fn synth(preset: Option<String>, params: Option<PathBuf>, duration_ms: Option<f64>, out: &Path) -> anyhow::Result<()> {
    let mut patch: MultiOscillatorParams = match (params, preset) {
        (Some(path), _) => {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("cannot read {}", path.display()))?;
            serde_json::from_str(&json).with_context(|| format!("bad patch in {}", path.display()))?
        }
        (None, Some(name)) => match Preset::from_name(&name) {
            Some(p) => p.params(),
            None => bail!("unknown preset {name:?}"),
        },
        (None, None) => bail!("give a preset name or --params"),
    };
    if let Some(ms) = duration_ms {
        patch.duration_ms = ms;
    }

    let bytes = synthesize_to_wav(&patch).context("failed to encode WAV")?;
    std::fs::write(out, bytes).with_context(|| format!("cannot write {}", out.display()))?;
    info!("wrote {} ({} samples)", out.display(), patch.sample_count());
    Ok(())
}

fn bpm(file: &Path, beats: f64) -> anyhow::Result<()> {
    let buffer = SampleBuffer::load_wav(file, SAMPLE_RATE)?;
    let Some(bpm) = detect_buffer_bpm(&buffer) else {
        println!("no clear tempo in {}", file.display());
        return Ok(());
    };
    println!("{bpm:.1} BPM");
    for (i, (start, end)) in chop_regions(buffer.duration_ms(), bpm, beats).iter().enumerate() {
        println!("  slice {i:>2}: {start:>8.1}ms .. {end:>8.1}ms");
    }
    Ok(())
}
