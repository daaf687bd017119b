use std::f64::consts::PI;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use wavescene_core::{
    ActionRegistry, AppConfig, Controller, PollTimeout, PresetDoc, SceneContext, SpectrumAnalyzer,
    StreamSource, TimedProgram, TimelineBuilder,
};

fn main() -> wavescene_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { seconds, preset } => run(seconds, preset.as_deref()),
        Commands::Validate { preset } => validate(&preset),
    }
}

/// Drives the whole pipeline headlessly: a producer thread synthesizes
/// audio and pushes slices, the main thread polls and renders.
fn run(seconds: u64, preset: Option<&Path>) -> wavescene_core::Result<()> {
    tracing::info!(seconds, ?preset, "starting headless run");

    let config = AppConfig::default();
    let (source, mut sink) = StreamSource::with_config(&config.pipeline);
    let handle = source.handle();

    let mut controller = Controller::offscreen(config.window.width, config.window.height);
    controller.set_frame_source(Box::new(source));

    match preset {
        Some(path) => {
            let renderer = PresetDoc::load(path)?.into_renderer(&demo_registry())?;
            controller.set_renderer(Some(renderer));
        }
        None => {
            let program = demo_program()?;
            controller.set_beat_detector(Some(Box::new(program.beat_flag())));
            controller.set_renderer(Some(Box::new(program)));
        }
    }

    controller.initialize()?;

    let running = Arc::new(AtomicBool::new(true));
    let producer_running = Arc::clone(&running);
    let producer = thread::spawn(move || {
        let mut analyzer = SpectrumAnalyzer::new();
        let mut spectrum = Vec::new();
        let started = Instant::now();

        while producer_running.load(Ordering::Relaxed) {
            let position = started.elapsed().as_secs_f64();
            let (left, right) = synth_block(position, 512);

            if analyzer.analyze(&left, &mut spectrum).is_err() {
                break;
            }

            sink.push(
                vec![left, right],
                vec![spectrum.clone()],
                position,
                "WaveScene demo",
            );
            thread::sleep(Duration::from_millis(16));
        }
    });

    let deadline = Duration::from_secs(seconds);
    let started = Instant::now();
    let mut rendered = 0_u64;

    while started.elapsed() < deadline && !controller.closed() {
        if controller.poll_data(PollTimeout::Wait(Duration::from_millis(500)))? {
            rendered += 1;
        }
        controller.render_frame()?;
    }

    // The engine callback must stop before the source side is torn down.
    running.store(false, Ordering::Relaxed);
    if producer.join().is_err() {
        tracing::warn!("producer thread panicked");
    }
    handle.close();
    controller.destroy()?;

    tracing::info!(
        rendered,
        dropped = handle.dropped_frames(),
        "run finished"
    );
    Ok(())
}

fn validate(path: &Path) -> wavescene_core::Result<()> {
    let doc = PresetDoc::load(path)?;
    doc.into_renderer(&demo_registry())?;
    tracing::info!(?path, "preset is valid");
    Ok(())
}

/// Timeline used when no preset file is supplied: one scene that flags
/// beats from PCM energy, plus a couple of logged markers.
fn demo_program() -> wavescene_core::Result<TimedProgram> {
    let timeline = TimelineBuilder::new()
        .event(0.0, |_cx: &mut SceneContext<'_>| {
            tracing::info!("demo timeline armed");
        })
        .scene(0.0, |cx: &mut SceneContext<'_>| {
            let mut pcm = vec![0.0_f32; 64];
            if cx.controller.frame_source().get_pcm_mono(&mut pcm).is_ok() {
                let rms =
                    (pcm.iter().map(|sample| sample * sample).sum::<f32>() / pcm.len() as f32)
                        .sqrt();
                if rms > 0.5 {
                    cx.beat.set();
                }
            }
        })
        .event(5.0, |_cx: &mut SceneContext<'_>| {
            tracing::info!("five seconds into the track");
        })
        .build()?;

    Ok(TimedProgram::new(timeline))
}

/// Actions preset files may reference.
fn demo_registry() -> ActionRegistry {
    let mut registry = ActionRegistry::new();
    registry.register("log_marker", || {
        Box::new(|_cx: &mut SceneContext<'_>| tracing::info!("timeline marker reached"))
    });
    registry.register("pulse", || {
        Box::new(|cx: &mut SceneContext<'_>| cx.beat.set())
    });
    registry
}

/// Two channels of a 220 Hz tone, slightly attenuated on the right.
fn synth_block(position: f64, len: usize) -> (Vec<f32>, Vec<f32>) {
    let mut left = Vec::with_capacity(len);
    let mut right = Vec::with_capacity(len);

    for i in 0..len {
        let t = position + i as f64 / 48_000.0;
        let sample = (2.0 * PI * 220.0 * t).sin() as f32;
        left.push(sample);
        right.push(sample * 0.8);
    }

    (left, right)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Audio-reactive visualization pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Drive the pipeline headlessly against a synthetic audio feed.
    Run {
        /// How long to run, in seconds.
        #[arg(short, long, default_value_t = 10)]
        seconds: u64,
        /// Optional preset file describing the renderer.
        #[arg(short, long)]
        preset: Option<PathBuf>,
    },
    /// Check a preset file against the built-in action registry.
    Validate {
        /// Path to the preset JSON document.
        preset: PathBuf,
    },
}
