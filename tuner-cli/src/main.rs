//! # Tuner - Terminal Front End
//!
//! Captures audio (or replays a WAV file), runs the tuner core on a
//! dedicated thread and prints the note and flat/sharp gauge.
//!
//! ## Architecture
//! - **Main thread**: reads frames from the core and prints them
//! - **Capture thread**: owned by `TunerWorker`, produces one frame per buffer
//! - **Input thread**: waits for Enter on stdin and asks the main loop to quit

mod display;

use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::Receiver;
use env_logger::Env;
use log::info;
use tuner_core::audio::CpalSource;
use tuner_core::estimator::YinEstimator;
use tuner_core::source::{AudioSource, WavSource};
use tuner_core::{FeedbackFrame, StopToken, TunerConfig, TunerWorker};

use display::Printer;

#[derive(Parser, Debug)]
#[command(
    name = "tuner",
    about = "Real-time tuner: shows the nearest note and how flat or sharp it is"
)]
struct Cli {
    /// JSON config file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,
    /// Replay a WAV file instead of capturing from the default input device
    #[arg(long)]
    wav: Option<PathBuf>,
    #[arg(long)]
    sample_rate: Option<u32>,
    #[arg(long)]
    channels: Option<u16>,
    /// Frames per analysis buffer
    #[arg(long)]
    buffer_size: Option<usize>,
    /// Reference frequency of concert A in Hz
    #[arg(long = "a4")]
    reference_a4: Option<f32>,
    /// Print every frame, not only changes
    #[arg(long)]
    every_frame: bool,
    /// Print the effective config as JSON and exit
    #[arg(long)]
    dump_config: bool,
    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = effective_config(&cli)?;

    if cli.dump_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let (frame_tx, frame_rx) = crossbeam_channel::unbounded();

    match &cli.wav {
        Some(path) => {
            let source = WavSource::open(path, config.audio.buffer_size)
                .with_context(|| format!("opening {}", path.display()))?;
            config.audio.sample_rate = source.sample_rate();
            let estimator = YinEstimator::new(config.estimator.clone(), config.audio.sample_rate);
            let worker = TunerWorker::spawn(&config, move |_: &StopToken| Ok(source), estimator, frame_tx)
                .context("starting WAV replay")?;

            let printer = Printer::new(std::io::stdout().lock(), cli.every_frame)
                .with_timestamps(config.audio.buffer_size, config.audio.sample_rate);
            consume(worker, &frame_rx, &crossbeam_channel::never(), printer)
        }
        None => {
            let estimator = YinEstimator::new(config.estimator.clone(), config.audio.sample_rate);
            let audio_config = config.audio.clone();
            let worker = TunerWorker::spawn(
                &config,
                move |stop: &StopToken| CpalSource::open(&audio_config, stop.clone()),
                estimator,
                frame_tx,
            )
            .context("starting audio capture")?;

            info!("Listening. Press Enter to stop.");
            let quit_rx = spawn_quit_listener()?;
            let printer = Printer::new(std::io::stdout().lock(), cli.every_frame);
            consume(worker, &frame_rx, &quit_rx, printer)
        }
    }
}

/// Loads the config file (or defaults) and applies command-line overrides.
fn effective_config(cli: &Cli) -> Result<TunerConfig> {
    let mut config = match &cli.config {
        Some(path) => TunerConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => TunerConfig::default(),
    };

    if let Some(sample_rate) = cli.sample_rate {
        config.audio.sample_rate = sample_rate;
    }
    if let Some(channels) = cli.channels {
        config.audio.channels = channels;
    }
    if let Some(buffer_size) = cli.buffer_size {
        config.audio.buffer_size = buffer_size;
    }
    if let Some(reference_a4) = cli.reference_a4 {
        config.estimator.reference_a4 = reference_a4;
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Signals once when the user presses Enter or stdin closes.
fn spawn_quit_listener() -> Result<Receiver<()>> {
    let (quit_tx, quit_rx) = crossbeam_channel::bounded(1);
    thread::Builder::new()
        .name("tuner-stdin".to_string())
        .spawn(move || {
            let mut line = String::new();
            let _ = std::io::stdin().lock().read_line(&mut line);
            let _ = quit_tx.send(());
        })
        .context("spawning stdin listener")?;
    Ok(quit_rx)
}

/// Prints frames until the worker finishes or a quit is requested, then
/// shuts the worker down and reports how the capture loop ended.
fn consume<W: std::io::Write>(
    mut worker: TunerWorker,
    frames: &Receiver<FeedbackFrame>,
    quit: &Receiver<()>,
    mut printer: Printer<W>,
) -> Result<()> {
    loop {
        crossbeam_channel::select! {
            recv(frames) -> msg => match msg {
                Ok(frame) => printer.show(&frame).context("writing to stdout")?,
                // Capture thread has finished.
                Err(_) => break,
            },
            recv(quit) -> _ => {
                info!("Stop requested");
                break;
            },
        }
    }

    worker.stop().context("audio capture failed")?;
    Ok(())
}
