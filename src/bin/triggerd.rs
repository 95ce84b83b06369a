//! triggerd - camera presence trigger daemon
//!
//! Opens the serial link, loads the detector and opens the camera, then runs
//! detection on every frame and writes `'A'` to the link each time an object
//! of interest appears. Runs until the stream ends, a fatal error occurs, the
//! frame limit is reached or Ctrl-C is pressed.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use presence_trigger::config::split_csv;
use presence_trigger::{FrameSink, LogSink, NullSink, StopFlag, TriggerConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Pulse a serial link when a camera sees an object of interest")]
struct Args {
    /// JSON config file. Environment variables and flags override it.
    #[arg(long, env = "TRIGGER_CONFIG")]
    config: Option<PathBuf>,

    /// Model weights (ONNX), or stub://<class> for the pattern detector.
    #[arg(short = 'w', long)]
    weights: Option<String>,

    /// Model description file (input size, layout, normalization, outputs).
    #[arg(short = 'p', long = "model-config")]
    model_config: Option<PathBuf>,

    /// Confidence threshold (0.0-1.0), inclusive.
    #[arg(short = 'c', long)]
    confidence: Option<f32>,

    /// Camera index N, opened as /dev/videoN.
    #[arg(long)]
    camera: Option<u32>,

    /// Camera device path; overrides --camera. stub://<name> for a synthetic scene.
    #[arg(long)]
    device: Option<String>,

    /// Serial port the trigger byte is written to.
    #[arg(long)]
    serial_port: Option<String>,

    /// Serial baud rate.
    #[arg(long)]
    baud: Option<u32>,

    /// Comma-separated categories of interest (names or class ids).
    #[arg(long)]
    categories: Option<String>,

    /// Capture the next frame while the current one is being processed.
    #[arg(long)]
    prefetch: bool,

    /// Stop after this many processed frames.
    #[arg(long)]
    max_frames: Option<u64>,

    /// Skip the per-frame detection log (debug level otherwise).
    #[arg(long)]
    quiet_frames: bool,

    /// Seconds between health log lines.
    #[arg(long, default_value_t = 5)]
    health_interval_secs: u64,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            log::error!("triggerd failed to start: {:#}", err);
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let args = Args::parse();
    let config = resolve_config(&args)?;

    let stop = StopFlag::new();
    stop.install_ctrlc()?;

    let sink: Box<dyn FrameSink> = if args.quiet_frames {
        Box::new(NullSink)
    } else {
        Box::new(LogSink::new(config.confidence))
    };

    let mut settings = config.loop_settings()?;
    settings.health_interval = Duration::from_secs(args.health_interval_secs.max(1));

    let components = presence_trigger::acquire(&config)?;
    let report = presence_trigger::ControlLoop::new(components, settings, stop)
        .with_sink(sink)
        .run();

    log::info!(
        "frames={} rising={} falling={} signals={} link_failures={} mean_inference={:.2}ms max_inference={:.2}ms",
        report.stats.frames,
        report.stats.rising_edges,
        report.stats.falling_edges,
        report.stats.signals_sent,
        report.stats.link_failures,
        report.stats.mean_inference_ms(),
        report.stats.max_inference.as_secs_f64() * 1000.0
    );
    Ok(report.exit.exit_code())
}

fn resolve_config(args: &Args) -> Result<TriggerConfig> {
    let mut config = TriggerConfig::from_sources(args.config.as_deref())?;
    if let Some(weights) = &args.weights {
        config.model.weights = weights.clone();
    }
    if let Some(path) = &args.model_config {
        config.model.description = Some(path.clone());
    }
    if let Some(confidence) = args.confidence {
        config.confidence = confidence;
    }
    if let Some(index) = args.camera {
        config.camera.select_index(index);
    }
    if let Some(device) = &args.device {
        config.camera.device = Some(device.clone());
    }
    if let Some(port) = &args.serial_port {
        config.serial.port = port.clone();
    }
    if let Some(baud) = args.baud {
        config.serial.baud_rate = baud;
    }
    if let Some(categories) = &args.categories {
        config.categories = split_csv(categories);
    }
    if args.prefetch {
        config.prefetch = true;
    }
    if let Some(max_frames) = args.max_frames {
        config.max_frames = Some(max_frames);
    }
    config.validate()?;
    Ok(config)
}
