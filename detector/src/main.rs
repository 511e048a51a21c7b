//! Command-line entry point for the detection pipeline.

use std::io;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use clap::Parser;

use detector::{
    JsonLinesSink, LabelTable, NullBackend, Pipeline, PipelineConfig, PipelineError, TestPattern,
};
use kftrack::TrackerConfig;

#[derive(Parser, Debug)]
#[command(name = "detector", version, about = "Real-time object detection and tracking pipeline")]
struct Args {
    /// Path to the detection model
    #[arg(short, long)]
    model: PathBuf,

    /// Path to the label file (one label per line)
    #[arg(short, long)]
    labels: PathBuf,

    /// Capture width in pixels
    #[arg(long, default_value_t = 640)]
    width: u32,

    /// Capture height in pixels
    #[arg(long, default_value_t = 480)]
    height: u32,

    /// Capture rate in frames per second
    #[arg(long, default_value_t = 20)]
    fps: u32,

    /// Inference thread count hint for the backend
    #[arg(short, long, default_value_t = 1)]
    threads: u32,

    /// Minimum detection confidence
    #[arg(long, default_value_t = 0.5)]
    threshold: f32,

    /// Maximum association distance in pixels
    #[arg(long, default_value_t = 100.0)]
    max_dist: f64,

    /// Milliseconds before an unseen track is dropped
    #[arg(long, default_value_t = 1000)]
    max_time: u64,

    /// Worker thread priority
    #[arg(short, long, default_value_t = 50)]
    priority: u32,

    /// Inter-hook worker yield in microseconds
    #[arg(long, default_value_t = 1000)]
    yield_time: u32,

    /// Seconds to run before shutting down (0 = run until killed)
    #[arg(short, long, default_value_t = 0)]
    duration: u64,

    /// Suppress the per-stage statistics tables
    #[arg(short, long)]
    quiet: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let args = Args::parse();

    let level = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(err) = run(args) {
        log::error!("{err}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> detector::Result<()> {
    let backend = NullBackend::new(&args.model, args.threads)?;
    let labels = LabelTable::load(&args.labels)?;
    if labels.is_empty() {
        return Err(PipelineError::config(format!(
            "label file {} is empty",
            args.labels.display()
        )));
    }

    let config = PipelineConfig {
        width: args.width,
        height: args.height,
        fps: args.fps,
        threshold: args.threshold,
        tracker: TrackerConfig {
            max_dist: args.max_dist,
            max_time: Duration::from_millis(args.max_time),
            ..TrackerConfig::default()
        },
        priority: args.priority,
        yield_us: args.yield_time,
        quiet: args.quiet,
        ..PipelineConfig::default()
    };

    let mut pipeline = Pipeline::build(
        config,
        Box::new(TestPattern::new(args.width, args.height)),
        Box::new(backend),
        labels,
        Box::new(JsonLinesSink::new(io::stdout())),
    )?;

    pipeline.start()?;

    if args.duration == 0 {
        log::info!("running until killed");
        loop {
            thread::sleep(Duration::from_secs(1));
        }
    }

    thread::sleep(Duration::from_secs(args.duration));
    pipeline.stop()?;
    Ok(())
}
