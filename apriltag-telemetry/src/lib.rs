//! Detect AprilTags in live or recorded video and publish the pose of one tag
//! per frame to a network table.
//!
//! Each frame goes through the [FramePipeline]: the [TagDetector] finds tags,
//! a [SelectionStrategy] picks one, the [QualityGate] accepts or rejects it,
//! the pose is decomposed into angles and offsets with [pose::decompose], and
//! a [Telemetry] message is handed to the [TelemetryPublisher]. The
//! [MultiSourceDriver] feeds frames from each configured source in turn.

use std::path::PathBuf;

use clap::Parser;
use eyre::{Context, Result as EyreResult};
use tracing::info;

/// The log filter used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "info";

mod datagram_socket;
mod error;
pub use error::{Error, Result};

pub mod config;
pub mod detector;
pub mod driver;
pub mod gate;
pub mod miss;
pub mod pipeline;
pub mod pose;
pub mod selection;
pub mod sink;
pub mod source;
pub mod stop;
pub mod telemetry;

pub use config::{parse_config_file, TelemetryConfig};
pub use detector::{AprilTagDetector, CameraIntrinsics, RawDetection, TagDetector};
pub use driver::{MultiSourceDriver, RunSummary};
pub use gate::QualityGate;
pub use miss::{MissPolicy, MissTracker};
pub use pipeline::{FrameOutcome, FramePipeline, PipelineSettings, Rejection};
pub use selection::SelectionStrategy;
pub use sink::{FrameSink, Y4mRecorder};
pub use source::{FfmpegOpener, Frame, SourceDescriptor, SourceOpener, VideoSource};
pub use stop::StopSignal;
pub use telemetry::{
    Telemetry, TelemetryPublisher, TelemetryRecord, UdpTablePublisher, SENTINEL_TAG_ID,
};

#[derive(Parser, Default, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (.toml). Defaults are used if not given.
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Input source: a camera index or a video filename. Can be given
    /// multiple times. Overrides the sources in the configuration file.
    #[arg(long = "source", short = 's')]
    pub sources: Vec<String>,

    /// UDP address of the network table bridge, `HOST:PORT`.
    #[arg(long, env = "APRILTAG_TELEMETRY_BRIDGE")]
    pub bridge: Option<String>,

    /// Record annotated frames to this .y4m file.
    #[arg(long)]
    pub record: Option<PathBuf>,

    /// Stop processing the current source when Enter is pressed.
    #[arg(long)]
    pub stop_on_keypress: bool,

    /// Maximum number of frames to analyze.
    #[arg(long)]
    pub max_num_frames: Option<usize>,

    /// Also write the log to this file.
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Print the default configuration as TOML and exit.
    #[arg(long)]
    pub print_default_config: bool,
}

/// Load the configuration file (if any) and apply command line overrides.
///
/// The result is validated.
pub fn load_config(cli: &Cli) -> EyreResult<TelemetryConfig> {
    let mut cfg = match &cli.config {
        Some(fname) => parse_config_file(fname)
            .with_context(|| format!("when reading configuration {}", fname.display()))?,
        None => TelemetryConfig::default(),
    };
    if !cli.sources.is_empty() {
        cfg.sources = cli
            .sources
            .iter()
            .map(|s| s.parse())
            .collect::<Result<Vec<SourceDescriptor>>>()?;
    }
    if let Some(bridge) = &cli.bridge {
        cfg.publisher.bridge_addr = bridge.clone();
    }
    if let Some(record) = &cli.record {
        cfg.output.record_path = Some(record.clone());
    }
    if cli.stop_on_keypress {
        cfg.output.stop_on_keypress = true;
    }
    cfg.validate()?;
    Ok(cfg)
}

pub fn run_cli(cli: Cli) -> EyreResult<()> {
    if cli.print_default_config {
        print!("{}", TelemetryConfig::default().to_toml()?);
        return Ok(());
    }

    let cfg = load_config(&cli)?;
    let families = cfg.families()?;

    let bridge_addr = telemetry::resolve_bridge_addr(&cfg.publisher.bridge_addr)?;
    let publisher = UdpTablePublisher::connect(bridge_addr, &cfg.publisher.table)
        .with_context(|| format!("when connecting to {bridge_addr}"))?;
    info!(
        "publishing to table \"{}\" via bridge at {bridge_addr}",
        cfg.publisher.table
    );

    let detector = AprilTagDetector::new(&families, &(&cfg.detector).into());
    let mut pipeline = FramePipeline::new(detector, publisher, cfg.pipeline_settings());
    if let Some(record_path) = &cfg.output.record_path {
        let recorder = Y4mRecorder::create(record_path, cfg.output.record_fps)
            .with_context(|| format!("when creating {}", record_path.display()))?;
        pipeline = pipeline.with_sink(Box::new(recorder));
    }

    let stop = StopSignal::new();
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || {
            info!("got Ctrl-C, shutting down");
            stop.request_shutdown();
        })
        .context("when setting Ctrl-C handler")?;
    }
    if cfg.output.stop_on_keypress {
        stop.spawn_keypress_watcher()?;
    }

    let mut driver = MultiSourceDriver::new(FfmpegOpener::default(), cfg.sources.clone())
        .with_max_num_frames(cli.max_num_frames);
    let summary = driver.run(&mut pipeline, &stop);

    info!(
        "processed {} frame(s) from {} source(s), {} source(s) unavailable, {} consecutive missed frame(s) at end",
        summary.frames_processed,
        summary.sources_completed,
        summary.sources_failed,
        pipeline.miss_tracker().count()
    );
    Ok(())
}
