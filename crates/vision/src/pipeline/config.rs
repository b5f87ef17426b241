//! Configuration parsing for the motion capture pipeline.
//!
//! This module owns translation of CLI arguments into a `PipelineConfig`
//! which downstream stages use without re-parsing flags.

use std::{path::PathBuf, time::Duration};

use anyhow::{Result, anyhow, bail};
use clap::Args;
use ml_core::LandmarkCategory;
use video_ingest::{CaptureSettings, SourceKind};

pub const DEFAULT_WIDTH: i32 = 620;
pub const DEFAULT_HEIGHT: i32 = 540;
pub const DEFAULT_CAPTURE_FPS: f64 = 30.0;
pub const DEFAULT_RECORDING_FPS: f64 = 20.0;
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;
pub const DEFAULT_TAKE_TIMEOUT_MS: u64 = 1_000;
pub const DEFAULT_DRAIN_GRACE_MS: u64 = 5_000;
pub const DEFAULT_CONFIDENCE: f32 = 0.7;
pub const DEFAULT_OUTPUT_DIR: &str = "motion_capture_output";

#[derive(Clone, Debug, PartialEq)]
/// Settings for one landmark model.
pub struct ModelOptions {
    /// TorchScript module path; `None` disables the category.
    pub model_path: Option<PathBuf>,
    /// Minimum detection confidence.
    pub confidence: f32,
    /// Upper bound on instances kept per frame.
    pub max_instances: usize,
}

impl ModelOptions {
    fn defaults(category: LandmarkCategory) -> Self {
        Self {
            model_path: None,
            confidence: DEFAULT_CONFIDENCE,
            max_instances: category.default_max_instances(),
        }
    }
}

#[derive(Clone, Debug, Default)]
/// Optional telemetry knobs for tracing and metrics.
pub struct TelemetryOptions {
    /// Write a Chrome trace JSON file capturing pipeline spans.
    pub chrome_trace_path: Option<PathBuf>,
    /// Install the Prometheus recorder and dump a snapshot at shutdown.
    pub enable_metrics: bool,
}

#[derive(Clone, Debug)]
/// Canonical configuration shared by every stage in the pipeline.
pub struct PipelineConfig {
    /// Camera index, device path, video file, stream URL or image directory.
    pub source_uri: String,
    /// How `source_uri` is opened.
    pub source_kind: SourceKind,
    /// Frame width for the whole session.
    pub width: i32,
    /// Frame height for the whole session.
    pub height: i32,
    /// Rate requested from the capture device.
    pub capture_fps: f64,
    /// Root of the output directory layout.
    pub output_dir: PathBuf,
    /// Capacity of the landmark persistence queue.
    pub queue_capacity: usize,
    /// How long the persistence worker blocks on an empty queue before
    /// re-checking the run flag.
    pub take_timeout: Duration,
    /// Time the persistence worker is given to drain at shutdown.
    pub drain_grace: Duration,
    /// Wall-clock budget of one capture iteration.
    pub frame_budget: Duration,
    /// Sleep out the rest of the budget when an iteration finishes early.
    pub pace: bool,
    /// Frame rate written into the recording.
    pub recording_fps: f64,
    /// FOURCC of the recording codec.
    pub recording_codec: [char; 4],
    /// Body pose model.
    pub body: ModelOptions,
    /// Hand model.
    pub hand: ModelOptions,
    /// Face mesh model.
    pub face: ModelOptions,
    /// Force CPU inference.
    pub use_cpu: bool,
    /// Skip the preview window.
    pub headless: bool,
    /// Emit per-frame detection logging.
    pub verbose: bool,
    /// Telemetry and instrumentation options.
    pub telemetry: TelemetryOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let source_uri = "0".to_string();
        Self {
            source_kind: SourceKind::from_uri(&source_uri),
            source_uri,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            capture_fps: DEFAULT_CAPTURE_FPS,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            take_timeout: Duration::from_millis(DEFAULT_TAKE_TIMEOUT_MS),
            drain_grace: Duration::from_millis(DEFAULT_DRAIN_GRACE_MS),
            frame_budget: Self::budget_for(DEFAULT_CAPTURE_FPS),
            pace: false,
            recording_fps: DEFAULT_RECORDING_FPS,
            recording_codec: ['X', 'V', 'I', 'D'],
            body: ModelOptions::defaults(LandmarkCategory::Body),
            hand: ModelOptions::defaults(LandmarkCategory::Hand),
            face: ModelOptions::defaults(LandmarkCategory::Face),
            use_cpu: false,
            headless: false,
            verbose: false,
            telemetry: TelemetryOptions::default(),
        }
    }
}

impl PipelineConfig {
    pub fn model(&self, category: LandmarkCategory) -> &ModelOptions {
        match category {
            LandmarkCategory::Body => &self.body,
            LandmarkCategory::Hand => &self.hand,
            LandmarkCategory::Face => &self.face,
        }
    }

    pub fn capture_settings(&self) -> CaptureSettings {
        CaptureSettings {
            uri: self.source_uri.clone(),
            width: self.width,
            height: self.height,
            fps: self.capture_fps,
        }
    }

    /// One frame interval at `fps`.
    fn budget_for(fps: f64) -> Duration {
        Duration::from_secs_f64(1.0 / fps.max(1.0))
    }
}

/// CLI arguments accepted by the `capture` subcommand.
#[derive(Debug, Default, Args)]
pub struct CaptureCliArgs {
    /// Camera index, device path, video file, stream URL or image directory.
    #[arg(value_name = "SOURCE")]
    pub source: Option<String>,

    /// Source flag (overrides positional).
    #[arg(long = "source", value_name = "URI")]
    pub source_flag: Option<String>,
    /// Frame width in pixels.
    #[arg(long, value_name = "PX")]
    pub width: Option<i32>,
    /// Frame height in pixels.
    #[arg(long, value_name = "PX")]
    pub height: Option<i32>,
    /// Frame rate requested from the camera.
    #[arg(long, value_name = "FPS")]
    pub fps: Option<f64>,
    /// Output root directory.
    #[arg(long = "output", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,
    /// Landmark queue capacity.
    #[arg(long = "queue-capacity", value_name = "N")]
    pub queue_capacity: Option<usize>,
    /// Persistence worker poll timeout in milliseconds.
    #[arg(long = "take-timeout-ms", value_name = "MS")]
    pub take_timeout_ms: Option<u64>,
    /// Shutdown drain grace period in milliseconds.
    #[arg(long = "drain-grace-ms", value_name = "MS")]
    pub drain_grace_ms: Option<u64>,
    /// Per-iteration budget in milliseconds (defaults to one frame interval).
    #[arg(long = "frame-budget-ms", value_name = "MS")]
    pub frame_budget_ms: Option<u64>,
    /// Sleep out the rest of the frame budget (useful for image replays).
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub pace: bool,
    /// Frame rate written into the recording.
    #[arg(long = "recording-fps", value_name = "FPS")]
    pub recording_fps: Option<f64>,
    /// Recording FOURCC, e.g. XVID or MJPG.
    #[arg(long, value_name = "FOURCC")]
    pub codec: Option<String>,
    /// Body pose TorchScript model.
    #[arg(long = "pose-model", value_name = "PATH")]
    pub pose_model: Option<PathBuf>,
    /// Hand TorchScript model.
    #[arg(long = "hand-model", value_name = "PATH")]
    pub hand_model: Option<PathBuf>,
    /// Face mesh TorchScript model.
    #[arg(long = "face-model", value_name = "PATH")]
    pub face_model: Option<PathBuf>,
    /// Body pose confidence threshold (0-1).
    #[arg(long = "pose-confidence", value_name = "P")]
    pub pose_confidence: Option<f32>,
    /// Hand confidence threshold (0-1).
    #[arg(long = "hand-confidence", value_name = "P")]
    pub hand_confidence: Option<f32>,
    /// Face confidence threshold (0-1).
    #[arg(long = "face-confidence", value_name = "P")]
    pub face_confidence: Option<f32>,
    /// Maximum hands kept per frame.
    #[arg(long = "max-hands", value_name = "N")]
    pub max_hands: Option<usize>,
    /// Maximum faces kept per frame.
    #[arg(long = "max-faces", value_name = "N")]
    pub max_faces: Option<usize>,
    /// Force CPU inference.
    #[arg(long = "cpu", action = clap::ArgAction::SetTrue)]
    pub use_cpu: bool,
    /// Run without the preview window.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub headless: bool,
    /// Enable verbose logging (queue drops, detections).
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub verbose: bool,
    /// Emit Chrome trace JSON for post-mortem analysis.
    #[arg(long = "chrome-trace", value_name = "PATH")]
    pub chrome_trace: Option<PathBuf>,
    /// Record Prometheus metrics and write a snapshot at shutdown.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub metrics: bool,
}

impl TryFrom<CaptureCliArgs> for PipelineConfig {
    type Error = anyhow::Error;

    fn try_from(args: CaptureCliArgs) -> Result<Self> {
        let defaults = PipelineConfig::default();

        let source_uri = args
            .source_flag
            .or(args.source)
            .unwrap_or_else(|| defaults.source_uri.clone());
        let width = args.width.unwrap_or(defaults.width);
        let height = args.height.unwrap_or(defaults.height);
        if width <= 0 || height <= 0 {
            bail!("Frame width and height must be positive integers");
        }

        let capture_fps = args.fps.unwrap_or(defaults.capture_fps);
        if !(capture_fps > 0.0) {
            bail!("--fps must be positive");
        }
        let recording_fps = args.recording_fps.unwrap_or(defaults.recording_fps);
        if !(recording_fps > 0.0) {
            bail!("--recording-fps must be positive");
        }

        let queue_capacity = args.queue_capacity.unwrap_or(defaults.queue_capacity);
        if queue_capacity == 0 {
            bail!("--queue-capacity must be at least 1");
        }

        let take_timeout = args
            .take_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.take_timeout);
        if take_timeout.is_zero() {
            bail!("--take-timeout-ms must be at least 1");
        }
        let drain_grace = args
            .drain_grace_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.drain_grace);
        let frame_budget = args
            .frame_budget_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| PipelineConfig::budget_for(capture_fps));

        let recording_codec = match args.codec {
            Some(code) => parse_fourcc(&code)?,
            None => defaults.recording_codec,
        };

        let body = model_options(
            LandmarkCategory::Body,
            args.pose_model,
            args.pose_confidence,
            None,
        )?;
        let hand = model_options(
            LandmarkCategory::Hand,
            args.hand_model,
            args.hand_confidence,
            args.max_hands,
        )?;
        let face = model_options(
            LandmarkCategory::Face,
            args.face_model,
            args.face_confidence,
            args.max_faces,
        )?;

        let telemetry = TelemetryOptions {
            chrome_trace_path: args.chrome_trace,
            enable_metrics: args.metrics,
        };

        Ok(Self {
            source_kind: SourceKind::from_uri(&source_uri),
            source_uri,
            width,
            height,
            capture_fps,
            output_dir: args.output_dir.unwrap_or(defaults.output_dir),
            queue_capacity,
            take_timeout,
            drain_grace,
            frame_budget,
            pace: args.pace,
            recording_fps,
            recording_codec,
            body,
            hand,
            face,
            use_cpu: args.use_cpu,
            headless: args.headless,
            verbose: args.verbose,
            telemetry,
        })
    }
}

fn model_options(
    category: LandmarkCategory,
    model_path: Option<PathBuf>,
    confidence: Option<f32>,
    max_instances: Option<usize>,
) -> Result<ModelOptions> {
    let defaults = ModelOptions::defaults(category);
    let confidence = confidence.unwrap_or(defaults.confidence);
    if !(0.0..=1.0).contains(&confidence) {
        bail!("{category} confidence must be between 0 and 1, got {confidence}");
    }
    let max_instances = max_instances.unwrap_or(defaults.max_instances);
    if max_instances == 0 {
        bail!("{category} max instances must be at least 1");
    }
    Ok(ModelOptions {
        model_path,
        confidence,
        max_instances,
    })
}

fn parse_fourcc(code: &str) -> Result<[char; 4]> {
    let chars: Vec<char> = code.chars().collect();
    <[char; 4]>::try_from(chars.as_slice())
        .map_err(|_| anyhow!("--codec must be exactly four characters, got {code:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_the_capture_rig() {
        let config = PipelineConfig::try_from(CaptureCliArgs::default()).unwrap();
        assert_eq!(config.source_uri, "0");
        assert_eq!((config.width, config.height), (620, 540));
        assert_eq!(config.queue_capacity, 100);
        assert_eq!(config.hand.max_instances, 2);
        assert_eq!(config.face.max_instances, 1);
        assert_eq!(config.recording_codec, ['X', 'V', 'I', 'D']);
        assert_eq!(config.output_dir, PathBuf::from("motion_capture_output"));
        assert_eq!(config.frame_budget, Duration::from_secs_f64(1.0 / 30.0));
    }

    #[test]
    fn source_flag_overrides_positional() {
        let args = CaptureCliArgs {
            source: Some("1".into()),
            source_flag: Some("rtsp://camera/stream".into()),
            ..Default::default()
        };
        let config = PipelineConfig::try_from(args).unwrap();
        assert_eq!(config.source_uri, "rtsp://camera/stream");
        assert_eq!(config.source_kind, SourceKind::Device);
    }

    #[test]
    fn rejects_zero_capacity_and_bad_thresholds() {
        let zero = CaptureCliArgs {
            queue_capacity: Some(0),
            ..Default::default()
        };
        assert!(PipelineConfig::try_from(zero).is_err());

        let confidence = CaptureCliArgs {
            hand_confidence: Some(1.5),
            ..Default::default()
        };
        assert!(PipelineConfig::try_from(confidence).is_err());

        let codec = CaptureCliArgs {
            codec: Some("H264X".into()),
            ..Default::default()
        };
        assert!(PipelineConfig::try_from(codec).is_err());
    }

    #[test]
    fn frame_budget_tracks_fps_unless_overridden() {
        let args = CaptureCliArgs {
            fps: Some(10.0),
            ..Default::default()
        };
        let config = PipelineConfig::try_from(args).unwrap();
        assert_eq!(config.frame_budget, Duration::from_millis(100));

        let args = CaptureCliArgs {
            frame_budget_ms: Some(5),
            ..Default::default()
        };
        let config = PipelineConfig::try_from(args).unwrap();
        assert_eq!(config.frame_budget, Duration::from_millis(5));
    }
}
