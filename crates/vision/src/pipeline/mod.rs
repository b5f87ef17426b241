//! Capture pipeline: capture thread, bounded landmark queue and the
//! persistence worker.
//!
//! `run` is the entry point used by the binary. It installs the Ctrl+C
//! handler and telemetry, builds the landmark sources from the config and
//! drives a `CaptureLoop` until the source ends or a stop is requested.

pub mod capture;
pub mod config;
pub mod error;
pub mod persistence;
pub mod queue;
pub mod session;
pub mod sources;
pub(crate) mod telemetry;

use std::sync::{Mutex, Once, PoisonError};

use tracing::warn;

pub use capture::{Backends, CaptureLoop, LoopState, StepOutcome};
pub use config::{CaptureCliArgs, ModelOptions, PipelineConfig, TelemetryOptions};
pub use error::{EstimationError, PersistError, PipelineError};
pub use persistence::{
    CsvSink, LandmarkSink, PersistenceHandle, VisualizationSink, WorkerReport, WorkerSettings,
    spawn_persistence_worker,
};
pub use queue::{QueueConsumer, QueueItem, QueueProducer, bounded};
pub use session::{OutputLayout, RunFlag, SessionSummary};
pub use sources::{DisabledSource, FrameLandmarks, LandmarkSource, SourceSet};

#[cfg(feature = "with-tch")]
pub use sources::TorchLandmarkSource;

/// Flag of the session that Ctrl+C stops. Each `run` replaces it.
static INTERRUPT_TARGET: Mutex<Option<RunFlag>> = Mutex::new(None);

/// Route Ctrl+C to `flag`, installing the process handler on first use.
fn set_interrupt_target(flag: &RunFlag) {
    static CTRL_HANDLER: Once = Once::new();

    *INTERRUPT_TARGET.lock().unwrap_or_else(PoisonError::into_inner) = Some(flag.clone());
    CTRL_HANDLER.call_once(|| {
        if let Err(err) = ctrlc::set_handler(interrupt_current_run) {
            warn!("Failed to install Ctrl+C handler: {err}");
        }
    });
}

fn interrupt_current_run() {
    let target = INTERRUPT_TARGET.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(flag) = target.as_ref() {
        flag.request_stop();
    }
}

/// Run a capture session with the default backends until the source ends,
/// the preview window asks to quit, or Ctrl+C is pressed.
pub fn run(config: PipelineConfig) -> Result<SessionSummary, PipelineError> {
    let run_flag = RunFlag::new();
    set_interrupt_target(&run_flag);

    let _telemetry_guard = telemetry::enter_runtime(&config.telemetry);
    if config.telemetry.enable_metrics {
        let _ = telemetry::init_metrics_recorder();
    }

    let pipeline_span = tracing::info_span!(
        "pipeline",
        source = %config.source_uri,
        width = config.width,
        height = config.height,
        queue_capacity = config.queue_capacity,
        headless = config.headless
    );
    let _pipeline_guard = pipeline_span.enter();

    let sources = SourceSet::from_config(&config)?;
    CaptureLoop::new(config, sources, run_flag).run()
}
