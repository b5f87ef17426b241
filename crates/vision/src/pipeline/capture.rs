//! The capture loop: one frame in, landmarks out to the queue, annotated
//! frame out to the recording and the preview window.

use std::{
    thread,
    time::{Duration, Instant},
};

use chrono::Local;
use ml_core::{ActionLabel, classify};
use tracing::{debug, info, warn};
use video_ingest::{
    CaptureDevice, CaptureError, CaptureSettings, DisplayEvent, FrameDisplay, RecorderError,
    RecorderSettings, RecordingSink,
};

use crate::{
    annotation::FrameAnnotator,
    pipeline::{
        config::PipelineConfig,
        error::PipelineError,
        persistence::{
            CsvSink, LandmarkSink, PersistenceHandle, VisualizationSink, WorkerSettings,
            spawn_persistence_worker,
        },
        queue::{self, QueueItem, QueueProducer},
        session::{OutputLayout, RunFlag, SessionSummary},
        sources::SourceSet,
        telemetry,
    },
};

pub const WINDOW_TITLE: &str = "Motion Capture";

type DeviceOpener =
    Box<dyn FnOnce(&CaptureSettings) -> Result<Box<dyn CaptureDevice>, CaptureError>>;
type RecorderOpener =
    Box<dyn FnOnce(&RecorderSettings) -> Result<Box<dyn RecordingSink>, RecorderError>>;
type DisplayOpener = Box<dyn FnOnce(&str, bool) -> Box<dyn FrameDisplay>>;
type SinkFactory = Box<dyn FnOnce(&OutputLayout) -> Vec<Box<dyn LandmarkSink>>>;

/// How the loop opens its device, recording, window and persistence sinks.
///
/// Defaults to the `video_ingest` backends and the CSV plus chart sinks.
pub struct Backends {
    device: DeviceOpener,
    recorder: RecorderOpener,
    display: DisplayOpener,
    sinks: SinkFactory,
}

impl Default for Backends {
    fn default() -> Self {
        Self {
            device: Box::new(video_ingest::open_device),
            recorder: Box::new(video_ingest::open_recorder),
            display: Box::new(video_ingest::open_display),
            sinks: Box::new(default_sinks),
        }
    }
}

impl Backends {
    pub fn with_device(self, device: Box<dyn CaptureDevice>) -> Self {
        self.with_device_opener(move |_: &CaptureSettings| Ok(device))
    }

    pub fn with_device_opener<F>(mut self, open: F) -> Self
    where
        F: FnOnce(&CaptureSettings) -> Result<Box<dyn CaptureDevice>, CaptureError> + 'static,
    {
        self.device = Box::new(open);
        self
    }

    pub fn with_recorder(mut self, recorder: Box<dyn RecordingSink>) -> Self {
        self.recorder = Box::new(
            move |_: &RecorderSettings| -> Result<Box<dyn RecordingSink>, RecorderError> {
                Ok(recorder)
            },
        );
        self
    }

    pub fn with_display(mut self, display: Box<dyn FrameDisplay>) -> Self {
        self.display = Box::new(move |_: &str, _: bool| display);
        self
    }

    pub fn with_sinks<F>(mut self, sinks: F) -> Self
    where
        F: FnOnce(&OutputLayout) -> Vec<Box<dyn LandmarkSink>> + 'static,
    {
        self.sinks = Box::new(sinks);
        self
    }
}

fn default_sinks(layout: &OutputLayout) -> Vec<Box<dyn LandmarkSink>> {
    vec![
        Box::new(CsvSink::new(layout.csv_dir())),
        Box::new(VisualizationSink::new(layout.visualizations_dir())),
    ]
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Init,
    Running,
    Stopping,
    Stopped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    Stop,
}

#[derive(Default)]
struct LoopStats {
    frames: u64,
    queue_drops: u64,
    overruns: u64,
    started: Option<Instant>,
    last_frame: Option<Instant>,
    smoothed_fps: f64,
}

pub struct CaptureLoop {
    state: LoopState,
    config: PipelineConfig,
    run: RunFlag,
    sources: SourceSet,
    annotator: FrameAnnotator,
    backends: Option<Backends>,
    device: Option<Box<dyn CaptureDevice>>,
    recorder: Option<Box<dyn RecordingSink>>,
    display: Option<Box<dyn FrameDisplay>>,
    producer: Option<QueueProducer<QueueItem>>,
    worker: Option<PersistenceHandle>,
    layout: Option<OutputLayout>,
    stats: LoopStats,
    last_action: Option<ActionLabel>,
    summary: Option<SessionSummary>,
}

impl CaptureLoop {
    pub fn new(config: PipelineConfig, sources: SourceSet, run: RunFlag) -> Self {
        Self::with_backends(config, sources, run, Backends::default())
    }

    pub fn with_backends(
        config: PipelineConfig,
        sources: SourceSet,
        run: RunFlag,
        backends: Backends,
    ) -> Self {
        Self {
            state: LoopState::Init,
            config,
            run,
            sources,
            annotator: FrameAnnotator::new(),
            backends: Some(backends),
            device: None,
            recorder: None,
            display: None,
            producer: None,
            worker: None,
            layout: None,
            stats: LoopStats::default(),
            last_action: None,
            summary: None,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn run_flag(&self) -> &RunFlag {
        &self.run
    }

    pub fn layout(&self) -> Option<&OutputLayout> {
        self.layout.as_ref()
    }

    /// INIT -> RUNNING. Only a device that cannot be opened (or an output
    /// tree that cannot be created) is fatal.
    pub fn start(&mut self) -> Result<(), PipelineError> {
        if self.state != LoopState::Init {
            return Err(PipelineError::AlreadyStarted);
        }
        let Some(backends) = self.backends.take() else {
            return Err(PipelineError::AlreadyStarted);
        };

        match self.open_session(backends) {
            Ok(()) => {
                self.state = LoopState::Running;
                self.stats.started = Some(Instant::now());
                info!(
                    "capturing from {} at {}x{}",
                    self.config.source_uri, self.config.width, self.config.height
                );
                Ok(())
            }
            Err(err) => {
                self.release_resources();
                self.state = LoopState::Stopped;
                self.summary = Some(SessionSummary::default());
                Err(err)
            }
        }
    }

    fn open_session(&mut self, backends: Backends) -> Result<(), PipelineError> {
        let device = (backends.device)(&self.config.capture_settings())
            .map_err(PipelineError::DeviceUnavailable)?;
        self.device = Some(device);

        let layout = OutputLayout::create(&self.config.output_dir)?;

        let recorder_settings = RecorderSettings {
            path: layout.recording_path(Local::now()),
            codec: self.config.recording_codec,
            fps: self.config.recording_fps,
            width: self.config.width,
            height: self.config.height,
        };
        match (backends.recorder)(&recorder_settings) {
            Ok(recorder) => {
                debug!("recording to {}", recorder_settings.path.display());
                self.recorder = Some(recorder);
            }
            Err(err) => warn!("recording disabled: {err}"),
        }

        self.display = Some((backends.display)(WINDOW_TITLE, self.config.headless));

        let (producer, consumer) = queue::bounded(self.config.queue_capacity);
        let worker = spawn_persistence_worker(
            consumer,
            (backends.sinks)(&layout),
            self.run.clone(),
            WorkerSettings {
                take_timeout: self.config.take_timeout,
                drain_grace: self.config.drain_grace,
            },
        )?;
        self.producer = Some(producer);
        self.worker = Some(worker);
        self.layout = Some(layout);
        Ok(())
    }

    /// Start if needed, step until told to stop, then stop.
    pub fn run(&mut self) -> Result<SessionSummary, PipelineError> {
        if self.state == LoopState::Init {
            self.start()?;
        }
        while self.state == LoopState::Running {
            if self.step()? == StepOutcome::Stop {
                break;
            }
        }
        Ok(self.stop())
    }

    /// One capture iteration.
    pub fn step(&mut self) -> Result<StepOutcome, PipelineError> {
        if self.state != LoopState::Running {
            return Err(PipelineError::NotRunning);
        }
        if !self.run.is_running() {
            return Ok(StepOutcome::Stop);
        }

        let iteration_start = Instant::now();
        let frame_number = self.stats.frames + 1;

        let Some(device) = self.device.as_mut() else {
            return Ok(StepOutcome::Stop);
        };
        let frame = match tracing::info_span!("capture.read").in_scope(|| device.read()) {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!("capture source exhausted after {} frame(s)", self.stats.frames);
                return Ok(StepOutcome::Stop);
            }
            Err(err) => {
                warn!("frame read failed, stopping: {err}");
                return Ok(StepOutcome::Stop);
            }
        };

        let frame_span = tracing::info_span!(
            "frame",
            frame = frame_number,
            width = frame.width,
            height = frame.height,
            timestamp = frame.timestamp_ms
        );
        let _frame_guard = frame_span.enter();
        self.stats.frames = frame_number;
        let captured_at = Local::now();

        let landmarks = self.sources.process(&frame, frame_number);
        let action = landmarks.body.first().and_then(classify);
        if action != self.last_action {
            if let Some(label) = action {
                debug!("frame #{frame_number}: action {label}");
            }
            self.last_action = action;
        }

        let annotated = tracing::info_span!("annotate")
            .in_scope(|| self.annotator.annotate(frame, &landmarks.batches(), action));

        if let Some(recorder) = self.recorder.as_mut() {
            if let Err(err) = recorder.write(&annotated) {
                metrics::counter!("pipeline_persist_failures_total", "sink" => "recording")
                    .increment(1);
                warn!("failed to record frame #{frame_number}: {err}");
            }
        }

        if let Some(producer) = self.producer.as_ref() {
            for batch in landmarks.batches() {
                if batch.is_empty() {
                    continue;
                }
                if !producer.offer(QueueItem::from_batch(batch, frame_number, captured_at)) {
                    self.stats.queue_drops += 1;
                    if self.config.verbose {
                        debug!(
                            "dropped {} landmarks of frame #{frame_number} (drops: {})",
                            batch.category(),
                            self.stats.queue_drops
                        );
                    }
                }
            }
        }

        let mut outcome = StepOutcome::Continue;
        if let Some(display) = self.display.as_mut() {
            if display.show(&annotated) == DisplayEvent::Quit {
                info!("quit requested from preview window");
                self.run.request_stop();
                outcome = StepOutcome::Stop;
            }
        }

        self.record_fps();
        self.enforce_budget(iteration_start, frame_number);
        Ok(outcome)
    }

    fn record_fps(&mut self) {
        let now = Instant::now();
        if let Some(last) = self.stats.last_frame.replace(now) {
            let elapsed = now.duration_since(last).as_secs_f64();
            if elapsed > 0.0 {
                let instant = 1.0 / elapsed;
                self.stats.smoothed_fps = if self.stats.smoothed_fps == 0.0 {
                    instant
                } else {
                    0.9 * self.stats.smoothed_fps + 0.1 * instant
                };
                metrics::gauge!("pipeline_fps").set(self.stats.smoothed_fps);
            }
        }
    }

    fn enforce_budget(&mut self, iteration_start: Instant, frame_number: u64) {
        let elapsed = iteration_start.elapsed();
        metrics::histogram!("pipeline_stage_latency_seconds", "stage" => "frame")
            .record(elapsed.as_secs_f64());
        let budget = self.config.frame_budget;
        if elapsed > budget {
            self.stats.overruns += 1;
            metrics::counter!("pipeline_frame_overruns_total").increment(1);
            if self.config.verbose {
                debug!(
                    "frame #{frame_number} took {:.1} ms (budget {:.1} ms)",
                    elapsed.as_secs_f64() * 1e3,
                    budget.as_secs_f64() * 1e3
                );
            }
        } else if self.config.pace {
            thread::sleep(budget - elapsed);
        }
    }

    /// RUNNING -> STOPPED. Safe to call any number of times; every call
    /// returns the same summary.
    pub fn stop(&mut self) -> SessionSummary {
        match self.state {
            LoopState::Stopped | LoopState::Stopping => {
                return self.summary.clone().unwrap_or_default();
            }
            LoopState::Init => {
                self.state = LoopState::Stopped;
                let summary = SessionSummary::default();
                self.summary = Some(summary.clone());
                return summary;
            }
            LoopState::Running => {}
        }

        self.state = LoopState::Stopping;
        info!("stopping capture");
        self.run.request_stop();
        if let Some(mut device) = self.device.take() {
            device.release();
        }

        let pending = self.producer.as_ref().map_or(0, |p| p.len() as u64);
        drop(self.producer.take());
        let grace = self.config.drain_grace + self.config.take_timeout;
        let report = self.worker.take().and_then(|worker| worker.finish(grace));
        self.release_resources();

        let elapsed = self
            .stats
            .started
            .map_or(Duration::ZERO, |started| started.elapsed())
            .as_secs_f64();
        let average_fps = if elapsed > 0.0 {
            self.stats.frames as f64 / elapsed
        } else {
            0.0
        };
        let mut summary = SessionSummary {
            frames: self.stats.frames,
            elapsed_secs: elapsed,
            average_fps,
            queue_drops: self.stats.queue_drops,
            frame_overruns: self.stats.overruns,
            ..SessionSummary::default()
        };
        match report {
            Some(report) => {
                summary.persisted = report.persisted;
                summary.persist_failures = report.failed;
                summary.abandoned = report.abandoned;
            }
            None => summary.abandoned = pending,
        }

        info!(
            "session: {} frame(s) in {:.1}s ({:.1} fps), {} persisted, {} failed, {} dropped, {} abandoned, {} overrun(s)",
            summary.frames,
            summary.elapsed_secs,
            summary.average_fps,
            summary.persisted,
            summary.persist_failures,
            summary.queue_drops,
            summary.abandoned,
            summary.frame_overruns
        );
        self.write_reports(&summary);

        self.state = LoopState::Stopped;
        self.summary = Some(summary.clone());
        summary
    }

    fn release_resources(&mut self) {
        if let Some(mut device) = self.device.take() {
            device.release();
        }
        drop(self.producer.take());
        if let Some(mut recorder) = self.recorder.take() {
            recorder.release();
        }
        if let Some(mut display) = self.display.take() {
            display.close();
        }
    }

    fn write_reports(&self, summary: &SessionSummary) {
        let Some(layout) = self.layout.as_ref() else {
            return;
        };
        let summary_path = layout.summary_path();
        if let Err(err) = summary.write_json(&summary_path) {
            warn!("failed to write {}: {err}", summary_path.display());
        }
        if self.config.telemetry.enable_metrics {
            let metrics_path = layout.metrics_path();
            match telemetry::write_metrics_snapshot(&metrics_path) {
                Ok(true) => debug!("metrics snapshot written to {}", metrics_path.display()),
                Ok(false) => debug!("metrics recorder not installed; no snapshot written"),
                Err(err) => warn!("failed to write {}: {err}", metrics_path.display()),
            }
        }
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        if self.state == LoopState::Running {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        cell::Cell,
        rc::Rc,
        sync::{
            Arc, Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use ml_core::{LandmarkCategory, LandmarkSet};
    use video_ingest::{Frame, HeadlessDisplay, ReplayDevice};

    use super::*;
    use crate::pipeline::{error::EstimationError, sources::LandmarkSource};

    fn config(root: &std::path::Path) -> PipelineConfig {
        PipelineConfig {
            output_dir: root.to_path_buf(),
            headless: true,
            take_timeout: Duration::from_millis(20),
            drain_grace: Duration::from_secs(2),
            frame_budget: Duration::from_secs(1),
            ..PipelineConfig::default()
        }
    }

    fn frames(n: usize) -> Box<dyn CaptureDevice> {
        Box::new(ReplayDevice::new((0..n).map(|_| Frame::blank(32, 24)).collect()))
    }

    struct NullRecorder {
        written: Arc<AtomicUsize>,
        releases: Arc<AtomicUsize>,
    }

    impl RecordingSink for NullRecorder {
        fn write(&mut self, _frame: &Frame) -> Result<(), RecorderError> {
            self.written.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn release(&mut self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FailingRecorder;

    impl RecordingSink for FailingRecorder {
        fn write(&mut self, _frame: &Frame) -> Result<(), RecorderError> {
            Err(RecorderError::Released)
        }

        fn release(&mut self) {}
    }

    /// Raised right wrist: classifies as `wave`.
    struct WavingPose;

    impl LandmarkSource for WavingPose {
        fn category(&self) -> LandmarkCategory {
            LandmarkCategory::Body
        }

        fn process(&mut self, _frame: &Frame) -> Result<Vec<LandmarkSet>, EstimationError> {
            let mut rows = [[0.5, 0.5, 0.0]; 33];
            rows[12] = [0.4, 0.4, 0.0];
            rows[16] = [0.8, 0.2, 0.0];
            Ok(vec![LandmarkSet::from_rows(&rows)])
        }
    }

    struct BrokenModel;

    impl LandmarkSource for BrokenModel {
        fn category(&self) -> LandmarkCategory {
            LandmarkCategory::Hand
        }

        fn process(&mut self, _frame: &Frame) -> Result<Vec<LandmarkSet>, EstimationError> {
            Err(EstimationError::Other(anyhow::anyhow!("cuda out of memory")))
        }
    }

    struct QuitAfter(Rc<Cell<u32>>);

    impl FrameDisplay for QuitAfter {
        fn show(&mut self, _frame: &Frame) -> DisplayEvent {
            let left = self.0.get().saturating_sub(1);
            self.0.set(left);
            if left == 0 {
                DisplayEvent::Quit
            } else {
                DisplayEvent::Continue
            }
        }

        fn close(&mut self) {}
    }

    fn counting_recorder() -> (Box<dyn RecordingSink>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let written = Arc::new(AtomicUsize::new(0));
        let releases = Arc::new(AtomicUsize::new(0));
        let recorder = NullRecorder {
            written: written.clone(),
            releases: releases.clone(),
        };
        (Box::new(recorder), written, releases)
    }

    #[test]
    fn stop_is_idempotent_and_releases_once() {
        let tmp = tempfile::tempdir().unwrap();
        let (recorder, written, releases) = counting_recorder();
        let backends = Backends::default()
            .with_device(frames(2))
            .with_recorder(recorder)
            .with_display(Box::new(HeadlessDisplay));
        let mut capture = CaptureLoop::with_backends(
            config(tmp.path()),
            SourceSet::new(),
            RunFlag::new(),
            backends,
        );

        let first = capture.run().unwrap();
        let second = capture.stop();
        assert_eq!(first, second);
        assert_eq!(first.frames, 2);
        assert_eq!(capture.state(), LoopState::Stopped);
        assert_eq!(written.load(Ordering::SeqCst), 2);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
        assert!(tmp.path().join("session_summary.json").is_file());
    }

    #[test]
    fn unavailable_device_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let backends = Backends::default().with_device_opener(|settings| {
            Err(CaptureError::Open {
                uri: settings.uri.clone(),
            })
        });
        let mut capture = CaptureLoop::with_backends(
            config(tmp.path()),
            SourceSet::new(),
            RunFlag::new(),
            backends,
        );

        assert!(matches!(capture.start(), Err(PipelineError::DeviceUnavailable(_))));
        assert_eq!(capture.state(), LoopState::Stopped);
        assert_eq!(capture.stop(), SessionSummary::default());
    }

    #[test]
    fn estimation_failure_counts_as_no_detection() {
        let tmp = tempfile::tempdir().unwrap();
        let sources = SourceSet::new()
            .with_source(Box::new(WavingPose), 1)
            .with_source(Box::new(BrokenModel), 2);
        let backends = Backends::default()
            .with_device(frames(3))
            .with_recorder(Box::new(FailingRecorder))
            .with_display(Box::new(HeadlessDisplay));
        let mut capture =
            CaptureLoop::with_backends(config(tmp.path()), sources, RunFlag::new(), backends);

        let summary = capture.run().unwrap();
        assert_eq!(summary.frames, 3);
        assert_eq!(summary.persisted, 3);
        assert_eq!(capture.last_action, Some(ActionLabel::Wave));

        let csvs: Vec<_> = std::fs::read_dir(tmp.path().join("csv_data"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(csvs.len(), 3);
        assert!(csvs.iter().all(|name| name.starts_with("pose_landmarks_")));
    }

    #[test]
    fn quit_key_stops_the_loop() {
        let tmp = tempfile::tempdir().unwrap();
        let backends = Backends::default()
            .with_device(frames(10))
            .with_recorder(counting_recorder().0)
            .with_display(Box::new(QuitAfter(Rc::new(Cell::new(2)))));
        let run = RunFlag::new();
        let mut capture =
            CaptureLoop::with_backends(config(tmp.path()), SourceSet::new(), run.clone(), backends);

        assert_eq!(capture.run().unwrap().frames, 2);
        assert!(!run.is_running());
    }

    #[test]
    fn cleared_run_flag_stops_before_reading() {
        let tmp = tempfile::tempdir().unwrap();
        let backends = Backends::default()
            .with_device(frames(5))
            .with_recorder(counting_recorder().0)
            .with_display(Box::new(HeadlessDisplay));
        let run = RunFlag::new();
        let mut capture =
            CaptureLoop::with_backends(config(tmp.path()), SourceSet::new(), run.clone(), backends);

        capture.start().unwrap();
        assert_eq!(capture.step().unwrap(), StepOutcome::Continue);
        run.request_stop();
        assert_eq!(capture.step().unwrap(), StepOutcome::Stop);
        assert_eq!(capture.stop().frames, 1);
        assert!(matches!(capture.step(), Err(PipelineError::NotRunning)));
        assert!(matches!(capture.start(), Err(PipelineError::AlreadyStarted)));
    }

    /// Yields `frames` blank frames, then fails every read.
    struct FailsAfter {
        frames: usize,
    }

    impl CaptureDevice for FailsAfter {
        fn read(&mut self) -> Result<Option<Frame>, CaptureError> {
            if self.frames == 0 {
                return Err(CaptureError::Other(anyhow::anyhow!("usb device disconnected")));
            }
            self.frames -= 1;
            Ok(Some(Frame::blank(32, 24)))
        }

        fn release(&mut self) {}
    }

    #[test]
    fn read_failure_ends_the_session_cleanly() {
        let tmp = tempfile::tempdir().unwrap();
        let backends = Backends::default()
            .with_device(Box::new(FailsAfter { frames: 3 }))
            .with_recorder(counting_recorder().0)
            .with_display(Box::new(HeadlessDisplay));
        let sources = SourceSet::new().with_source(Box::new(WavingPose), 1);
        let mut capture =
            CaptureLoop::with_backends(config(tmp.path()), sources, RunFlag::new(), backends);

        let summary = capture.run().unwrap();
        assert_eq!(summary.frames, 3);
        assert_eq!(summary.persisted, 3);
        assert_eq!(summary.persist_failures, 0);
        assert_eq!(capture.state(), LoopState::Stopped);
        assert!(tmp.path().join("session_summary.json").is_file());
    }

    #[test]
    fn full_queue_drops_are_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let gate = Arc::new(Mutex::new(()));
        let held = gate.lock().unwrap();
        let worker_gate = gate.clone();

        struct Gated(Arc<Mutex<()>>);
        impl LandmarkSink for Gated {
            fn name(&self) -> &'static str {
                "gated"
            }
            fn persist(
                &mut self,
                _item: &QueueItem,
            ) -> Result<std::path::PathBuf, crate::pipeline::error::PersistError> {
                let _open = self.0.lock().unwrap();
                Ok(std::path::PathBuf::from("gated"))
            }
        }

        let backends = Backends::default()
            .with_device(frames(6))
            .with_recorder(counting_recorder().0)
            .with_display(Box::new(HeadlessDisplay))
            .with_sinks(move |_| vec![Box::new(Gated(worker_gate)) as Box<dyn LandmarkSink>]);
        let cfg = PipelineConfig {
            queue_capacity: 2,
            ..config(tmp.path())
        };
        let sources = SourceSet::new().with_source(Box::new(WavingPose), 1);
        let mut capture = CaptureLoop::with_backends(cfg, sources, RunFlag::new(), backends);

        capture.start().unwrap();
        while capture.step().unwrap() == StepOutcome::Continue {}
        drop(held);
        let summary = capture.stop();

        // The worker may hold one item while blocked, so 6 frames leave at
        // least 3 drops with a capacity of 2.
        assert!(summary.queue_drops >= 3, "drops: {}", summary.queue_drops);
        assert_eq!(summary.persisted + summary.queue_drops, 6);
    }
}
