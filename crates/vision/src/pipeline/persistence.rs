//! Persistence worker: drains the landmark queue on its own thread and writes
//! one CSV file and one chart per item.

use std::{
    fs::{File, OpenOptions},
    io::{self, BufWriter},
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use image::ImageFormat;
use tracing::{debug, error, info, warn};

use crate::{
    pipeline::{
        error::{PersistError, PipelineError},
        queue::{QueueConsumer, QueueItem},
        session::RunFlag,
        telemetry,
    },
    plot::render_landmark_chart,
};

/// Timestamp embedded in every output file name.
pub const FILE_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%6f";
const MAX_NAME_SUFFIX: u32 = 9_999;

/// Writes one queue item somewhere durable.
pub trait LandmarkSink: Send {
    /// Short label used in logs and the `sink` metric label.
    fn name(&self) -> &'static str;

    /// Persist `item`, returning the file written.
    fn persist(&mut self, item: &QueueItem) -> Result<PathBuf, PersistError>;
}

/// Create `<dir>/<stem>.<ext>`, or `<stem>_<n>.<ext>` if that name is taken.
/// Never opens an existing file.
pub(crate) fn create_unique(
    dir: &Path,
    stem: &str,
    ext: &str,
) -> Result<(File, PathBuf), PersistError> {
    for suffix in 0..=MAX_NAME_SUFFIX {
        let name = if suffix == 0 {
            format!("{stem}.{ext}")
        } else {
            format!("{stem}_{suffix}.{ext}")
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((file, path)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(source) => return Err(PersistError::Io { path, source }),
        }
    }
    Err(PersistError::NameExhausted {
        stem: stem.to_string(),
    })
}

fn file_stem(item: &QueueItem, kind: &str) -> String {
    format!(
        "{}_{kind}_{}",
        item.category.label(),
        item.captured_at.format(FILE_TIMESTAMP_FORMAT)
    )
}

/// `csv_data/<category>_landmarks_<timestamp>.csv` with columns
/// `Landmark_Index,X,Y,Z`.
pub struct CsvSink {
    dir: PathBuf,
}

impl CsvSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl LandmarkSink for CsvSink {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn persist(&mut self, item: &QueueItem) -> Result<PathBuf, PersistError> {
        let (file, path) = create_unique(&self.dir, &file_stem(item, "landmarks"), "csv")?;
        let csv_err = |source| PersistError::Csv {
            path: path.clone(),
            source,
        };

        let mut writer = csv::Writer::from_writer(file);
        writer
            .write_record(["Landmark_Index", "X", "Y", "Z"])
            .map_err(csv_err)?;
        for set in &item.sets {
            for (index, [x, y, z]) in set.iter().enumerate() {
                writer
                    .serialize((index, x, y, z))
                    .map_err(csv_err)?;
            }
        }
        writer.flush().map_err(|source| PersistError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

/// `visualizations/<category>_visualization_<timestamp>.png`
pub struct VisualizationSink {
    dir: PathBuf,
}

impl VisualizationSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl LandmarkSink for VisualizationSink {
    fn name(&self) -> &'static str {
        "visualization"
    }

    fn persist(&mut self, item: &QueueItem) -> Result<PathBuf, PersistError> {
        let chart = render_landmark_chart(&item.sets, item.category);
        let (file, path) = create_unique(&self.dir, &file_stem(item, "visualization"), "png")?;
        let mut writer = BufWriter::new(file);
        chart
            .write_to(&mut writer, ImageFormat::Png)
            .map_err(|source| PersistError::Image {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct WorkerSettings {
    /// Longest single wait on an empty queue.
    pub take_timeout: Duration,
    /// Time allowed to drain leftovers once the run flag drops.
    pub drain_grace: Duration,
}

/// What the worker got through before it exited.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkerReport {
    /// Items every sink accepted.
    pub persisted: u64,
    /// Items at least one sink rejected.
    pub failed: u64,
    /// Items left in the queue when the drain grace ran out.
    pub abandoned: u64,
}

/// Join handle for the persistence thread.
pub struct PersistenceHandle {
    join: Option<thread::JoinHandle<WorkerReport>>,
}

impl PersistenceHandle {
    /// Wait up to `grace` for the worker to exit.
    ///
    /// Returns `None` and detaches the thread if it is still running
    /// afterwards; whatever it had not written is lost.
    pub fn finish(mut self, grace: Duration) -> Option<WorkerReport> {
        let handle = self.join.take()?;
        let deadline = Instant::now() + grace;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                error!(
                    "persistence worker still busy after {:.1}s; detaching, unsaved landmarks are lost",
                    grace.as_secs_f64()
                );
                return None;
            }
            thread::sleep(Duration::from_millis(10));
        }
        match handle.join() {
            Ok(report) => Some(report),
            Err(_) => {
                error!("persistence worker panicked");
                None
            }
        }
    }
}

/// Spawn the worker. It runs until `run` is cleared (or every producer is
/// gone) and then drains what is left within `settings.drain_grace`.
pub fn spawn_persistence_worker(
    consumer: QueueConsumer<QueueItem>,
    sinks: Vec<Box<dyn LandmarkSink>>,
    run: RunFlag,
    settings: WorkerSettings,
) -> Result<PersistenceHandle, PipelineError> {
    let join = telemetry::spawn_thread("landmark-persistence", move || {
        let worker_span = tracing::info_span!(
            "persistence.worker",
            capacity = consumer.capacity(),
            sinks = sinks.len()
        );
        let _worker_guard = worker_span.enter();
        PersistenceWorker {
            consumer,
            sinks,
            report: WorkerReport::default(),
        }
        .run(&run, settings)
    })
    .map_err(|source| PipelineError::Spawn {
        name: "persistence",
        source,
    })?;
    Ok(PersistenceHandle { join: Some(join) })
}

struct PersistenceWorker {
    consumer: QueueConsumer<QueueItem>,
    sinks: Vec<Box<dyn LandmarkSink>>,
    report: WorkerReport,
}

impl PersistenceWorker {
    fn run(mut self, run: &RunFlag, settings: WorkerSettings) -> WorkerReport {
        while run.is_running() {
            match self.consumer.take(settings.take_timeout) {
                Some(item) => self.persist(item),
                None if self.consumer.is_closed() => break,
                None => {}
            }
        }

        self.drain(settings.drain_grace);
        info!(
            "persistence worker stopped: {} persisted, {} failed, {} abandoned",
            self.report.persisted, self.report.failed, self.report.abandoned
        );
        self.report
    }

    fn drain(&mut self, grace: Duration) {
        let pending = self.consumer.len();
        if pending > 0 {
            debug!("draining {pending} queued item(s)");
        }
        let deadline = Instant::now() + grace;
        loop {
            if Instant::now() >= deadline {
                let left = self.consumer.len() as u64;
                if left > 0 {
                    self.report.abandoned = left;
                    warn!(
                        "drain grace of {:.1}s elapsed with {left} item(s) unsaved; landmarks lost",
                        grace.as_secs_f64()
                    );
                }
                return;
            }
            match self.consumer.try_take() {
                Some(item) => self.persist(item),
                None => return,
            }
        }
    }

    fn persist(&mut self, item: QueueItem) {
        let started = Instant::now();
        let _span = tracing::info_span!(
            "persistence.item",
            category = item.category.label(),
            frame = item.frame_number,
            sets = item.sets.len()
        )
        .entered();
        metrics::gauge!("pipeline_queue_depth").set(self.consumer.len() as f64);

        let mut ok = true;
        for sink in &mut self.sinks {
            match sink.persist(&item) {
                Ok(path) => debug!("{} wrote {}", sink.name(), path.display()),
                Err(err) => {
                    ok = false;
                    metrics::counter!("pipeline_persist_failures_total", "sink" => sink.name())
                        .increment(1);
                    error!(
                        "{} sink failed for {} landmarks of frame #{}: {err}",
                        sink.name(),
                        item.category,
                        item.frame_number
                    );
                }
            }
        }

        if ok {
            self.report.persisted += 1;
        } else {
            self.report.failed += 1;
        }
        metrics::histogram!("pipeline_stage_latency_seconds", "stage" => "persist")
            .record(started.elapsed().as_secs_f64());
    }
}
