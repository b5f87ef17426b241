use std::{io, path::PathBuf};

use ml_core::LandmarkCategory;
use thiserror::Error;
use video_ingest::{CaptureError, RecorderError};

/// Fatal failures of the capture pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("capture device unavailable")]
    DeviceUnavailable(#[source] CaptureError),
    #[error("failed to prepare output directory {path:?}")]
    OutputLayout {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to load {category} landmark model: {message}")]
    ModelLoad {
        category: LandmarkCategory,
        message: String,
    },
    #[error("failed to open recording sink")]
    Recorder(#[source] RecorderError),
    #[error("failed to spawn {name} thread")]
    Spawn {
        name: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("capture loop already started")]
    AlreadyStarted,
    #[error("capture loop is not running")]
    NotRunning,
}

/// A landmark source failed on one frame. Never fatal.
#[derive(Debug, Error)]
pub enum EstimationError {
    #[error("{category} model rejected frame: {message}")]
    Model {
        category: LandmarkCategory,
        message: String,
    },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// One sink failed to persist one queue item.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("I/O error at {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write CSV {path:?}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("failed to encode image {path:?}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("could not find a free file name for {stem}")]
    NameExhausted { stem: String },
}
