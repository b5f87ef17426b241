//! Video I/O for the motion capture pipeline: frame sources, recording sinks
//! and the preview window.
//!
//! The pipeline only talks to the traits in this module. OpenCV-backed
//! implementations are compiled with the `with-opencv` feature; the replay
//! and PNG frame-dump implementations are always available.

use std::path::{Path, PathBuf};

mod display;
mod recorder;
mod replay;
mod types;

#[cfg(feature = "with-opencv")]
mod camera;

#[cfg(feature = "with-opencv")]
pub use camera::{HighGuiDisplay, OpenCvCamera, OpenCvRecorder};
pub use display::{DisplayEvent, FrameDisplay, HeadlessDisplay};
pub use recorder::FrameDumpRecorder;
pub use replay::{ImageDirectoryDevice, ReplayDevice};
pub use types::{CaptureError, Frame, FrameFormat, RecorderError};

/// Pull-based frame source.
pub trait CaptureDevice {
    /// Next frame, or `Ok(None)` once the stream has ended.
    fn read(&mut self) -> Result<Option<Frame>, CaptureError>;

    /// Release the underlying device. Calling it again is a no-op.
    fn release(&mut self);
}

/// Destination for annotated frames.
pub trait RecordingSink {
    fn write(&mut self, frame: &Frame) -> Result<(), RecorderError>;

    /// Flush and close the recording. Calling it again is a no-op.
    fn release(&mut self);
}

/// How a source URI is interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    /// Camera index, `/dev/videoN`, a video file or a stream URL.
    Device,
    /// Directory of still images replayed in file-name order.
    ImageDirectory,
}

impl SourceKind {
    pub fn from_uri(uri: &str) -> Self {
        if Path::new(uri).is_dir() {
            SourceKind::ImageDirectory
        } else {
            SourceKind::Device
        }
    }
}

#[derive(Clone, Debug)]
pub struct CaptureSettings {
    pub uri: String,
    pub width: i32,
    pub height: i32,
    pub fps: f64,
}

#[derive(Clone, Debug)]
pub struct RecorderSettings {
    pub path: PathBuf,
    pub codec: [char; 4],
    pub fps: f64,
    pub width: i32,
    pub height: i32,
}

/// Open the capture backend matching `settings.uri`.
pub fn open_device(settings: &CaptureSettings) -> Result<Box<dyn CaptureDevice>, CaptureError> {
    match SourceKind::from_uri(&settings.uri) {
        SourceKind::ImageDirectory => Ok(Box::new(ImageDirectoryDevice::open(
            &settings.uri,
            (settings.width, settings.height),
        )?)),
        SourceKind::Device => open_camera(settings),
    }
}

#[cfg(feature = "with-opencv")]
fn open_camera(settings: &CaptureSettings) -> Result<Box<dyn CaptureDevice>, CaptureError> {
    Ok(Box::new(OpenCvCamera::open(settings)?))
}

#[cfg(not(feature = "with-opencv"))]
fn open_camera(settings: &CaptureSettings) -> Result<Box<dyn CaptureDevice>, CaptureError> {
    Err(CaptureError::Unsupported {
        uri: settings.uri.clone(),
    })
}

/// Open a video writer, or a PNG frame dump when OpenCV is not compiled in.
#[cfg(feature = "with-opencv")]
pub fn open_recorder(settings: &RecorderSettings) -> Result<Box<dyn RecordingSink>, RecorderError> {
    Ok(Box::new(OpenCvRecorder::open(settings)?))
}

/// Open a video writer, or a PNG frame dump when OpenCV is not compiled in.
#[cfg(not(feature = "with-opencv"))]
pub fn open_recorder(settings: &RecorderSettings) -> Result<Box<dyn RecordingSink>, RecorderError> {
    let dir = settings.path.with_extension("");
    Ok(Box::new(FrameDumpRecorder::open(
        dir,
        (settings.width, settings.height),
    )?))
}

/// Open the preview window, or a headless stand-in.
pub fn open_display(title: &str, headless: bool) -> Box<dyn FrameDisplay> {
    if headless {
        return Box::new(HeadlessDisplay);
    }
    #[cfg(feature = "with-opencv")]
    {
        Box::new(HighGuiDisplay::new(title))
    }
    #[cfg(not(feature = "with-opencv"))]
    {
        tracing::warn!(
            "preview window for {title:?} unavailable without `with-opencv`; running headless"
        );
        Box::new(HeadlessDisplay)
    }
}
