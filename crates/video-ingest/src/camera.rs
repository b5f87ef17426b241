//! OpenCV-backed camera capture, video recording and preview window.

use anyhow::anyhow;
use opencv::{
    core::{self, MatTraitConstManual, MatTraitManual},
    highgui,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTrait, VideoWriter, VideoWriterTrait},
};
use tracing::{debug, info, warn};

use crate::{
    CaptureDevice, CaptureSettings, RecorderSettings, RecordingSink,
    display::{DisplayEvent, FrameDisplay},
    types::{CaptureError, Frame, RecorderError},
};

const KEY_ESCAPE: i32 = 27;

/// Camera or stream opened through `cv::VideoCapture`.
pub struct OpenCvCamera {
    cap: Option<VideoCapture>,
    target_size: (i32, i32),
    frame: Mat,
    scratch: Mat,
}

impl OpenCvCamera {
    pub fn open(settings: &CaptureSettings) -> Result<Self, CaptureError> {
        let inputs = device_index(&settings.uri)
            .map(CameraInput::Index)
            .into_iter()
            .chain([CameraInput::Path(&settings.uri)]);
        let mut cap = inputs
            .flat_map(|input| [videoio::CAP_V4L, videoio::CAP_ANY].map(|api| (input, api)))
            .find_map(|(input, api)| match input.open(api) {
                Ok(cap) if cap.is_opened().unwrap_or(false) => Some(cap),
                Ok(_) => None,
                Err(err) => {
                    warn!("failed to open {input:?} with backend {api}: {err}");
                    None
                }
            })
            .ok_or_else(|| CaptureError::Open {
                uri: settings.uri.clone(),
            })?;

        // Prefer MJPG, fall back to YUYV.
        let mjpg_accepted = VideoWriter::fourcc('M', 'J', 'P', 'G')
            .and_then(|code| cap.set(videoio::CAP_PROP_FOURCC, f64::from(code)))
            .unwrap_or(false);
        if !mjpg_accepted {
            if let Ok(code) = VideoWriter::fourcc('Y', 'U', 'Y', 'V') {
                let _ = cap.set(videoio::CAP_PROP_FOURCC, f64::from(code));
            }
        }
        for (prop, value) in [
            (videoio::CAP_PROP_FRAME_WIDTH, f64::from(settings.width)),
            (videoio::CAP_PROP_FRAME_HEIGHT, f64::from(settings.height)),
            (videoio::CAP_PROP_FPS, settings.fps),
        ] {
            if !matches!(cap.set(prop, value), Ok(true)) {
                debug!("camera ignored property {prop} = {value}");
            }
        }

        info!(
            "Opened camera {} at {}x{} @ {} fps",
            settings.uri, settings.width, settings.height, settings.fps
        );
        Ok(Self {
            cap: Some(cap),
            target_size: (settings.width, settings.height),
            frame: Mat::default(),
            scratch: Mat::default(),
        })
    }
}

/// What `cv::VideoCapture` is asked to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CameraInput<'a> {
    Index(i32),
    Path(&'a str),
}

impl CameraInput<'_> {
    fn open(self, api: i32) -> opencv::Result<VideoCapture> {
        match self {
            Self::Index(index) => VideoCapture::new(index, api),
            Self::Path(uri) => VideoCapture::from_file(uri, api),
        }
    }
}

/// `N` or `/dev/videoN` names a local device by index.
fn device_index(uri: &str) -> Option<i32> {
    let digits = uri.strip_prefix("/dev/video").unwrap_or(uri);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

impl CaptureDevice for OpenCvCamera {
    fn read(&mut self) -> Result<Option<Frame>, CaptureError> {
        let Some(cap) = self.cap.as_mut() else {
            return Ok(None);
        };

        let grabbed = cap
            .read(&mut self.frame)
            .map_err(|e| CaptureError::Other(e.into()))?;
        let size = self.frame.size().map_err(|e| CaptureError::Other(e.into()))?;
        if !grabbed || size.width <= 0 {
            return Ok(None);
        }

        let (target_w, target_h) = self.target_size;
        let working = if size.width != target_w || size.height != target_h {
            opencv::imgproc::resize(
                &self.frame,
                &mut self.scratch,
                core::Size {
                    width: target_w,
                    height: target_h,
                },
                0.0,
                0.0,
                opencv::imgproc::INTER_LINEAR,
            )
            .map_err(|e| CaptureError::Other(e.into()))?;
            &self.scratch
        } else {
            &self.frame
        };

        let data = working
            .data_bytes()
            .map_err(|e| CaptureError::Other(e.into()))?
            .to_vec();
        Frame::from_bgr(target_w, target_h, data).map(Some)
    }

    fn release(&mut self) {
        if let Some(mut cap) = self.cap.take() {
            if let Err(err) = cap.release() {
                warn!("camera release failed: {err}");
            }
            info!("Camera released");
        }
    }
}

impl Drop for OpenCvCamera {
    fn drop(&mut self) {
        self.release();
    }
}

fn frame_to_mat(frame: &Frame) -> opencv::Result<Mat> {
    let mut mat = Mat::new_rows_cols_with_default(
        frame.height,
        frame.width,
        core::CV_8UC3,
        core::Scalar::all(0.0),
    )?;
    mat.data_bytes_mut()?.copy_from_slice(&frame.data);
    Ok(mat)
}

/// Video file written through `cv::VideoWriter`.
pub struct OpenCvRecorder {
    writer: Option<VideoWriter>,
    settings: RecorderSettings,
}

impl OpenCvRecorder {
    pub fn open(settings: &RecorderSettings) -> Result<Self, RecorderError> {
        let [a, b, c, d] = settings.codec;
        let open_err = || RecorderError::Open {
            path: settings.path.clone(),
        };
        let fourcc = VideoWriter::fourcc(a, b, c, d).map_err(|e| RecorderError::Other(e.into()))?;
        let path = settings.path.to_str().ok_or_else(open_err)?;
        let writer = VideoWriter::new(
            path,
            fourcc,
            settings.fps,
            core::Size {
                width: settings.width,
                height: settings.height,
            },
            true,
        )
        .map_err(|e| RecorderError::Other(anyhow!("VideoWriter: {e}")))?;
        if !writer.is_opened().map_err(|e| RecorderError::Other(e.into()))? {
            return Err(open_err());
        }
        info!("Video will be saved to {}", settings.path.display());
        Ok(Self {
            writer: Some(writer),
            settings: settings.clone(),
        })
    }
}

impl RecordingSink for OpenCvRecorder {
    fn write(&mut self, frame: &Frame) -> Result<(), RecorderError> {
        let writer = self.writer.as_mut().ok_or(RecorderError::Released)?;
        let expected = (self.settings.width, self.settings.height);
        if (frame.width, frame.height) != expected {
            return Err(RecorderError::FrameSize {
                got: (frame.width, frame.height),
                expected,
            });
        }
        let mat = frame_to_mat(frame).map_err(|e| RecorderError::Other(e.into()))?;
        writer
            .write(&mat)
            .map_err(|e| RecorderError::Other(e.into()))
    }

    fn release(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(err) = writer.release() {
                warn!("video writer release failed: {err}");
            }
            info!("Recording saved to {}", self.settings.path.display());
        }
    }
}

impl Drop for OpenCvRecorder {
    fn drop(&mut self) {
        self.release();
    }
}

/// HighGUI window; `q` or ESC requests a stop.
pub struct HighGuiDisplay {
    title: String,
    open: bool,
}

impl HighGuiDisplay {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            open: true,
        }
    }
}

impl FrameDisplay for HighGuiDisplay {
    fn show(&mut self, frame: &Frame) -> DisplayEvent {
        if !self.open {
            return DisplayEvent::Continue;
        }
        let shown = frame_to_mat(frame).and_then(|mat| highgui::imshow(&self.title, &mat));
        if let Err(err) = shown {
            warn!("preview disabled: {err}");
            self.open = false;
            return DisplayEvent::Continue;
        }
        match highgui::wait_key(1) {
            Ok(key) if key & 0xFF == 'q' as i32 || key & 0xFF == KEY_ESCAPE => DisplayEvent::Quit,
            _ => DisplayEvent::Continue,
        }
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            let _ = highgui::destroy_window(&self.title);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_index_accepts_bare_and_dev_video_forms() {
        assert_eq!(device_index("0"), Some(0));
        assert_eq!(device_index("/dev/video2"), Some(2));
        assert_eq!(device_index("/dev/video"), None);
        assert_eq!(device_index("/dev/video1a"), None);
        assert_eq!(device_index("rtsp://cam.local/stream"), None);
        assert_eq!(device_index("clip.mp4"), None);
    }
}
