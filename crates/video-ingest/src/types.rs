use std::path::PathBuf;

use anyhow::Error;
use chrono::Utc;
use thiserror::Error;

/// BGR8 frame captured from a video source.
#[derive(Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: i32,
    pub height: i32,
    pub timestamp_ms: i64,
    pub format: FrameFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameFormat {
    Bgr8,
}

impl Frame {
    /// Wrap a packed BGR8 buffer, stamping it with the current wall clock.
    pub fn from_bgr(width: i32, height: i32, data: Vec<u8>) -> Result<Self, CaptureError> {
        let expected = expected_len(width, height);
        if width <= 0 || height <= 0 || data.len() != expected {
            return Err(CaptureError::InvalidFrame {
                width,
                height,
                len: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            timestamp_ms: Utc::now().timestamp_millis(),
            format: FrameFormat::Bgr8,
        })
    }

    /// Solid black frame.
    pub fn blank(width: i32, height: i32) -> Self {
        Self {
            data: vec![0; expected_len(width, height)],
            width,
            height,
            timestamp_ms: Utc::now().timestamp_millis(),
            format: FrameFormat::Bgr8,
        }
    }

    pub fn pixel(&self, x: i32, y: i32) -> Option<[u8; 3]> {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return None;
        }
        let offset = ((y * self.width + x) * 3) as usize;
        Some([
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
        ])
    }

    /// Same pixels in RGB order, for encoders that expect it.
    pub fn to_rgb(&self) -> Vec<u8> {
        let mut rgb = Vec::with_capacity(self.data.len());
        for chunk in self.data.chunks_exact(3) {
            rgb.extend_from_slice(&[chunk[2], chunk[1], chunk[0]]);
        }
        rgb
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("timestamp_ms", &self.timestamp_ms)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

fn expected_len(width: i32, height: i32) -> usize {
    (width.max(0) as usize) * (height.max(0) as usize) * 3
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open video source {uri:?}")]
    Open { uri: String },
    #[error("no capture backend available for {uri:?} (build with `with-opencv`)")]
    Unsupported { uri: String },
    #[error("frame buffer of {len} bytes does not match {width}x{height} BGR8")]
    InvalidFrame { width: i32, height: i32, len: usize },
    #[error("failed to decode {path:?}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error(transparent)]
    Other(#[from] Error),
}

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("failed to open recording sink at {path:?}")]
    Open { path: PathBuf },
    #[error("recording sink already released")]
    Released,
    #[error("frame is {got:?} but the recording was opened at {expected:?}")]
    FrameSize { got: (i32, i32), expected: (i32, i32) },
    #[error("failed to write {path:?}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] Error),
}
