//! Capture devices that replay pre-recorded frames.

use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
};

use anyhow::anyhow;
use image::imageops::{self, FilterType};
use tracing::debug;

use crate::{
    CaptureDevice,
    types::{CaptureError, Frame},
};

/// In-memory frame sequence; ends once every frame has been read.
pub struct ReplayDevice {
    frames: VecDeque<Frame>,
    released: bool,
}

impl ReplayDevice {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames: frames.into(),
            released: false,
        }
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl CaptureDevice for ReplayDevice {
    fn read(&mut self) -> Result<Option<Frame>, CaptureError> {
        if self.released {
            return Ok(None);
        }
        Ok(self.frames.pop_front())
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.frames.clear();
        }
    }
}

/// Replays PNG/JPEG files from a directory in file-name order, resized to the
/// session's frame size.
pub struct ImageDirectoryDevice {
    paths: VecDeque<PathBuf>,
    target_size: (i32, i32),
    released: bool,
}

impl ImageDirectoryDevice {
    pub fn open(dir: impl AsRef<Path>, target_size: (i32, i32)) -> Result<Self, CaptureError> {
        let dir = dir.as_ref();
        let open_err = || CaptureError::Open {
            uri: dir.display().to_string(),
        };
        let (width, height) = target_size;
        if width <= 0 || height <= 0 {
            return Err(CaptureError::Other(anyhow!(
                "replay frame size must be positive, got {width}x{height}"
            )));
        }

        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(|_| open_err())?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_supported_image(path))
            .collect();
        if paths.is_empty() {
            return Err(open_err());
        }
        paths.sort();
        debug!("replaying {} image(s) from {}", paths.len(), dir.display());

        Ok(Self {
            paths: paths.into(),
            target_size,
            released: false,
        })
    }
}

impl CaptureDevice for ImageDirectoryDevice {
    fn read(&mut self) -> Result<Option<Frame>, CaptureError> {
        if self.released {
            return Ok(None);
        }
        let Some(path) = self.paths.pop_front() else {
            return Ok(None);
        };

        let image = image::open(&path)
            .map_err(|source| CaptureError::Decode {
                path: path.clone(),
                source,
            })?
            .to_rgb8();

        let (target_w, target_h) = self.target_size;
        let image = if image.dimensions() != (target_w as u32, target_h as u32) {
            imageops::resize(&image, target_w as u32, target_h as u32, FilterType::Triangle)
        } else {
            image
        };

        let mut data = image.into_raw();
        for pixel in data.chunks_exact_mut(3) {
            pixel.swap(0, 2);
        }
        Frame::from_bgr(target_w, target_h, data).map(Some)
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.paths.clear();
        }
    }
}

fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::tempdir;

    #[test]
    fn replay_device_ends_after_last_frame_and_release_is_idempotent() {
        let mut device = ReplayDevice::new(vec![Frame::blank(4, 4), Frame::blank(4, 4)]);
        assert!(device.read().unwrap().is_some());
        device.release();
        device.release();
        assert!(device.read().unwrap().is_none());
        assert_eq!(device.remaining(), 0);
    }

    #[test]
    fn image_directory_replays_sorted_and_converts_to_bgr() {
        let dir = tempdir().unwrap();
        RgbImage::from_pixel(8, 6, Rgb([255, 0, 0]))
            .save(dir.path().join("b.png"))
            .unwrap();
        RgbImage::from_pixel(8, 6, Rgb([0, 0, 255]))
            .save(dir.path().join("a.png"))
            .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut device = ImageDirectoryDevice::open(dir.path(), (8, 6)).unwrap();
        let first = device.read().unwrap().unwrap();
        // a.png is pure blue in RGB, so the first byte (B) is saturated.
        assert_eq!(first.pixel(0, 0), Some([255, 0, 0]));
        let second = device.read().unwrap().unwrap();
        assert_eq!(second.pixel(7, 5), Some([0, 0, 255]));
        assert!(device.read().unwrap().is_none());
    }

    #[test]
    fn image_directory_resizes_to_target() {
        let dir = tempdir().unwrap();
        RgbImage::new(16, 16).save(dir.path().join("frame.png")).unwrap();

        let mut device = ImageDirectoryDevice::open(dir.path(), (8, 4)).unwrap();
        let frame = device.read().unwrap().unwrap();
        assert_eq!((frame.width, frame.height), (8, 4));
        assert_eq!(frame.data.len(), 8 * 4 * 3);
    }

    #[test]
    fn empty_directory_is_unavailable() {
        let dir = tempdir().unwrap();
        let err = ImageDirectoryDevice::open(dir.path(), (8, 8)).err().unwrap();
        assert!(matches!(err, CaptureError::Open { .. }));
    }
}
