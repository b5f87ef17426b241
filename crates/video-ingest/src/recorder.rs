use std::path::{Path, PathBuf};

use image::RgbImage;
use tracing::info;

use crate::{
    RecordingSink,
    types::{Frame, RecorderError},
};

/// Recording sink that writes each frame as a numbered PNG.
pub struct FrameDumpRecorder {
    dir: PathBuf,
    size: (i32, i32),
    written: u64,
    released: bool,
}

impl FrameDumpRecorder {
    pub fn open(dir: impl Into<PathBuf>, size: (i32, i32)) -> Result<Self, RecorderError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        info!("Recording frames to {}", dir.display());
        Ok(Self {
            dir,
            size,
            written: 0,
            released: false,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn frames_written(&self) -> u64 {
        self.written
    }
}

impl RecordingSink for FrameDumpRecorder {
    fn write(&mut self, frame: &Frame) -> Result<(), RecorderError> {
        if self.released {
            return Err(RecorderError::Released);
        }
        if (frame.width, frame.height) != self.size {
            return Err(RecorderError::FrameSize {
                got: (frame.width, frame.height),
                expected: self.size,
            });
        }

        let path = self.dir.join(format!("frame_{:06}.png", self.written));
        let image = RgbImage::from_raw(frame.width as u32, frame.height as u32, frame.to_rgb())
            .ok_or(RecorderError::FrameSize {
                got: (frame.width, frame.height),
                expected: self.size,
            })?;
        image
            .save(&path)
            .map_err(|source| RecorderError::Encode { path, source })?;
        self.written += 1;
        Ok(())
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            info!(
                "Recording closed after {} frame(s) in {}",
                self.written,
                self.dir.display()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_numbered_pngs_until_released() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("motion_capture_test");
        let mut recorder = FrameDumpRecorder::open(&out, (4, 2)).unwrap();

        recorder.write(&Frame::blank(4, 2)).unwrap();
        recorder.write(&Frame::blank(4, 2)).unwrap();
        assert!(out.join("frame_000000.png").is_file());
        assert!(out.join("frame_000001.png").is_file());

        recorder.release();
        recorder.release();
        assert!(matches!(
            recorder.write(&Frame::blank(4, 2)),
            Err(RecorderError::Released)
        ));
        assert_eq!(recorder.frames_written(), 2);
    }

    #[test]
    fn rejects_frames_of_another_size() {
        let dir = tempdir().unwrap();
        let mut recorder = FrameDumpRecorder::open(dir.path(), (4, 2)).unwrap();
        assert!(matches!(
            recorder.write(&Frame::blank(2, 2)),
            Err(RecorderError::FrameSize { .. })
        ));
    }
}
