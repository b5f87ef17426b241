//! Session-wide state: the shared run flag, the output directory layout and
//! the end-of-run summary.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::pipeline::error::PipelineError;

/// Cooperative stop token shared by the capture loop and the worker.
#[derive(Clone, Debug)]
pub struct RunFlag(Arc<AtomicBool>);

impl RunFlag {
    /// A flag in the running state.
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn request_stop(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Default for RunFlag {
    fn default() -> Self {
        Self::new()
    }
}

pub const POSE_DIR: &str = "pose_landmarks";
pub const HAND_DIR: &str = "hand_landmarks";
pub const FACE_DIR: &str = "face_landmarks";
pub const VIDEOS_DIR: &str = "videos";
pub const VISUALIZATIONS_DIR: &str = "visualizations";
pub const CSV_DIR: &str = "csv_data";

/// Directory tree under the output root.
#[derive(Clone, Debug)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    /// Create the root and every subdirectory. Existing directories are kept.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let root = root.into();
        for dir in [
            POSE_DIR,
            HAND_DIR,
            FACE_DIR,
            VIDEOS_DIR,
            VISUALIZATIONS_DIR,
            CSV_DIR,
        ] {
            let path = root.join(dir);
            fs::create_dir_all(&path)
                .map_err(|source| PipelineError::OutputLayout { path, source })?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn csv_dir(&self) -> PathBuf {
        self.root.join(CSV_DIR)
    }

    pub fn visualizations_dir(&self) -> PathBuf {
        self.root.join(VISUALIZATIONS_DIR)
    }

    pub fn videos_dir(&self) -> PathBuf {
        self.root.join(VIDEOS_DIR)
    }

    /// `videos/motion_capture_<YYYYmmdd_HHMMSS>.avi`
    pub fn recording_path(&self, started_at: DateTime<Local>) -> PathBuf {
        self.videos_dir().join(format!(
            "motion_capture_{}.avi",
            started_at.format("%Y%m%d_%H%M%S")
        ))
    }

    pub fn summary_path(&self) -> PathBuf {
        self.root.join("session_summary.json")
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.root.join("metrics.prom")
    }
}

/// Totals reported when the capture loop stops.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SessionSummary {
    pub frames: u64,
    pub elapsed_secs: f64,
    pub average_fps: f64,
    pub queue_drops: u64,
    pub persisted: u64,
    pub persist_failures: u64,
    pub abandoned: u64,
    pub frame_overruns: u64,
}

impl SessionSummary {
    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        let file = fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn layout_creation_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("out");
        OutputLayout::create(&root).unwrap();
        let layout = OutputLayout::create(&root).unwrap();

        for dir in [POSE_DIR, HAND_DIR, FACE_DIR, VIDEOS_DIR, VISUALIZATIONS_DIR, CSV_DIR] {
            assert!(root.join(dir).is_dir(), "{dir} missing");
        }
        assert_eq!(layout.csv_dir(), root.join("csv_data"));
    }

    #[test]
    fn layout_fails_when_root_is_a_file() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("taken");
        fs::write(&root, b"x").unwrap();
        assert!(matches!(
            OutputLayout::create(&root),
            Err(PipelineError::OutputLayout { .. })
        ));
    }

    #[test]
    fn recording_path_uses_second_resolution_stamp() {
        let layout = OutputLayout {
            root: PathBuf::from("out"),
        };
        let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            layout.recording_path(at),
            PathBuf::from("out/videos/motion_capture_20240309_140507.avi")
        );
    }

    #[test]
    fn run_flag_clones_share_state() {
        let flag = RunFlag::new();
        let other = flag.clone();
        assert!(other.is_running());
        flag.request_stop();
        assert!(!other.is_running());
    }

    #[test]
    fn summary_serializes_to_json() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("summary.json");
        let summary = SessionSummary {
            frames: 3,
            persisted: 3,
            ..Default::default()
        };
        summary.write_json(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(value["frames"], 3);
        assert_eq!(value["queue_drops"], 0);
    }
}
