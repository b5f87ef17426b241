//! Motion capture pipeline: frame annotation, landmark charts and the
//! capture/persistence runtime.

pub mod annotation;
mod draw;
mod font;
pub mod pipeline;
pub mod plot;

pub use annotation::{FrameAnnotator, SkeletonStyle};
pub use pipeline::{CaptureCliArgs, PipelineConfig, SessionSummary, run};
pub use plot::render_landmark_chart;
