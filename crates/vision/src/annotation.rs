//! Skeleton and action-label overlay drawn onto captured frames.

use image::{ImageBuffer, Rgb};
use ml_core::{ActionLabel, LandmarkBatch, LandmarkCategory, topology};
use tracing::warn;
use video_ingest::Frame;

use crate::{
    draw::{draw_line, fill_circle},
    font::{GLYPH_HEIGHT, draw_text},
};

/// Baseline-left anchor of the action label, in pixels.
pub const ACTION_LABEL_ORIGIN: (i32, i32) = (10, 30);
const ACTION_LABEL_SCALE: i32 = 2;

/// Frames are BGR8, so colors are spelled in that order.
const fn bgr(b: u8, g: u8, r: u8) -> Rgb<u8> {
    Rgb([b, g, r])
}

pub const GREEN: Rgb<u8> = bgr(0, 255, 0);
pub const RED: Rgb<u8> = bgr(0, 0, 255);
pub const YELLOW: Rgb<u8> = bgr(0, 255, 255);
pub const CYAN: Rgb<u8> = bgr(255, 255, 0);

/// Line and joint appearance for one landmark category.
#[derive(Clone, Copy, Debug)]
pub struct SkeletonStyle {
    pub line: Rgb<u8>,
    pub joint: Rgb<u8>,
    pub thickness: i32,
    pub joint_radius: i32,
}

impl SkeletonStyle {
    pub fn for_category(category: LandmarkCategory) -> Self {
        match category {
            LandmarkCategory::Body => Self {
                line: GREEN,
                joint: RED,
                thickness: 2,
                joint_radius: 2,
            },
            LandmarkCategory::Hand => Self {
                line: YELLOW,
                joint: RED,
                thickness: 2,
                joint_radius: 2,
            },
            LandmarkCategory::Face => Self {
                line: CYAN,
                joint: RED,
                thickness: 1,
                joint_radius: 0,
            },
        }
    }
}

struct CategoryOverlay {
    style: SkeletonStyle,
    connections: Vec<(usize, usize)>,
}

/// Draws landmark skeletons and the action label onto frames.
///
/// The annotator owns the frame for the duration of the call and hands it
/// back; landmark batches are only borrowed.
pub struct FrameAnnotator {
    overlays: [CategoryOverlay; 3],
}

impl Default for FrameAnnotator {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameAnnotator {
    pub fn new() -> Self {
        let overlay = |category| CategoryOverlay {
            style: SkeletonStyle::for_category(category),
            connections: topology::connections(category),
        };
        Self {
            overlays: [
                overlay(LandmarkCategory::Body),
                overlay(LandmarkCategory::Hand),
                overlay(LandmarkCategory::Face),
            ],
        }
    }

    fn overlay(&self, category: LandmarkCategory) -> &CategoryOverlay {
        match category {
            LandmarkCategory::Body => &self.overlays[0],
            LandmarkCategory::Hand => &self.overlays[1],
            LandmarkCategory::Face => &self.overlays[2],
        }
    }

    pub fn annotate(
        &self,
        mut frame: Frame,
        batches: &[&LandmarkBatch],
        action: Option<ActionLabel>,
    ) -> Frame {
        let (width, height) = (frame.width as u32, frame.height as u32);
        let Some(mut canvas) =
            ImageBuffer::<Rgb<u8>, &mut [u8]>::from_raw(width, height, frame.data.as_mut_slice())
        else {
            warn!(
                "frame buffer does not match {}x{}; skipping overlay",
                frame.width, frame.height
            );
            return frame;
        };

        for batch in batches {
            self.draw_batch(&mut canvas, batch);
        }

        if let Some(action) = action {
            let (x, baseline) = ACTION_LABEL_ORIGIN;
            let top = baseline - GLYPH_HEIGHT * ACTION_LABEL_SCALE;
            draw_text(
                &mut canvas,
                x,
                top,
                &format!("Action: {action}"),
                GREEN,
                ACTION_LABEL_SCALE,
            );
        }

        frame
    }

    fn draw_batch(&self, canvas: &mut ImageBuffer<Rgb<u8>, &mut [u8]>, batch: &LandmarkBatch) {
        let overlay = self.overlay(batch.category());
        let style = overlay.style;
        let (width, height) = (canvas.width() as f32, canvas.height() as f32);
        // Off-frame points are held to within one frame of the border.
        let project = |value: f32, extent: f32| {
            (value * extent).clamp(-extent, 2.0 * extent).round() as i32
        };

        for set in batch.sets() {
            let to_px = |index: usize| {
                set.get(index)
                    .filter(|lm| lm.x.is_finite() && lm.y.is_finite())
                    .map(|lm| (project(lm.x, width), project(lm.y, height)))
            };

            for &(a, b) in &overlay.connections {
                if let (Some(start), Some(end)) = (to_px(a), to_px(b)) {
                    draw_line(canvas, start, end, style.line, style.thickness);
                }
            }
            for index in 0..set.len() {
                if let Some((x, y)) = to_px(index) {
                    fill_circle(canvas, x, y, style.joint_radius, style.joint);
                }
            }
        }
    }
}
