use std::{convert::TryFrom, path::Path};

use tch::{self, Device, Kind, Tensor};
use thiserror::Error;

use crate::landmarks::{Landmark, LandmarkCategory, LandmarkSet};

#[derive(Debug, Error)]
pub enum EstimatorError {
    #[error("unexpected frame buffer size: got {got} bytes, expected {expected}")]
    FrameSize { got: usize, expected: usize },
    #[error("unexpected landmark model output shape {shape:?}, expected [1, K, {expected_cols}]")]
    OutputShape {
        shape: Vec<i64>,
        expected_cols: i64,
    },
    #[error(transparent)]
    Torch(#[from] tch::TchError),
}

/// Per-category model settings fixed at startup.
#[derive(Debug, Clone, Copy)]
pub struct EstimatorSettings {
    pub category: LandmarkCategory,
    pub input_size: (i64, i64),
    pub confidence_threshold: f32,
    pub max_instances: usize,
}

impl EstimatorSettings {
    pub fn new(category: LandmarkCategory) -> Self {
        Self {
            category,
            input_size: (256, 256),
            confidence_threshold: 0.7,
            max_instances: category.default_max_instances(),
        }
    }
}

/// TorchScript-backed landmark model.
///
/// The module takes a `[1, 3, H, W]` RGB tensor in `0..1` and returns
/// `[1, K, 1 + 3N]`: one row per candidate instance holding a confidence
/// followed by `N` normalized `(x, y, z)` triples.
pub struct LandmarkEstimator {
    module: tch::CModule,
    device: Device,
    settings: EstimatorSettings,
}

impl LandmarkEstimator {
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        device: Device,
        settings: EstimatorSettings,
    ) -> Result<Self, EstimatorError> {
        let module = tch::CModule::load_on_device(model_path, device)?;
        Ok(Self {
            module,
            device,
            settings,
        })
    }

    pub fn category(&self) -> LandmarkCategory {
        self.settings.category
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Converts a BGR8 frame into a normalized RGB tensor at the model's input size.
    pub fn bgr_to_tensor(
        &self,
        bgr: &[u8],
        width: i32,
        height: i32,
    ) -> Result<Tensor, EstimatorError> {
        let expected = (width as usize) * (height as usize) * 3;
        if bgr.len() != expected {
            return Err(EstimatorError::FrameSize {
                got: bgr.len(),
                expected,
            });
        }

        let (in_w, in_h) = self.settings.input_size;
        let tensor = Tensor::from_slice(bgr)
            .to_device(self.device)
            .to_kind(Kind::Float)
            .view([1, height as i64, width as i64, 3])
            .flip([3])
            .permute([0, 3, 1, 2])
            / 255.0;

        if (width as i64, height as i64) == (in_w, in_h) {
            Ok(tensor)
        } else {
            Ok(tensor.upsample_bilinear2d([in_h, in_w], false, None, None))
        }
    }

    /// Run the model on one frame and keep confident instances, best first.
    pub fn estimate(
        &self,
        bgr: &[u8],
        width: i32,
        height: i32,
    ) -> Result<Vec<LandmarkSet>, EstimatorError> {
        let input = self.bgr_to_tensor(bgr, width, height)?;
        let output = self.module.forward_ts(&[input])?;

        let keypoints = self.settings.category.keypoint_count() as i64;
        let expected_cols = 1 + keypoints * 3;
        let shape = output.size();
        if shape.len() != 3 || shape[0] != 1 || shape[2] != expected_cols {
            return Err(EstimatorError::OutputShape {
                shape,
                expected_cols,
            });
        }

        let rows = output.to_device(Device::Cpu).squeeze_dim(0).contiguous();
        let rows: Vec<Vec<f32>> = Vec::<Vec<f32>>::try_from(&rows)?;

        let mut candidates: Vec<(f32, LandmarkSet)> = rows
            .into_iter()
            .filter(|row| row[0] >= self.settings.confidence_threshold)
            .map(|row| {
                let points = row[1..]
                    .chunks_exact(3)
                    .map(|xyz| Landmark::new(xyz[0], xyz[1], xyz[2]))
                    .collect();
                (row[0], LandmarkSet::new(points))
            })
            .collect();
        candidates.sort_by(|a, b| b.0.total_cmp(&a.0));
        candidates.truncate(self.settings.max_instances);

        Ok(candidates.into_iter().map(|(_, set)| set).collect())
    }
}
