//! Landmark sources: one per category, run in sequence on every frame.

use std::time::Instant;

use ml_core::{LandmarkBatch, LandmarkCategory, LandmarkSet};
use tracing::{debug, warn};
use video_ingest::Frame;

use crate::pipeline::{
    config::PipelineConfig,
    error::{EstimationError, PipelineError},
};

/// A model producing landmark sets for one category.
///
/// Each call is independent of the previous one.
pub trait LandmarkSource {
    fn category(&self) -> LandmarkCategory;

    fn process(&mut self, frame: &Frame) -> Result<Vec<LandmarkSet>, EstimationError>;
}

/// Source for a category without a configured model. Always empty.
pub struct DisabledSource {
    category: LandmarkCategory,
}

impl DisabledSource {
    pub fn new(category: LandmarkCategory) -> Self {
        Self { category }
    }
}

impl LandmarkSource for DisabledSource {
    fn category(&self) -> LandmarkCategory {
        self.category
    }

    fn process(&mut self, _frame: &Frame) -> Result<Vec<LandmarkSet>, EstimationError> {
        Ok(Vec::new())
    }
}

/// Per-frame output of the three sources.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameLandmarks {
    pub body: LandmarkBatch,
    pub hands: LandmarkBatch,
    pub faces: LandmarkBatch,
}

impl FrameLandmarks {
    pub fn empty() -> Self {
        Self {
            body: LandmarkBatch::empty(LandmarkCategory::Body),
            hands: LandmarkBatch::empty(LandmarkCategory::Hand),
            faces: LandmarkBatch::empty(LandmarkCategory::Face),
        }
    }

    /// Batches in drawing order: body, hands, face.
    pub fn batches(&self) -> [&LandmarkBatch; 3] {
        [&self.body, &self.hands, &self.faces]
    }

    fn slot_mut(&mut self, category: LandmarkCategory) -> &mut LandmarkBatch {
        match category {
            LandmarkCategory::Body => &mut self.body,
            LandmarkCategory::Hand => &mut self.hands,
            LandmarkCategory::Face => &mut self.faces,
        }
    }
}

struct BoundedSource {
    source: Box<dyn LandmarkSource>,
    max_instances: usize,
}

/// The body, hand and face sources with their instance limits.
pub struct SourceSet {
    sources: Vec<BoundedSource>,
    verbose: bool,
}

impl SourceSet {
    pub fn new() -> Self {
        Self {
            sources: Vec::with_capacity(3),
            verbose: false,
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Add a source, keeping at most `max_instances` sets per frame.
    ///
    /// A later source for the same category replaces the earlier one.
    pub fn with_source(mut self, source: Box<dyn LandmarkSource>, max_instances: usize) -> Self {
        let category = source.category();
        self.sources.retain(|entry| entry.source.category() != category);
        self.sources.push(BoundedSource {
            source,
            max_instances: max_instances.max(1),
        });
        self
    }

    /// Build the sources described by `config`.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let mut set = SourceSet::new().verbose(config.verbose);
        for category in LandmarkCategory::ALL {
            let options = config.model(category);
            let source = load_source(config, category)?;
            set = set.with_source(source, options.max_instances);
        }
        Ok(set)
    }

    /// Run every source on `frame`. Failures become empty batches.
    pub fn process(&mut self, frame: &Frame, frame_number: u64) -> FrameLandmarks {
        let mut landmarks = FrameLandmarks::empty();
        for entry in &mut self.sources {
            let category = entry.source.category();
            let started = Instant::now();
            let _span =
                tracing::info_span!("estimate", category = category.label(), frame = frame_number)
                    .entered();

            let sets = match entry.source.process(frame) {
                Ok(sets) => sets,
                Err(err) => {
                    warn!("{category} estimation failed on frame #{frame_number}: {err}");
                    metrics::counter!(
                        "pipeline_estimation_failures_total",
                        "category" => category.label()
                    )
                    .increment(1);
                    Vec::new()
                }
            };

            let mut batch = LandmarkBatch::new(category, sets);
            batch.truncate(entry.max_instances);
            metrics::histogram!("pipeline_stage_latency_seconds", "stage" => category.label())
                .record(started.elapsed().as_secs_f64());
            if self.verbose && !batch.is_empty() {
                debug!("frame #{frame_number}: {} {category} set(s)", batch.len());
            }
            *landmarks.slot_mut(category) = batch;
        }
        landmarks
    }
}

impl Default for SourceSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "with-tch")]
fn load_source(
    config: &PipelineConfig,
    category: LandmarkCategory,
) -> Result<Box<dyn LandmarkSource>, PipelineError> {
    use ml_core::tch::Device;

    let options = config.model(category);
    let Some(path) = options.model_path.as_ref() else {
        debug!("no {category} model configured; {category} landmarks disabled");
        return Ok(Box::new(DisabledSource::new(category)));
    };
    let device = if config.use_cpu {
        Device::Cpu
    } else {
        Device::cuda_if_available()
    };
    let source = TorchLandmarkSource::load(path, device, category, options).map_err(|err| {
        PipelineError::ModelLoad {
            category,
            message: err.to_string(),
        }
    })?;
    debug!("{category} model {} loaded on {device:?}", path.display());
    Ok(Box::new(source))
}

#[cfg(not(feature = "with-tch"))]
fn load_source(
    config: &PipelineConfig,
    category: LandmarkCategory,
) -> Result<Box<dyn LandmarkSource>, PipelineError> {
    if let Some(path) = config.model(category).model_path.as_ref() {
        warn!(
            "ignoring {category} model {}: build with `with-tch` to enable inference",
            path.display()
        );
    }
    Ok(Box::new(DisabledSource::new(category)))
}

#[cfg(feature = "with-tch")]
pub use torch::TorchLandmarkSource;

#[cfg(feature = "with-tch")]
mod torch {
    use std::path::Path;

    use ml_core::{
        LandmarkCategory, LandmarkSet,
        estimator::{EstimatorError, EstimatorSettings, LandmarkEstimator},
        tch::Device,
    };
    use video_ingest::Frame;

    use super::LandmarkSource;
    use crate::pipeline::{config::ModelOptions, error::EstimationError};

    /// TorchScript landmark model bound to one category.
    pub struct TorchLandmarkSource {
        estimator: LandmarkEstimator,
    }

    impl TorchLandmarkSource {
        pub fn load(
            path: &Path,
            device: Device,
            category: LandmarkCategory,
            options: &ModelOptions,
        ) -> Result<Self, EstimatorError> {
            let settings = EstimatorSettings {
                confidence_threshold: options.confidence,
                max_instances: options.max_instances,
                ..EstimatorSettings::new(category)
            };
            Ok(Self {
                estimator: LandmarkEstimator::new(path, device, settings)?,
            })
        }
    }

    impl LandmarkSource for TorchLandmarkSource {
        fn category(&self) -> LandmarkCategory {
            self.estimator.category()
        }

        fn process(&mut self, frame: &Frame) -> Result<Vec<LandmarkSet>, EstimationError> {
            self.estimator
                .estimate(&frame.data, frame.width, frame.height)
                .map_err(|err| EstimationError::Model {
                    category: self.estimator.category(),
                    message: err.to_string(),
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        category: LandmarkCategory,
        sets: usize,
    }

    impl LandmarkSource for Fixed {
        fn category(&self) -> LandmarkCategory {
            self.category
        }

        fn process(&mut self, _frame: &Frame) -> Result<Vec<LandmarkSet>, EstimationError> {
            Ok((0..self.sets)
                .map(|i| LandmarkSet::from_rows(&[[i as f32, 0.0, 0.0]]))
                .collect())
        }
    }

    struct Failing;

    impl LandmarkSource for Failing {
        fn category(&self) -> LandmarkCategory {
            LandmarkCategory::Face
        }

        fn process(&mut self, _frame: &Frame) -> Result<Vec<LandmarkSet>, EstimationError> {
            Err(EstimationError::Model {
                category: LandmarkCategory::Face,
                message: "tensor shape mismatch".into(),
            })
        }
    }

    #[test]
    fn batches_are_truncated_to_max_instances() {
        let mut set = SourceSet::new().with_source(
            Box::new(Fixed {
                category: LandmarkCategory::Hand,
                sets: 5,
            }),
            2,
        );
        let out = set.process(&Frame::blank(4, 4), 1);
        assert_eq!(out.hands.len(), 2);
        assert_eq!(out.hands.sets()[1].get(0).map(|lm| lm.x), Some(1.0));
        assert!(out.body.is_empty());
    }

    #[test]
    fn failing_source_yields_empty_batch() {
        let mut set = SourceSet::new()
            .with_source(
                Box::new(Fixed {
                    category: LandmarkCategory::Body,
                    sets: 1,
                }),
                1,
            )
            .with_source(Box::new(Failing), 1);
        let out = set.process(&Frame::blank(4, 4), 3);
        assert!(out.faces.is_empty());
        assert_eq!(out.faces.category(), LandmarkCategory::Face);
        assert_eq!(out.body.len(), 1);
    }

    #[test]
    fn default_config_builds_disabled_sources() {
        let mut set = SourceSet::from_config(&PipelineConfig::default()).unwrap();
        assert_eq!(set.process(&Frame::blank(2, 2), 1), FrameLandmarks::empty());
    }

    #[test]
    fn later_source_replaces_same_category() {
        let mut set = SourceSet::new()
            .with_source(Box::new(DisabledSource::new(LandmarkCategory::Body)), 1)
            .with_source(
                Box::new(Fixed {
                    category: LandmarkCategory::Body,
                    sets: 1,
                }),
                1,
            );
        assert_eq!(set.process(&Frame::blank(2, 2), 1).body.len(), 1);
    }
}
