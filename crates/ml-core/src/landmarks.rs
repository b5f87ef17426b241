use std::fmt;

use serde::{Deserialize, Serialize};

/// A single keypoint in the model's normalized frame coordinates.
///
/// `x` and `y` are fractions of the frame width and height (origin top-left,
/// `y` grows downward); `z` is model-relative depth.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

impl From<[f32; 3]> for Landmark {
    fn from([x, y, z]: [f32; 3]) -> Self {
        Self { x, y, z }
    }
}

/// Landmark family produced by one estimation model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandmarkCategory {
    Body,
    Hand,
    Face,
}

impl LandmarkCategory {
    pub const ALL: [LandmarkCategory; 3] = [
        LandmarkCategory::Body,
        LandmarkCategory::Hand,
        LandmarkCategory::Face,
    ];

    /// Tag used in output file names and metric labels.
    pub fn label(self) -> &'static str {
        match self {
            LandmarkCategory::Body => "pose",
            LandmarkCategory::Hand => "hand",
            LandmarkCategory::Face => "face",
        }
    }

    /// Keypoints per set for the MediaPipe-style models.
    pub fn keypoint_count(self) -> usize {
        match self {
            LandmarkCategory::Body => 33,
            LandmarkCategory::Hand => 21,
            LandmarkCategory::Face => 468,
        }
    }

    /// Default upper bound on instances detected per frame.
    pub fn default_max_instances(self) -> usize {
        match self {
            LandmarkCategory::Body => 1,
            LandmarkCategory::Hand => 2,
            LandmarkCategory::Face => 1,
        }
    }
}

impl fmt::Display for LandmarkCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Ordered keypoints of one detected instance (one pose, one hand, one face).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LandmarkSet {
    points: Vec<Landmark>,
}

impl LandmarkSet {
    pub fn new(points: Vec<Landmark>) -> Self {
        Self { points }
    }

    pub fn from_rows(rows: &[[f32; 3]]) -> Self {
        Self {
            points: rows.iter().copied().map(Landmark::from).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Landmark> {
        self.points.get(index)
    }

    pub fn body(&self, landmark: BodyLandmark) -> Option<&Landmark> {
        self.points.get(landmark.index())
    }

    pub fn points(&self) -> &[Landmark] {
        &self.points
    }

    pub fn to_rows(&self) -> Vec<[f32; 3]> {
        self.points.iter().map(|p| p.to_array()).collect()
    }
}

/// Flat numeric form of a batch: one `[x, y, z]` row per keypoint, per set.
pub type LandmarkArray = Vec<Vec<[f32; 3]>>;

/// All sets of a single category detected in one frame.
///
/// The category is carried once for the whole batch, so a batch can never mix
/// categories.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkBatch {
    category: LandmarkCategory,
    sets: Vec<LandmarkSet>,
}

impl LandmarkBatch {
    pub fn new(category: LandmarkCategory, sets: Vec<LandmarkSet>) -> Self {
        Self { category, sets }
    }

    pub fn empty(category: LandmarkCategory) -> Self {
        Self {
            category,
            sets: Vec::new(),
        }
    }

    pub fn category(&self) -> LandmarkCategory {
        self.category
    }

    pub fn sets(&self) -> &[LandmarkSet] {
        &self.sets
    }

    pub fn first(&self) -> Option<&LandmarkSet> {
        self.sets.first()
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Drop instances beyond `max`, keeping detection order.
    pub fn truncate(&mut self, max: usize) {
        self.sets.truncate(max);
    }

    pub fn to_array(&self) -> LandmarkArray {
        self.sets.iter().map(LandmarkSet::to_rows).collect()
    }
}

/// MediaPipe Pose landmark indices (33 total).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BodyLandmark {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

impl BodyLandmark {
    pub const fn index(self) -> usize {
        self as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_array_keeps_set_and_keypoint_order() {
        let batch = LandmarkBatch::new(
            LandmarkCategory::Hand,
            vec![
                LandmarkSet::from_rows(&[[0.1, 0.2, 0.0], [0.3, 0.4, -0.1]]),
                LandmarkSet::from_rows(&[[0.5, 0.6, 0.2]]),
            ],
        );

        let array = batch.to_array();
        assert_eq!(array.len(), 2);
        assert_eq!(array[0], vec![[0.1, 0.2, 0.0], [0.3, 0.4, -0.1]]);
        assert_eq!(array[1], vec![[0.5, 0.6, 0.2]]);
    }

    #[test]
    fn truncate_caps_instance_count() {
        let set = LandmarkSet::from_rows(&[[0.0, 0.0, 0.0]]);
        let mut batch = LandmarkBatch::new(LandmarkCategory::Hand, vec![set.clone(); 4]);
        batch.truncate(LandmarkCategory::Hand.default_max_instances());
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn body_lookup_is_bounds_checked() {
        let pose = LandmarkSet::from_rows(&[[0.5, 0.5, 0.0]; 12]);
        assert!(pose.body(BodyLandmark::Nose).is_some());
        assert!(pose.body(BodyLandmark::RightShoulder).is_none());
    }

    #[test]
    fn category_labels_match_file_prefixes() {
        let labels: Vec<_> = LandmarkCategory::ALL.iter().map(|c| c.label()).collect();
        assert_eq!(labels, ["pose", "hand", "face"]);
    }
}
