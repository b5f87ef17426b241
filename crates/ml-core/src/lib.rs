//! Landmark data model and the single-frame action classifier.
//!
//! Everything here is pure data and pure functions; capture, inference
//! scheduling and persistence live in the `vision` crate.

pub mod action;
pub mod landmarks;
pub mod topology;

#[cfg(feature = "with-tch")]
pub mod estimator;

pub use action::{ActionLabel, ActionRule, HORIZONTAL_OFFSET_THRESHOLD, classify};
pub use landmarks::{
    BodyLandmark, Landmark, LandmarkArray, LandmarkBatch, LandmarkCategory, LandmarkSet,
};

#[cfg(feature = "with-tch")]
/// Re-exported so downstream crates share the exact `tch` build.
pub use tch;
