//! Rule-based, single-frame action classification over a body pose.
//!
//! Rules are evaluated in a fixed priority order and the first match wins. All
//! comparisons use normalized frame coordinates where `y` grows downward, so
//! "above" means a smaller `y`.

use std::fmt;

use serde::Serialize;

use crate::landmarks::{BodyLandmark, Landmark, LandmarkSet};

/// Minimum (for `wave`) or maximum (for `hello` and `cross_arms`) horizontal
/// distance between two keypoints, in normalized frame widths.
pub const HORIZONTAL_OFFSET_THRESHOLD: f32 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionLabel {
    Wave,
    Hello,
    RaiseHand,
    CrossArms,
    Jump,
}

impl ActionLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionLabel::Wave => "wave",
            ActionLabel::Hello => "hello",
            ActionLabel::RaiseHand => "raise_hand",
            ActionLabel::CrossArms => "cross_arms",
            ActionLabel::Jump => "jump",
        }
    }
}

impl fmt::Display for ActionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One named geometric predicate.
///
/// `test` receives the landmarks listed in `keypoints`, resolved in the same
/// order, and is only called when every one of them is present in the pose.
pub struct ActionRule {
    pub label: ActionLabel,
    pub keypoints: &'static [BodyLandmark],
    test: fn(&[Landmark]) -> bool,
}

impl ActionRule {
    /// Evaluate the rule, returning `None` when the pose lacks a keypoint.
    pub fn evaluate(&self, pose: &LandmarkSet) -> Option<bool> {
        let mut resolved = Vec::with_capacity(self.keypoints.len());
        for keypoint in self.keypoints {
            resolved.push(*pose.body(*keypoint)?);
        }
        Some((self.test)(&resolved))
    }
}

impl fmt::Debug for ActionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRule")
            .field("label", &self.label)
            .field("keypoints", &self.keypoints)
            .finish()
    }
}

/// Rules in priority order.
pub const ACTION_RULES: [ActionRule; 5] = [
    ActionRule {
        label: ActionLabel::Wave,
        keypoints: &[BodyLandmark::RightWrist, BodyLandmark::RightShoulder],
        test: wave,
    },
    ActionRule {
        label: ActionLabel::Hello,
        keypoints: &[BodyLandmark::RightWrist, BodyLandmark::RightEar],
        test: hello,
    },
    ActionRule {
        label: ActionLabel::RaiseHand,
        keypoints: &[BodyLandmark::RightWrist, BodyLandmark::Nose],
        test: raise_hand,
    },
    ActionRule {
        label: ActionLabel::CrossArms,
        keypoints: &[
            BodyLandmark::RightWrist,
            BodyLandmark::LeftWrist,
            BodyLandmark::Nose,
        ],
        test: cross_arms,
    },
    ActionRule {
        label: ActionLabel::Jump,
        keypoints: &[
            BodyLandmark::LeftAnkle,
            BodyLandmark::RightAnkle,
            BodyLandmark::LeftHip,
        ],
        test: jump,
    },
];

/// Label of the first rule in [`ACTION_RULES`] that holds for `pose`.
///
/// Rules whose keypoints are missing are skipped, so a truncated pose can
/// still match a later rule.
pub fn classify(pose: &LandmarkSet) -> Option<ActionLabel> {
    ACTION_RULES
        .iter()
        .find(|rule| rule.evaluate(pose) == Some(true))
        .map(|rule| rule.label)
}

fn wave(p: &[Landmark]) -> bool {
    let (wrist, shoulder) = (p[0], p[1]);
    wrist.y < shoulder.y && (wrist.x - shoulder.x).abs() > HORIZONTAL_OFFSET_THRESHOLD
}

fn hello(p: &[Landmark]) -> bool {
    let (wrist, ear) = (p[0], p[1]);
    wrist.y < ear.y && (wrist.x - ear.x).abs() < HORIZONTAL_OFFSET_THRESHOLD
}

fn raise_hand(p: &[Landmark]) -> bool {
    let (wrist, nose) = (p[0], p[1]);
    wrist.y < nose.y
}

fn cross_arms(p: &[Landmark]) -> bool {
    let (right, left, nose) = (p[0], p[1], p[2]);
    (right.x - nose.x).abs() < HORIZONTAL_OFFSET_THRESHOLD
        && (left.x - nose.x).abs() < HORIZONTAL_OFFSET_THRESHOLD
}

fn jump(p: &[Landmark]) -> bool {
    let (left_ankle, right_ankle, hip) = (p[0], p[1], p[2]);
    left_ankle.y < hip.y && right_ankle.y < hip.y
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Neutral standing pose: arms down and wide, feet below the hips.
    fn standing() -> Vec<Landmark> {
        let mut points = vec![Landmark::new(0.5, 0.5, 0.0); 33];
        let mut set =
            |lm: BodyLandmark, x: f32, y: f32| points[lm.index()] = Landmark::new(x, y, 0.0);
        set(BodyLandmark::Nose, 0.5, 0.2);
        set(BodyLandmark::LeftEar, 0.55, 0.2);
        set(BodyLandmark::RightEar, 0.45, 0.2);
        set(BodyLandmark::LeftShoulder, 0.6, 0.3);
        set(BodyLandmark::RightShoulder, 0.4, 0.3);
        set(BodyLandmark::LeftWrist, 0.8, 0.6);
        set(BodyLandmark::RightWrist, 0.2, 0.6);
        set(BodyLandmark::LeftHip, 0.55, 0.6);
        set(BodyLandmark::RightHip, 0.45, 0.6);
        set(BodyLandmark::LeftAnkle, 0.55, 0.95);
        set(BodyLandmark::RightAnkle, 0.45, 0.95);
        points
    }

    fn with(mut points: Vec<Landmark>, lm: BodyLandmark, x: f32, y: f32) -> Vec<Landmark> {
        points[lm.index()] = Landmark::new(x, y, 0.0);
        points
    }

    fn pose(points: Vec<Landmark>) -> LandmarkSet {
        LandmarkSet::new(points)
    }

    #[test]
    fn neutral_pose_has_no_action() {
        assert_eq!(classify(&pose(standing())), None);
    }

    #[test]
    fn wrist_above_shoulder_and_wide_is_wave() {
        let points = with(standing(), BodyLandmark::RightWrist, 0.1, 0.25);
        assert_eq!(classify(&pose(points)), Some(ActionLabel::Wave));
    }

    #[test]
    fn wrist_above_ear_near_head_is_hello() {
        let points = with(standing(), BodyLandmark::RightWrist, 0.45, 0.1);
        assert_eq!(classify(&pose(points)), Some(ActionLabel::Hello));
    }

    #[test]
    fn wrist_above_nose_but_far_from_ear_is_raise_hand() {
        // Above the nose, within 0.2 of the shoulder so not a wave, and more
        // than 0.2 away from the ear so not hello.
        let mut points = with(standing(), BodyLandmark::RightWrist, 0.7, 0.1);
        points = with(points, BodyLandmark::RightShoulder, 0.6, 0.3);
        points = with(points, BodyLandmark::RightEar, 0.45, 0.2);
        assert_eq!(classify(&pose(points)), Some(ActionLabel::RaiseHand));
    }

    #[test]
    fn both_wrists_near_centre_is_cross_arms() {
        let mut points = with(standing(), BodyLandmark::RightWrist, 0.45, 0.5);
        points = with(points, BodyLandmark::LeftWrist, 0.55, 0.5);
        assert_eq!(classify(&pose(points)), Some(ActionLabel::CrossArms));
    }

    #[test]
    fn ankles_above_hip_is_jump() {
        let mut points = with(standing(), BodyLandmark::LeftAnkle, 0.55, 0.5);
        points = with(points, BodyLandmark::RightAnkle, 0.45, 0.5);
        assert_eq!(classify(&pose(points)), Some(ActionLabel::Jump));
    }

    #[test]
    fn wave_outranks_raise_hand_when_both_hold() {
        // Wrist above shoulder and nose, 0.3 from the shoulder.
        let points = with(standing(), BodyLandmark::RightWrist, 0.1, 0.1);
        let pose = pose(points);
        assert_eq!(ACTION_RULES[2].evaluate(&pose), Some(true));
        assert_eq!(classify(&pose), Some(ActionLabel::Wave));
    }

    #[test]
    fn hello_outranks_cross_arms_when_both_hold() {
        let mut points = with(standing(), BodyLandmark::RightWrist, 0.48, 0.1);
        points = with(points, BodyLandmark::LeftWrist, 0.52, 0.5);
        let pose = pose(points);
        assert_eq!(ACTION_RULES[3].evaluate(&pose), Some(true));
        assert_eq!(classify(&pose), Some(ActionLabel::Hello));
    }

    #[test]
    fn missing_keypoints_skip_rule_without_error() {
        let short = pose(standing().into_iter().take(16).collect());
        for rule in &ACTION_RULES {
            assert_eq!(rule.evaluate(&short), None, "{:?}", rule.label);
        }
        assert_eq!(classify(&short), None);
        assert_eq!(classify(&LandmarkSet::default()), None);
    }

    #[test]
    fn truncated_pose_can_still_match_a_rule_it_covers() {
        // 17 keypoints covers wave/hello/raise_hand/cross_arms but not jump.
        let points: Vec<_> = with(standing(), BodyLandmark::RightWrist, 0.1, 0.25)
            .into_iter()
            .take(17)
            .collect();
        let pose = pose(points);
        assert_eq!(ACTION_RULES[4].evaluate(&pose), None);
        assert_eq!(classify(&pose), Some(ActionLabel::Wave));
    }

    #[test]
    fn labels_render_as_snake_case() {
        assert_eq!(ActionLabel::RaiseHand.to_string(), "raise_hand");
        assert_eq!(ActionLabel::CrossArms.as_str(), "cross_arms");
    }
}
