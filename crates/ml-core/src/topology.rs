//! Skeleton connection tables for each landmark category.

use crate::landmarks::LandmarkCategory;

/// MediaPipe Pose connections.
pub const POSE_CONNECTIONS: &[(usize, usize)] = &[
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 7),
    (0, 4),
    (4, 5),
    (5, 6),
    (6, 8),
    (9, 10),
    (11, 12),
    (11, 13),
    (13, 15),
    (15, 17),
    (15, 19),
    (15, 21),
    (17, 19),
    (12, 14),
    (14, 16),
    (16, 18),
    (16, 20),
    (16, 22),
    (18, 20),
    (11, 23),
    (12, 24),
    (23, 24),
    (23, 25),
    (24, 26),
    (25, 27),
    (26, 28),
    (27, 29),
    (28, 30),
    (29, 31),
    (30, 32),
    (27, 31),
    (28, 32),
];

/// MediaPipe Hands connections.
pub const HAND_CONNECTIONS: &[(usize, usize)] = &[
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 4),
    (0, 5),
    (5, 6),
    (6, 7),
    (7, 8),
    (5, 9),
    (9, 10),
    (10, 11),
    (11, 12),
    (9, 13),
    (13, 14),
    (14, 15),
    (15, 16),
    (13, 17),
    (0, 17),
    (17, 18),
    (18, 19),
    (19, 20),
];

const FACE_OVAL: &[usize] = &[
    10, 338, 297, 332, 284, 251, 389, 356, 454, 323, 361, 288, 397, 365, 379, 378, 400, 377, 152,
    148, 176, 149, 150, 136, 172, 58, 132, 93, 234, 127, 162, 21, 54, 103, 67, 109, 10,
];
const LIPS_OUTER: &[usize] = &[
    61, 146, 91, 181, 84, 17, 314, 405, 321, 375, 291, 409, 270, 269, 267, 0, 37, 39, 40, 185, 61,
];
const LEFT_EYE: &[usize] = &[
    263, 249, 390, 373, 374, 380, 381, 382, 362, 398, 384, 385, 386, 387, 388, 466, 263,
];
const RIGHT_EYE: &[usize] = &[
    33, 7, 163, 144, 145, 153, 154, 155, 133, 173, 157, 158, 159, 160, 161, 246, 33,
];
const LEFT_EYEBROW: &[usize] = &[276, 283, 282, 295, 285, 300, 293, 334, 296, 336];
const RIGHT_EYEBROW: &[usize] = &[46, 53, 52, 65, 55, 70, 63, 105, 66, 107];

/// Face mesh contours as closed or open polylines.
pub const FACE_CONTOURS: &[&[usize]] = &[
    FACE_OVAL,
    LIPS_OUTER,
    LEFT_EYE,
    RIGHT_EYE,
    LEFT_EYEBROW,
    RIGHT_EYEBROW,
];

/// Edge list used to draw a category's skeleton.
pub fn connections(category: LandmarkCategory) -> Vec<(usize, usize)> {
    match category {
        LandmarkCategory::Body => POSE_CONNECTIONS.to_vec(),
        LandmarkCategory::Hand => HAND_CONNECTIONS.to_vec(),
        LandmarkCategory::Face => FACE_CONTOURS
            .iter()
            .flat_map(|path| path.windows(2).map(|pair| (pair[0], pair[1])))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_edge_fits_the_category_keypoint_count() {
        for category in LandmarkCategory::ALL {
            let limit = category.keypoint_count();
            for (a, b) in connections(category) {
                assert!(a < limit && b < limit, "{category}: ({a}, {b})");
            }
        }
    }

    #[test]
    fn face_contours_expand_to_consecutive_pairs() {
        let edges = connections(LandmarkCategory::Face);
        let expected: usize = FACE_CONTOURS.iter().map(|path| path.len() - 1).sum();
        assert_eq!(edges.len(), expected);
        assert_eq!(edges[0], (10, 338));
    }
}
