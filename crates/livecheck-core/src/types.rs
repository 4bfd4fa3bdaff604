use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A position in analysis-frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Named facial landmarks reported by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandmarkKind {
    NoseBase,
    LeftEye,
    RightEye,
    LeftCheek,
    RightCheek,
    MouthLeft,
    MouthRight,
    MouthBottom,
}

/// One analyzed face, normalized from classifier output.
///
/// A landmark missing from `landmarks` means the classifier could not locate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceObservation {
    pub bbox_center: Point,
    pub bbox_width: f32,
    pub bbox_height: f32,
    #[serde(default)]
    pub landmarks: BTreeMap<LandmarkKind, Point>,
    /// Probability in [0, 1] that the left eye is open.
    pub left_eye_open_probability: Option<f32>,
    pub right_eye_open_probability: Option<f32>,
    /// Head yaw in degrees, signed.
    pub head_yaw: f32,
    /// Head pitch in degrees, signed.
    pub head_pitch: f32,
}

impl FaceObservation {
    pub fn landmark(&self, kind: LandmarkKind) -> Option<Point> {
        self.landmarks.get(&kind).copied()
    }

    pub fn area(&self) -> f32 {
        self.bbox_width * self.bbox_height
    }

    /// Both eyes strictly above `threshold`. A missing probability counts as closed.
    pub fn eyes_open(&self, threshold: f32) -> bool {
        self.left_eye_open_probability.unwrap_or(0.0) > threshold
            && self.right_eye_open_probability.unwrap_or(0.0) > threshold
    }
}

/// What one analyzed frame yielded.
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    /// No usable face: none found, too many found, or the classifier failed.
    NoFace,
    Observation(FaceObservation),
}

impl Detection {
    /// Reduce a frame's faces to the one the checks run against.
    ///
    /// Zero faces or more than `max_faces` yields [`Detection::NoFace`];
    /// otherwise the face with the largest bounding box is chosen.
    pub fn from_faces(faces: Vec<FaceObservation>, max_faces: usize) -> Self {
        if faces.is_empty() || faces.len() > max_faces {
            return Detection::NoFace;
        }
        faces
            .into_iter()
            .max_by(|a, b| {
                a.area()
                    .partial_cmp(&b.area())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map_or(Detection::NoFace, Detection::Observation)
    }

    pub fn observation(&self) -> Option<&FaceObservation> {
        match self {
            Detection::NoFace => None,
            Detection::Observation(face) => Some(face),
        }
    }
}
