//! Geometric predicates evaluated against the on-screen oval guide.
//!
//! All functions are pure. Coordinates are in analysis-frame pixels.

use crate::types::{FaceObservation, LandmarkKind, Point};
use serde::{Deserialize, Serialize};

/// The elliptical guide the user places their face in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Oval {
    pub center: Point,
    pub radius_x: f32,
    pub radius_y: f32,
}

impl Oval {
    pub fn contains(&self, point: Point) -> bool {
        point_inside_ellipse(point, self.center, self.radius_x, self.radius_y)
    }
}

/// Inclusive width and height bounds for a face bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizeBand {
    pub min_width: f32,
    pub max_width: f32,
    pub min_height: f32,
    pub max_height: f32,
}

impl SizeBand {
    pub fn contains(&self, width: f32, height: f32) -> bool {
        size_in_range(
            width,
            height,
            self.min_width,
            self.max_width,
            self.min_height,
            self.max_height,
        )
    }

    pub fn is_well_formed(&self) -> bool {
        self.min_width <= self.max_width && self.min_height <= self.max_height
    }
}

/// Normalized-distance test: `((x-cx)/rx)² + ((y-cy)/ry)² <= 1`.
///
/// A degenerate ellipse (non-positive radius) contains nothing.
pub fn point_inside_ellipse(point: Point, center: Point, radius_x: f32, radius_y: f32) -> bool {
    if radius_x <= 0.0 || radius_y <= 0.0 {
        return false;
    }
    let dx = (point.x - center.x) / radius_x;
    let dy = (point.y - center.y) / radius_y;
    dx * dx + dy * dy <= 1.0
}

/// Axis-aligned tolerance box around the oval center.
///
/// Each axis is checked independently against a fraction of the matching
/// radius, so this is looser than the ellipse test near the diagonals.
pub fn center_within_tolerance(
    face_center: Point,
    oval: &Oval,
    tolerance_x_fraction: f32,
    tolerance_y_fraction: f32,
) -> bool {
    let dx = (face_center.x - oval.center.x).abs();
    let dy = (face_center.y - oval.center.y).abs();
    dx <= oval.radius_x * tolerance_x_fraction && dy <= oval.radius_y * tolerance_y_fraction
}

pub fn size_in_range(
    width: f32,
    height: f32,
    min_width: f32,
    max_width: f32,
    min_height: f32,
    max_height: f32,
) -> bool {
    (min_width..=max_width).contains(&width) && (min_height..=max_height).contains(&height)
}

/// Every required landmark must be present and satisfy `predicate`.
///
/// A missing landmark fails the test rather than being skipped.
pub fn all_landmarks_inside<F>(face: &FaceObservation, required: &[LandmarkKind], predicate: F) -> bool
where
    F: Fn(Point) -> bool,
{
    required
        .iter()
        .all(|&kind| face.landmark(kind).is_some_and(&predicate))
}
