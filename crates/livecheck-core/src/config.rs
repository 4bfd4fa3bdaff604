//! Liveness thresholds.

use crate::geometry::{Oval, SizeBand};
use crate::types::{LandmarkKind, Point};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("oval radii must be positive (got {radius_x} x {radius_y})")]
    DegenerateOval { radius_x: f32, radius_y: f32 },
    #[error("size band `{0}` has min greater than max")]
    InvertedSizeBand(&'static str),
    #[error("eye-open threshold must lie in [0, 1], got {0}")]
    EyeThresholdOutOfRange(f32),
    #[error("{0} must be at least 1")]
    ZeroCount(&'static str),
}

/// Every tunable the check engine and the capture validator read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    /// Oval guide in analysis-frame coordinates.
    pub oval: Oval,
    /// Allowed face-center offset as a fraction of the oval radius, per axis.
    pub center_tolerance_x: f32,
    pub center_tolerance_y: f32,
    /// Landmarks that must all sit inside the oval for the face to count as placed.
    pub required_landmarks: Vec<LandmarkKind>,
    /// Eyes count as open only when both probabilities exceed this.
    pub eye_open_threshold: f32,
    /// Yaw pivot for the turn latches: above it is "right", below it is "left".
    pub turn_threshold_deg: f32,
    /// Half-width of the yaw window that counts as looking straight.
    pub straight_yaw_deg: f32,
    /// Half-width of the pitch window reported in diagnostics.
    pub pitch_limit_deg: f32,
    /// Closed-eye frames needed before the blink check is met.
    pub min_closed_eye_frames: u32,
    /// Frames with more faces than this are ignored.
    pub max_faces: usize,
    /// Diagnostic "not too far away" band.
    pub not_far_band: SizeBand,
    /// Acceptable face size band gating the in-range check.
    pub in_range_band: SizeBand,
    pub validation: ValidationConfig,
}

/// Post-capture feature re-check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub required_landmarks: Vec<LandmarkKind>,
    pub yaw_limit_deg: f32,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            oval: Oval {
                center: Point::new(240.0, 320.0),
                radius_x: 150.0,
                radius_y: 175.0,
            },
            center_tolerance_x: 0.2,
            center_tolerance_y: 0.2,
            required_landmarks: vec![
                LandmarkKind::NoseBase,
                LandmarkKind::LeftEye,
                LandmarkKind::RightEye,
                LandmarkKind::MouthBottom,
            ],
            eye_open_threshold: 0.4,
            turn_threshold_deg: -4.0,
            straight_yaw_deg: 10.0,
            pitch_limit_deg: 15.0,
            min_closed_eye_frames: 2,
            max_faces: 2,
            not_far_band: SizeBand {
                min_width: 170.0,
                max_width: 200.0,
                min_height: 170.0,
                max_height: 205.0,
            },
            in_range_band: SizeBand {
                min_width: 150.0,
                max_width: 260.0,
                min_height: 150.0,
                max_height: 270.0,
            },
            validation: ValidationConfig::default(),
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            required_landmarks: vec![
                LandmarkKind::NoseBase,
                LandmarkKind::LeftEye,
                LandmarkKind::RightEye,
                LandmarkKind::MouthLeft,
                LandmarkKind::MouthRight,
            ],
            yaw_limit_deg: 10.0,
        }
    }
}

impl LivenessConfig {
    /// Reject configurations the engine cannot evaluate meaningfully.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.oval.radius_x <= 0.0 || self.oval.radius_y <= 0.0 {
            return Err(ConfigError::DegenerateOval {
                radius_x: self.oval.radius_x,
                radius_y: self.oval.radius_y,
            });
        }
        if !self.not_far_band.is_well_formed() {
            return Err(ConfigError::InvertedSizeBand("not_far_band"));
        }
        if !self.in_range_band.is_well_formed() {
            return Err(ConfigError::InvertedSizeBand("in_range_band"));
        }
        if !(0.0..=1.0).contains(&self.eye_open_threshold) {
            return Err(ConfigError::EyeThresholdOutOfRange(self.eye_open_threshold));
        }
        if self.min_closed_eye_frames == 0 {
            return Err(ConfigError::ZeroCount("min_closed_eye_frames"));
        }
        if self.max_faces == 0 {
            return Err(ConfigError::ZeroCount("max_faces"));
        }
        Ok(())
    }
}
