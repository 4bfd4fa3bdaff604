//! Liveness check engine.
//!
//! Consumes one [`Detection`] per analyzed frame, advances the per-attempt
//! latches (blink counter, turn directions), recomputes the ordered checklist
//! and returns the new [`ChecksState`] snapshot together with the gating
//! boolean.
//!
//! The engine owns all per-attempt state; nothing is shared between
//! instances. It is not thread-safe on purpose: exactly one worker drives it.

use crate::checks::{CheckDefinition, CheckKind, ChecksState, Latches};
use crate::config::{ConfigError, LivenessConfig};
use crate::geometry::{all_landmarks_inside, center_within_tolerance};
use crate::types::{Detection, FaceObservation};
use serde::Serialize;

/// Per-frame booleans derived from a single observation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FrameSignals {
    /// Face centered in the oval with every required landmark inside it.
    pub face_positioned: bool,
    pub face_not_far_away: bool,
    pub face_in_range: bool,
    pub turned_left: bool,
    pub turned_right: bool,
    pub looking_straight: bool,
    pub eyes_open: bool,
    pub head_pitch_valid: bool,
}

/// Result of one [`CheckEngine::process`] call.
#[derive(Debug, Clone)]
pub struct FrameOutcome {
    /// Gating boolean: all four checks met. Turn latches are not part of it.
    pub detected: bool,
    /// `None` when the frame had no usable face.
    pub signals: Option<FrameSignals>,
    pub state: ChecksState,
}

pub struct CheckEngine {
    config: LivenessConfig,
    definitions: Vec<CheckDefinition>,
    latches: Latches,
    state: ChecksState,
}

impl CheckEngine {
    /// Engine with the standard four-check list.
    pub fn new(config: LivenessConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let definitions = CheckDefinition::standard();
        let state = ChecksState::initial(&definitions);
        Ok(Self {
            config,
            definitions,
            latches: Latches::default(),
            state,
        })
    }

    pub fn config(&self) -> &LivenessConfig {
        &self.config
    }

    pub fn definitions(&self) -> &[CheckDefinition] {
        &self.definitions
    }

    pub fn state(&self) -> &ChecksState {
        &self.state
    }

    pub fn latches(&self) -> Latches {
        self.latches
    }

    /// Reduce a frame's faces and process the result.
    pub fn process_faces(&mut self, faces: Vec<FaceObservation>) -> FrameOutcome {
        let detection = Detection::from_faces(faces, self.config.max_faces);
        self.process(detection)
    }

    /// Advance the state machine by one frame.
    pub fn process(&mut self, detection: Detection) -> FrameOutcome {
        let signals = match &detection {
            Detection::NoFace => None,
            Detection::Observation(face) => Some(self.observe(face)),
        };

        let latches = self.latches;
        let min_blinks = self.config.min_closed_eye_frames;
        let state = match signals {
            None => ChecksState::evaluate(&self.definitions, |_| false, latches),
            Some(s) => ChecksState::evaluate(
                &self.definitions,
                |kind| match kind {
                    CheckKind::FaceDetected => s.face_positioned,
                    CheckKind::FaceInRange => s.face_in_range,
                    CheckKind::FaceStraight => s.looking_straight,
                    CheckKind::EyesBlinked => latches.blink_count >= min_blinks,
                },
                latches,
            ),
        };

        let detected = state.is_met(CheckKind::FaceDetected)
            && state.is_met(CheckKind::EyesBlinked)
            && state.is_met(CheckKind::FaceStraight)
            && state.is_met(CheckKind::FaceInRange);

        match signals {
            Some(s) => tracing::debug!(
                positioned = s.face_positioned,
                in_range = s.face_in_range,
                not_far = s.face_not_far_away,
                straight = s.looking_straight,
                eyes_open = s.eyes_open,
                pitch_ok = s.head_pitch_valid,
                blink_count = latches.blink_count,
                turned_left = latches.has_turned_left,
                turned_right = latches.has_turned_right,
                sweep = state.sweep_angle,
                detected,
                "frame evaluated"
            ),
            None => tracing::debug!(blink_count = latches.blink_count, "no usable face"),
        }

        self.state = state.clone();
        FrameOutcome {
            detected,
            signals,
            state,
        }
    }

    /// Zero the latches and return to the initial snapshot.
    pub fn reset(&mut self) {
        self.latches = Latches::default();
        self.state = ChecksState::initial(&self.definitions);
        tracing::info!("liveness attempt reset");
    }

    /// Derive the frame signals and advance the latches.
    fn observe(&mut self, face: &FaceObservation) -> FrameSignals {
        let cfg = &self.config;

        // Counts closed-eye frames, not open/closed transitions.
        let eyes_open = face.eyes_open(cfg.eye_open_threshold);
        if !eyes_open {
            self.latches.blink_count = self.latches.blink_count.saturating_add(1);
        }

        let face_not_far_away = cfg.not_far_band.contains(face.bbox_width, face.bbox_height);
        let face_in_range = cfg.in_range_band.contains(face.bbox_width, face.bbox_height);

        // Both can be true across a short pan; they are latched independently.
        let turned_right = face.head_yaw > cfg.turn_threshold_deg;
        let turned_left = face.head_yaw < cfg.turn_threshold_deg;
        let looking_straight = face.head_yaw.abs() <= cfg.straight_yaw_deg;
        self.latches.has_turned_left |= turned_left;
        self.latches.has_turned_right |= turned_right;

        let head_pitch_valid = face.head_pitch.abs() <= cfg.pitch_limit_deg;

        let oval = cfg.oval;
        let face_positioned = center_within_tolerance(
            face.bbox_center,
            &oval,
            cfg.center_tolerance_x,
            cfg.center_tolerance_y,
        ) && all_landmarks_inside(face, &cfg.required_landmarks, |p| oval.contains(p));

        FrameSignals {
            face_positioned,
            face_not_far_away,
            face_in_range,
            turned_left,
            turned_right,
            looking_straight,
            eyes_open,
            head_pitch_valid,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::{LandmarkKind, Point};
    use std::collections::BTreeMap;

    /// A face that satisfies every geometric check under the default config.
    pub(crate) fn centered_face(yaw: f32, eye_open: f32) -> FaceObservation {
        let center = LivenessConfig::default().oval.center;
        let mut landmarks = BTreeMap::new();
        landmarks.insert(LandmarkKind::NoseBase, center);
        landmarks.insert(LandmarkKind::LeftEye, Point::new(center.x - 40.0, center.y - 40.0));
        landmarks.insert(LandmarkKind::RightEye, Point::new(center.x + 40.0, center.y - 40.0));
        landmarks.insert(LandmarkKind::MouthBottom, Point::new(center.x, center.y + 60.0));
        landmarks.insert(LandmarkKind::MouthLeft, Point::new(center.x - 30.0, center.y + 50.0));
        landmarks.insert(LandmarkKind::MouthRight, Point::new(center.x + 30.0, center.y + 50.0));
        FaceObservation {
            bbox_center: center,
            bbox_width: 190.0,
            bbox_height: 200.0,
            landmarks,
            left_eye_open_probability: Some(eye_open),
            right_eye_open_probability: Some(eye_open),
            head_yaw: yaw,
            head_pitch: 0.0,
        }
    }

    fn engine() -> CheckEngine {
        CheckEngine::new(LivenessConfig::default()).unwrap()
    }

    fn feed(engine: &mut CheckEngine, face: FaceObservation) -> FrameOutcome {
        engine.process(Detection::Observation(face))
    }

    #[test]
    fn test_turn_right_latches_and_stays() {
        let mut e = engine();
        let yaws = [-4.0f32, -3.5, -1.0, 2.0, 6.0, 10.0];
        let mut latched_at = None;
        for (i, yaw) in yaws.iter().enumerate() {
            feed(&mut e, centered_face(*yaw, 0.9));
            if latched_at.is_none() && e.latches().has_turned_right {
                latched_at = Some(i);
            }
            if let Some(first) = latched_at {
                assert!(i >= first);
                assert!(e.latches().has_turned_right, "latch dropped at yaw {yaw}");
            }
        }
        // -4.0 is not strictly greater than the pivot.
        assert_eq!(latched_at, Some(1));
        assert!(!e.latches().has_turned_left, "yaw never went below the pivot");
    }

    #[test]
    fn test_short_pan_latches_both_directions() {
        let mut e = engine();
        feed(&mut e, centered_face(-8.0, 0.9));
        feed(&mut e, centered_face(3.0, 0.9));
        assert!(e.latches().has_turned_left);
        assert!(e.latches().has_turned_right);
    }

    #[test]
    fn test_no_face_frame_keeps_latches() {
        let mut e = engine();
        feed(&mut e, centered_face(-8.0, 0.1));
        let before = e.latches();
        let out = e.process(Detection::NoFace);
        assert!(!out.state.all_checks_passed);
        assert!(!out.detected);
        assert!(out.signals.is_none());
        assert_eq!(e.latches(), before);
        assert_eq!(out.state.latches, before);
        assert!(out.state.checks.iter().all(|c| !c.is_met));
    }

    #[test]
    fn test_too_many_faces_is_no_face() {
        let mut e = engine();
        let faces = vec![
            centered_face(0.0, 0.1),
            centered_face(0.0, 0.1),
            centered_face(0.0, 0.1),
        ];
        let out = e.process_faces(faces);
        assert!(out.signals.is_none());
        assert_eq!(e.latches().blink_count, 0, "ignored frames must not advance latches");
    }

    #[test]
    fn test_blink_check_needs_two_closed_frames() {
        let mut e = engine();
        let out = feed(&mut e, centered_face(0.0, 0.4));
        assert_eq!(e.latches().blink_count, 1);
        assert!(!out.state.is_met(CheckKind::EyesBlinked));

        let out = feed(&mut e, centered_face(0.0, 0.9));
        assert!(!out.state.is_met(CheckKind::EyesBlinked));

        let out = feed(&mut e, centered_face(0.0, 0.2));
        assert_eq!(e.latches().blink_count, 2);
        assert!(out.state.is_met(CheckKind::EyesBlinked));
    }

    #[test]
    fn test_one_closed_eye_counts() {
        let mut e = engine();
        let mut face = centered_face(0.0, 0.9);
        face.left_eye_open_probability = Some(0.1);
        feed(&mut e, face);
        assert_eq!(e.latches().blink_count, 1);
    }

    #[test]
    fn test_sequential_gating_with_out_of_range_face() {
        let mut e = engine();
        let mut face = centered_face(0.0, 0.1);
        face.bbox_width = 400.0;
        feed(&mut e, face.clone());
        let out = feed(&mut e, face);
        assert!(out.state.is_met(CheckKind::FaceDetected));
        assert!(!out.state.is_met(CheckKind::FaceInRange));
        assert!(out.state.is_met(CheckKind::FaceStraight));
        assert!(out.state.is_met(CheckKind::EyesBlinked));
        assert_eq!(out.state.contribution(CheckKind::FaceStraight), 0.0);
        assert_eq!(out.state.contribution(CheckKind::EyesBlinked), 0.0);
        assert_eq!(out.state.sweep_angle, 90.0);
        assert!(!out.detected);
    }

    #[test]
    fn test_missing_landmark_fails_position() {
        let mut e = engine();
        let mut face = centered_face(0.0, 0.9);
        face.landmarks.remove(&LandmarkKind::MouthBottom);
        let out = feed(&mut e, face);
        assert!(!out.state.is_met(CheckKind::FaceDetected));
        assert_eq!(out.state.sweep_angle, 0.0);
    }

    #[test]
    fn test_off_center_face_fails_position() {
        let mut e = engine();
        let mut face = centered_face(0.0, 0.9);
        // Tolerance is 20% of 150 = 30 px.
        face.bbox_center.x += 31.0;
        let out = feed(&mut e, face);
        assert!(!out.signals.unwrap().face_positioned);
    }

    #[test]
    fn test_retake_restores_initial_snapshot() {
        let mut e = engine();
        feed(&mut e, centered_face(-9.0, 0.1));
        feed(&mut e, centered_face(5.0, 0.1));
        assert_ne!(e.latches(), Latches::default());

        e.reset();
        assert_eq!(e.latches(), Latches::default());
        assert_eq!(*e.state(), ChecksState::initial(e.definitions()));

        e.reset();
        assert_eq!(*e.state(), ChecksState::initial(e.definitions()));
    }

    #[test]
    fn test_three_frame_scenario_does_not_pass_yet() {
        let mut e = engine();
        let first = feed(&mut e, centered_face(0.0, 0.9));
        assert!(!first.state.all_checks_passed);
        feed(&mut e, centered_face(0.0, 0.1));
        let third = feed(&mut e, centered_face(0.0, 0.9));
        assert_eq!(e.latches().blink_count, 1);
        assert!(!third.state.all_checks_passed);
        assert!(!third.detected);
        assert_eq!(third.state.sweep_angle, 270.0);

        let fourth = feed(&mut e, centered_face(0.0, 0.1));
        assert_eq!(e.latches().blink_count, 2);
        assert!(fourth.state.all_checks_passed);
        assert!(fourth.detected);
        assert!(fourth.state.is_complete());
        assert_eq!(fourth.state.current_guide_message, crate::checks::ALL_CHECKS_PASSED_MESSAGE);
    }

    #[test]
    fn test_gate_ignores_turn_latches() {
        let mut e = engine();
        // Yaw stays exactly on the pivot: neither turn latch is ever set.
        feed(&mut e, centered_face(-4.0, 0.1));
        let out = feed(&mut e, centered_face(-4.0, 0.1));
        assert!(!e.latches().has_turned_left);
        assert!(!e.latches().has_turned_right);
        assert!(out.detected);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut cfg = LivenessConfig::default();
        cfg.max_faces = 0;
        assert!(CheckEngine::new(cfg).is_err());
    }
}
