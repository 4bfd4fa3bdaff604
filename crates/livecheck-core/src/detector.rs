//! Detector adapter: wraps a black-box face classifier.
//!
//! The classifier itself (an on-device model, a platform vision API) lives
//! outside this crate behind [`FaceClassifier`]. The adapter normalizes its
//! output into [`FaceObservation`]s and owns the frame lease for the duration
//! of one call, returning it to the camera on every path.

use crate::types::{FaceObservation, LandmarkKind, Point};
use livecheck_hw::{CameraFrame, Frame};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("classifier not ready: {0}")]
    NotReady(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("classifier timed out")]
    Timeout,
}

/// Face rectangle as reported by the classifier (edges, not origin + size).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceRect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

/// One landmark as reported by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawLandmark {
    pub kind: LandmarkKind,
    pub x: f32,
    pub y: f32,
}

/// Raw per-face classifier result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedFace {
    pub bounding_box: FaceRect,
    #[serde(default)]
    pub landmarks: Vec<RawLandmark>,
    #[serde(default)]
    pub left_eye_open_probability: Option<f32>,
    #[serde(default)]
    pub right_eye_open_probability: Option<f32>,
    /// Head rotation around the vertical axis, degrees.
    #[serde(default)]
    pub head_euler_y: f32,
    /// Head rotation around the horizontal axis, degrees.
    #[serde(default)]
    pub head_euler_x: f32,
}

/// Black-box face/landmark classifier.
///
/// Called synchronously from the analysis worker; one call at a time.
pub trait FaceClassifier: Send {
    fn classify(&mut self, frame: &Frame) -> Result<Vec<DetectedFace>, ClassifierError>;
}

impl<C: FaceClassifier + ?Sized> FaceClassifier for Box<C> {
    fn classify(&mut self, frame: &Frame) -> Result<Vec<DetectedFace>, ClassifierError> {
        (**self).classify(frame)
    }
}

impl From<DetectedFace> for FaceObservation {
    fn from(face: DetectedFace) -> Self {
        let rect = face.bounding_box;
        let width = (rect.right - rect.left).abs();
        let height = (rect.bottom - rect.top).abs();
        let center = Point::new((rect.left + rect.right) / 2.0, (rect.top + rect.bottom) / 2.0);

        let landmarks: BTreeMap<LandmarkKind, Point> = face
            .landmarks
            .iter()
            .filter(|lm| lm.x.is_finite() && lm.y.is_finite())
            .map(|lm| (lm.kind, Point::new(lm.x, lm.y)))
            .collect();

        FaceObservation {
            bbox_center: center,
            bbox_width: width,
            bbox_height: height,
            landmarks,
            left_eye_open_probability: normalize_probability(face.left_eye_open_probability),
            right_eye_open_probability: normalize_probability(face.right_eye_open_probability),
            head_yaw: face.head_euler_y,
            head_pitch: face.head_euler_x,
        }
    }
}

fn normalize_probability(p: Option<f32>) -> Option<f32> {
    p.filter(|v| v.is_finite()).map(|v| v.clamp(0.0, 1.0))
}

/// Stateless translation layer between a classifier and the check engine.
pub struct DetectorAdapter<C> {
    classifier: C,
}

impl<C: FaceClassifier> DetectorAdapter<C> {
    pub fn new(classifier: C) -> Self {
        Self { classifier }
    }

    /// Classify one camera frame and release it.
    ///
    /// Never fails: a classifier error or panic is logged and reported as an
    /// empty result, which downstream logic cannot tell apart from "no face".
    /// The frame lease is released exactly once on every path.
    pub fn analyze(&mut self, frame: CameraFrame) -> Vec<FaceObservation> {
        let sequence = frame.sequence;
        let classifier = &mut self.classifier;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| classifier.classify(frame.frame())));
        frame.release();

        match outcome {
            Ok(Ok(faces)) => {
                tracing::trace!(seq = sequence, faces = faces.len(), "classifier returned");
                faces.into_iter().map(FaceObservation::from).collect()
            }
            Ok(Err(err)) => {
                tracing::warn!(seq = sequence, error = %err, "classifier failed; treating frame as no face");
                Vec::new()
            }
            Err(_) => {
                tracing::warn!(seq = sequence, "classifier panicked; treating frame as no face");
                Vec::new()
            }
        }
    }

    /// Classify a frame the caller keeps ownership of, surfacing errors.
    pub fn observe(&mut self, frame: &Frame) -> Result<Vec<FaceObservation>, ClassifierError> {
        let classifier = &mut self.classifier;
        match panic::catch_unwind(AssertUnwindSafe(|| classifier.classify(frame))) {
            Ok(result) => Ok(result?.into_iter().map(FaceObservation::from).collect()),
            Err(_) => Err(ClassifierError::InferenceFailed("classifier panicked".into())),
        }
    }

    pub fn classifier_mut(&mut self) -> &mut C {
        &mut self.classifier
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Classifier returning a scripted result per call.
    pub(crate) struct ScriptedClassifier {
        pub script: Vec<Result<Vec<DetectedFace>, ClassifierError>>,
        pub calls: usize,
    }

    impl FaceClassifier for ScriptedClassifier {
        fn classify(&mut self, _frame: &Frame) -> Result<Vec<DetectedFace>, ClassifierError> {
            self.calls += 1;
            if self.script.is_empty() {
                return Ok(Vec::new());
            }
            self.script.remove(0)
        }
    }

    struct PanickingClassifier;

    impl FaceClassifier for PanickingClassifier {
        fn classify(&mut self, _frame: &Frame) -> Result<Vec<DetectedFace>, ClassifierError> {
            panic!("model exploded");
        }
    }

    pub(crate) fn raw_face(yaw: f32) -> DetectedFace {
        DetectedFace {
            bounding_box: FaceRect {
                left: 10.0,
                top: 20.0,
                right: 110.0,
                bottom: 140.0,
            },
            landmarks: vec![RawLandmark {
                kind: LandmarkKind::NoseBase,
                x: 60.0,
                y: 80.0,
            }],
            left_eye_open_probability: Some(0.9),
            right_eye_open_probability: Some(1.3),
            head_euler_y: yaw,
            head_euler_x: 2.0,
        }
    }

    fn counted_frame(counter: &Arc<AtomicUsize>) -> CameraFrame {
        let counter = Arc::clone(counter);
        let frame = Frame::from_grayscale(vec![0u8; 16], 4, 4).unwrap();
        CameraFrame::with_release(
            frame,
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        )
    }

    #[test]
    fn test_normalizes_bounding_box_and_probabilities() {
        let obs = FaceObservation::from(raw_face(5.0));
        assert_eq!(obs.bbox_center, Point::new(60.0, 80.0));
        assert_eq!(obs.bbox_width, 100.0);
        assert_eq!(obs.bbox_height, 120.0);
        assert_eq!(obs.right_eye_open_probability, Some(1.0));
        assert_eq!(obs.head_yaw, 5.0);
        assert_eq!(obs.head_pitch, 2.0);
        assert_eq!(obs.landmark(LandmarkKind::NoseBase), Some(Point::new(60.0, 80.0)));
        assert_eq!(obs.landmark(LandmarkKind::LeftEye), None);
    }

    #[test]
    fn test_nan_probability_becomes_absent() {
        let mut face = raw_face(0.0);
        face.left_eye_open_probability = Some(f32::NAN);
        let obs = FaceObservation::from(face);
        assert_eq!(obs.left_eye_open_probability, None);
    }

    #[test]
    fn test_analyze_success_releases_once() {
        let released = Arc::new(AtomicUsize::new(0));
        let mut adapter = DetectorAdapter::new(ScriptedClassifier {
            script: vec![Ok(vec![raw_face(0.0)])],
            calls: 0,
        });
        let faces = adapter.analyze(counted_frame(&released));
        assert_eq!(faces.len(), 1);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_analyze_error_is_empty_and_releases_once() {
        let released = Arc::new(AtomicUsize::new(0));
        let mut adapter = DetectorAdapter::new(ScriptedClassifier {
            script: vec![Err(ClassifierError::Timeout)],
            calls: 0,
        });
        assert!(adapter.analyze(counted_frame(&released)).is_empty());
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_analyze_panic_is_empty_and_releases_once() {
        let released = Arc::new(AtomicUsize::new(0));
        let mut adapter = DetectorAdapter::new(PanickingClassifier);
        assert!(adapter.analyze(counted_frame(&released)).is_empty());
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_analyze_zero_faces_releases_once() {
        let released = Arc::new(AtomicUsize::new(0));
        let mut adapter = DetectorAdapter::new(ScriptedClassifier {
            script: vec![Ok(vec![])],
            calls: 0,
        });
        assert!(adapter.analyze(counted_frame(&released)).is_empty());
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_observe_surfaces_errors() {
        let mut adapter = DetectorAdapter::new(ScriptedClassifier {
            script: vec![Err(ClassifierError::NotReady("warming up".into()))],
            calls: 0,
        });
        let frame = Frame::from_grayscale(vec![0u8; 1], 1, 1).unwrap();
        assert!(adapter.observe(&frame).is_err());
        assert_eq!(adapter.classifier_mut().calls, 1);
    }

    #[test]
    fn test_detected_face_json_defaults() {
        let face: DetectedFace = serde_json::from_str(
            r#"{ "bounding_box": { "left": 0, "top": 0, "right": 10, "bottom": 10 } }"#,
        )
        .unwrap();
        assert!(face.landmarks.is_empty());
        assert_eq!(face.left_eye_open_probability, None);
        assert_eq!(face.head_euler_y, 0.0);
    }
}
