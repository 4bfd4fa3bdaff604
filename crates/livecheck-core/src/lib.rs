//! livecheck-core - Face liveness check engine.
//!
//! Normalizes classifier output into [`FaceObservation`]s, evaluates the
//! ordered liveness checklist frame by frame, and post-processes the still
//! taken once every check has passed.

pub mod capture;
pub mod checks;
pub mod config;
pub mod detector;
pub mod engine;
pub mod geometry;
pub mod types;

pub use checks::{CheckDefinition, CheckKind, CheckRuntimeState, ChecksState, Latches};
pub use config::{ConfigError, LivenessConfig};
pub use detector::{ClassifierError, DetectedFace, DetectorAdapter, FaceClassifier};
pub use engine::{CheckEngine, FrameOutcome, FrameSignals};
pub use types::{Detection, FaceObservation, LandmarkKind, Point};
