//! livecheck-hw - Camera boundary types.
//!
//! Frames arrive from the platform camera wrapped in a [`CameraFrame`] lease
//! whose release hook runs exactly once. Still captures come back through the
//! [`CaptureSink`] trait as an encoded image plus rotation and lens metadata.

pub mod capture;
pub mod frame;

pub use capture::{CaptureError, CaptureSink, RawCapture};
pub use frame::{CameraFrame, Frame, FrameError, LensFacing, ReleaseHook};
