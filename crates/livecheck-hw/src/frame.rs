//! Frame type and the release-once lease used by the analysis pipeline.

use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::time::Instant;

/// Which physical lens produced a frame or capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LensFacing {
    /// Selfie camera. Stills from it are mirrored before use.
    #[default]
    Front,
    Back,
}

impl LensFacing {
    /// The other lens.
    pub fn toggled(self) -> Self {
        match self {
            LensFacing::Front => LensFacing::Back,
            LensFacing::Back => LensFacing::Front,
        }
    }
}

/// A grayscale camera frame with its orientation metadata.
#[derive(Clone)]
pub struct Frame {
    /// Grayscale pixel data (width * height bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Clockwise rotation the consumer must apply to get an upright image.
    pub rotation_degrees: u32,
    pub lens: LensFacing,
    pub timestamp: Instant,
    pub sequence: u64,
}

impl Frame {
    /// Wrap a grayscale buffer, checking that it covers `width * height` pixels.
    pub fn from_grayscale(data: Vec<u8>, width: u32, height: u32) -> Result<Self, FrameError> {
        let expected = (width as usize) * (height as usize);
        if data.len() < expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            rotation_degrees: 0,
            lens: LensFacing::default(),
            timestamp: Instant::now(),
            sequence: 0,
        })
    }

    pub fn with_rotation(mut self, rotation_degrees: u32) -> Self {
        self.rotation_degrees = rotation_degrees % 360;
        self
    }

    pub fn with_lens(mut self, lens: LensFacing) -> Self {
        self.lens = lens;
        self
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }
}

/// Callback that hands the underlying buffer back to the camera.
pub type ReleaseHook = Box<dyn FnOnce() -> Result<(), FrameError> + Send>;

/// A frame on loan from the camera.
///
/// The release hook runs exactly once: either through [`CameraFrame::release`]
/// or, failing that, when the lease is dropped. A failing hook is logged and
/// swallowed.
pub struct CameraFrame {
    frame: Frame,
    release: Option<ReleaseHook>,
}

impl CameraFrame {
    /// A lease with nothing to hand back (decoded stills, tests).
    pub fn new(frame: Frame) -> Self {
        Self {
            frame,
            release: None,
        }
    }

    pub fn with_release(frame: Frame, release: ReleaseHook) -> Self {
        Self {
            frame,
            release: Some(release),
        }
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Return the buffer to the camera now.
    pub fn release(mut self) {
        self.run_release();
    }

    fn run_release(&mut self) {
        if let Some(hook) = self.release.take() {
            if let Err(err) = hook() {
                tracing::warn!(seq = self.frame.sequence, error = %err, "frame release failed");
            }
        }
    }
}

impl Deref for CameraFrame {
    type Target = Frame;

    fn deref(&self) -> &Frame {
        &self.frame
    }
}

impl Drop for CameraFrame {
    fn drop(&mut self) {
        self.run_release();
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("frame release failed: {0}")]
    ReleaseFailed(String),
}
