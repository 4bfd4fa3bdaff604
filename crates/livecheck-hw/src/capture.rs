//! Still-capture boundary.

use crate::frame::LensFacing;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("capture failed: {0}")]
    CaptureFailed(String),
}

/// An encoded still as delivered by the platform camera.
#[derive(Debug, Clone)]
pub struct RawCapture {
    /// Encoded image bytes (JPEG or PNG).
    pub data: Vec<u8>,
    /// Clockwise rotation needed to make the still upright.
    pub rotation_degrees: u32,
    pub lens: LensFacing,
}

/// Takes a still picture on request.
///
/// Implementations block until the platform capture callback fires; callers
/// run them off the async executor.
pub trait CaptureSink: Send + Sync + 'static {
    fn take_picture(&self) -> Result<RawCapture, CaptureError>;
}
