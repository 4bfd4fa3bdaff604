//! Post-capture processing: mirror, rotate, square-crop, re-validate.

use crate::config::LivenessConfig;
use crate::detector::{DetectorAdapter, FaceClassifier};
use crate::types::FaceObservation;
use image::DynamicImage;
use livecheck_hw::{Frame, LensFacing, RawCapture};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("failed to decode capture: {0}")]
    Decode(#[from] image::ImageError),
    #[error("unsupported rotation: {0} degrees (must be a multiple of 90)")]
    UnsupportedRotation(u32),
    #[error("captured image is empty")]
    EmptyImage,
}

/// Decode a raw still and orient it for display.
pub fn process_capture(raw: &RawCapture) -> Result<DynamicImage, ProcessError> {
    let decoded = image::load_from_memory(&raw.data)?;
    orient_and_crop(decoded, raw.rotation_degrees, raw.lens)
}

/// Mirror front-lens stills, apply the reported rotation, crop to a centered square.
pub fn orient_and_crop(
    image: DynamicImage,
    rotation_degrees: u32,
    lens: LensFacing,
) -> Result<DynamicImage, ProcessError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(ProcessError::EmptyImage);
    }

    let mirrored = match lens {
        LensFacing::Front => image.fliph(),
        LensFacing::Back => image,
    };

    let rotated = match rotation_degrees % 360 {
        0 => mirrored,
        90 => mirrored.rotate90(),
        180 => mirrored.rotate180(),
        270 => mirrored.rotate270(),
        other => return Err(ProcessError::UnsupportedRotation(other)),
    };

    Ok(center_crop_square(&rotated))
}

/// Largest centered square, sized by the shorter dimension.
pub fn center_crop_square(image: &DynamicImage) -> DynamicImage {
    let side = image.width().min(image.height());
    let x = (image.width() - side) / 2;
    let y = (image.height() - side) / 2;
    image.crop_imm(x, y, side, side)
}

/// Grayscale frame view of a processed still, for re-running the classifier.
pub fn to_frame(image: &DynamicImage) -> Frame {
    let luma = image.to_luma8();
    let (width, height) = luma.dimensions();
    Frame {
        data: luma.into_raw(),
        width,
        height,
        rotation_degrees: 0,
        lens: LensFacing::Back,
        timestamp: std::time::Instant::now(),
        sequence: 0,
    }
}

/// Feature completeness of a processed still.
///
/// Passes only if there is at least one face and every face has all required
/// landmarks, both eyes open and a yaw inside the validation window.
pub fn features_complete(faces: &[FaceObservation], config: &LivenessConfig) -> bool {
    !faces.is_empty()
        && faces.iter().all(|face| {
            config
                .validation
                .required_landmarks
                .iter()
                .all(|&kind| face.landmark(kind).is_some())
                && face.eyes_open(config.eye_open_threshold)
                && face.head_yaw.abs() <= config.validation.yaw_limit_deg
        })
}

/// Re-run the classifier on a processed still and check its features.
///
/// A classifier failure counts as an invalid image.
pub fn validate_capture<C: FaceClassifier>(
    adapter: &mut DetectorAdapter<C>,
    image: &DynamicImage,
    config: &LivenessConfig,
) -> bool {
    match adapter.observe(&to_frame(image)) {
        Ok(faces) => {
            let valid = features_complete(&faces, config);
            tracing::debug!(faces = faces.len(), valid, "capture re-validated");
            valid
        }
        Err(err) => {
            tracing::warn!(error = %err, "capture validation failed to classify");
            false
        }
    }
}
