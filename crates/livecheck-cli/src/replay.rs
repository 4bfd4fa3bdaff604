//! Replay recorded classifier output through the check engine.
//!
//! Input is JSON Lines: one array of detected faces per analyzed frame.

use std::io::BufRead;

use anyhow::{Context, Result};
use livecheck_core::{CheckEngine, DetectedFace, FaceObservation, FrameOutcome, LivenessConfig};
use livecheck_session::CaptureGate;

/// One replayed frame.
pub struct ReplayStep {
    pub frame: usize,
    pub outcome: FrameOutcome,
    /// The capture gate would have fired on this frame.
    pub capture: bool,
}

pub fn replay<R: BufRead>(input: R, config: LivenessConfig) -> Result<Vec<ReplayStep>> {
    let mut engine = CheckEngine::new(config)?;
    let mut gate = CaptureGate::new();
    let mut steps = Vec::new();

    for (index, line) in input.lines().enumerate() {
        let line = line.context("failed to read replay input")?;
        if line.trim().is_empty() {
            continue;
        }
        let faces: Vec<DetectedFace> = serde_json::from_str(&line)
            .with_context(|| format!("line {}: expected a JSON array of faces", index + 1))?;
        let observations = faces.into_iter().map(FaceObservation::from).collect();
        let outcome = engine.process_faces(observations);
        let capture = gate.observe(outcome.state.sweep_angle).is_some();
        steps.push(ReplayStep {
            frame: steps.len() + 1,
            outcome,
            capture,
        });
    }

    tracing::debug!(frames = steps.len(), "replay finished");
    Ok(steps)
}

pub fn print_step(step: &ReplayStep) {
    let state = &step.outcome.state;
    println!(
        "frame {:>4}  sweep {:>5.1}  blinks {}  left {:<5}  right {:<5}  {}{}",
        step.frame,
        state.sweep_angle,
        state.latches.blink_count,
        state.latches.has_turned_left,
        state.latches.has_turned_right,
        state.current_guide_message,
        if step.capture { "  [capture]" } else { "" },
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const CENTERED: &str = r#"{
        "bounding_box": {"left": 145, "top": 220, "right": 335, "bottom": 420},
        "landmarks": [
            {"kind": "nose_base", "x": 240, "y": 320},
            {"kind": "left_eye", "x": 200, "y": 280},
            {"kind": "right_eye", "x": 280, "y": 280},
            {"kind": "mouth_bottom", "x": 240, "y": 380}
        ],
        "left_eye_open_probability": 0.1,
        "right_eye_open_probability": 0.1
    }"#;

    fn lines(frames: &[&str]) -> String {
        frames
            .iter()
            .map(|f| f.replace('\n', ""))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_replay_reaches_capture_on_second_closed_frame() {
        let face = format!("[{CENTERED}]");
        let input = lines(&[&face, "", &face, &face]);
        let steps = replay(input.as_bytes(), LivenessConfig::default()).unwrap();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].outcome.state.sweep_angle, 270.0);
        assert!(!steps[0].capture);
        assert!(steps[1].capture);
        assert!(!steps[2].capture, "gate fires once");
    }

    #[test]
    fn test_empty_frame_is_no_face() {
        let steps = replay("[]".as_bytes(), LivenessConfig::default()).unwrap();
        assert!(steps[0].outcome.signals.is_none());
        assert_eq!(steps[0].outcome.state.sweep_angle, 0.0);
    }

    #[test]
    fn test_malformed_line_reports_position() {
        let err = replay("[]\n{oops".as_bytes(), LivenessConfig::default())
            .err()
            .unwrap();
        assert!(format!("{err:#}").contains("line 2"));
    }
}
