//! Capture gate: one capture request per closed progress arc.

use livecheck_core::checks::FULL_SWEEP_DEG;
use serde::Serialize;

/// User-visible message for a still that failed feature re-validation.
pub const INVALID_IMAGE_MESSAGE: &str = "Invalid image";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum GatePhase {
    /// Waiting for the arc to close.
    #[default]
    Idle,
    /// A capture request is outstanding.
    Busy,
    /// A still was accepted; nothing fires again until reset.
    Captured,
}

/// Proof of a specific capture request. Completions carrying a ticket from
/// before the last reset are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureTicket {
    attempt: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Accepted,
    /// The platform capture or decode failed.
    Failed(String),
    /// The still did not pass feature re-validation.
    InvalidImage,
}

/// Edge-triggered gate over the aggregate sweep angle.
///
/// Fires when the sweep rises to a full circle while idle. After a failed
/// capture it re-arms only once the sweep has dropped below a full circle
/// again, so a user holding still does not trigger a capture loop.
pub struct CaptureGate {
    phase: GatePhase,
    armed: bool,
    attempt: u64,
    message: Option<String>,
}

impl Default for CaptureGate {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureGate {
    pub fn new() -> Self {
        Self {
            phase: GatePhase::Idle,
            armed: true,
            attempt: 0,
            message: None,
        }
    }

    pub fn phase(&self) -> GatePhase {
        self.phase
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Feed the latest sweep angle. Returns a ticket when a capture must start.
    pub fn observe(&mut self, sweep_angle: f32) -> Option<CaptureTicket> {
        if sweep_angle < FULL_SWEEP_DEG {
            self.armed = true;
            return None;
        }
        if self.phase != GatePhase::Idle || !self.armed {
            return None;
        }
        self.armed = false;
        self.phase = GatePhase::Busy;
        self.message = None;
        Some(CaptureTicket {
            attempt: self.attempt,
        })
    }

    /// Record how a capture request ended. Returns false for stale tickets.
    pub fn complete(&mut self, ticket: CaptureTicket, outcome: &CaptureOutcome) -> bool {
        if ticket.attempt != self.attempt || self.phase != GatePhase::Busy {
            return false;
        }
        match outcome {
            CaptureOutcome::Accepted => {
                self.phase = GatePhase::Captured;
                self.message = None;
            }
            CaptureOutcome::Failed(reason) => {
                self.phase = GatePhase::Idle;
                self.message = Some(reason.clone());
            }
            CaptureOutcome::InvalidImage => {
                self.phase = GatePhase::Idle;
                self.message = Some(INVALID_IMAGE_MESSAGE.to_string());
            }
        }
        true
    }

    /// Retake: forget any outstanding request and re-arm.
    pub fn reset(&mut self) {
        self.attempt += 1;
        self.phase = GatePhase::Idle;
        self.armed = true;
        self.message = None;
    }
}
