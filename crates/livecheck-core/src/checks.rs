//! Check definitions and the published check-state snapshot.

use serde::{Deserialize, Serialize};

/// Degrees of a full progress arc.
pub const FULL_SWEEP_DEG: f32 = 360.0;

/// Guide message once every check is met.
pub const ALL_CHECKS_PASSED_MESSAGE: &str = "All checks passed";

/// The liveness checks, in the order the user must satisfy them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    FaceDetected,
    FaceInRange,
    FaceStraight,
    EyesBlinked,
}

impl CheckKind {
    pub const ORDERED: [CheckKind; 4] = [
        CheckKind::FaceDetected,
        CheckKind::FaceInRange,
        CheckKind::FaceStraight,
        CheckKind::EyesBlinked,
    ];

    pub fn guide_message(self) -> &'static str {
        match self {
            CheckKind::FaceDetected => "Ensure your face is fully visible",
            CheckKind::FaceInRange => "Move to a comfortable distance",
            CheckKind::FaceStraight => "Look directly at the camera",
            CheckKind::EyesBlinked => "Blink your eyes",
        }
    }
}

/// Static description of one check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CheckDefinition {
    pub kind: CheckKind,
    pub guide_message: &'static str,
    /// Arc degrees credited when this check and every earlier one are met.
    pub sweep_angle: f32,
}

impl CheckDefinition {
    /// The standard checklist, splitting the full arc evenly.
    pub fn standard() -> Vec<CheckDefinition> {
        let share = FULL_SWEEP_DEG / CheckKind::ORDERED.len() as f32;
        CheckKind::ORDERED
            .iter()
            .map(|&kind| CheckDefinition {
                kind,
                guide_message: kind.guide_message(),
                sweep_angle: share,
            })
            .collect()
    }
}

/// Per-check state recomputed each analyzed frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CheckRuntimeState {
    pub kind: CheckKind,
    pub is_met: bool,
    pub sweep_angle_contribution: f32,
}

/// Flags that outlive a single frame. Zeroed only by an explicit reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Latches {
    pub has_turned_left: bool,
    pub has_turned_right: bool,
    /// Frames in which the eyes were not both open. Never decremented.
    pub blink_count: u32,
}

/// Aggregate snapshot handed to observers.
///
/// Built in one piece and published whole; observers never see a
/// half-updated checklist.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChecksState {
    pub checks: Vec<CheckRuntimeState>,
    pub all_checks_passed: bool,
    pub current_guide_message: &'static str,
    /// Sum of the sequentially gated contributions.
    pub sweep_angle: f32,
    pub latches: Latches,
}

impl ChecksState {
    /// Nothing met, zero progress.
    pub fn initial(definitions: &[CheckDefinition]) -> Self {
        Self::evaluate(definitions, |_| false, Latches::default())
    }

    /// Build a snapshot from per-check met flags.
    ///
    /// A check only contributes its arc when every check before it is met too.
    pub fn evaluate<F>(definitions: &[CheckDefinition], is_met: F, latches: Latches) -> Self
    where
        F: Fn(CheckKind) -> bool,
    {
        let mut prefix_met = true;
        let mut sweep_angle = 0.0f32;
        let mut guide = None;

        let checks: Vec<CheckRuntimeState> = definitions
            .iter()
            .map(|def| {
                let met = is_met(def.kind);
                prefix_met &= met;
                let contribution = if prefix_met { def.sweep_angle } else { 0.0 };
                sweep_angle += contribution;
                if !met && guide.is_none() {
                    guide = Some(def.guide_message);
                }
                CheckRuntimeState {
                    kind: def.kind,
                    is_met: met,
                    sweep_angle_contribution: contribution,
                }
            })
            .collect();

        let all_checks_passed = checks.iter().all(|c| c.is_met);

        Self {
            checks,
            all_checks_passed,
            current_guide_message: guide.unwrap_or(ALL_CHECKS_PASSED_MESSAGE),
            sweep_angle,
            latches,
        }
    }

    pub fn is_met(&self, kind: CheckKind) -> bool {
        self.checks.iter().any(|c| c.kind == kind && c.is_met)
    }

    pub fn contribution(&self, kind: CheckKind) -> f32 {
        self.checks
            .iter()
            .find(|c| c.kind == kind)
            .map_or(0.0, |c| c.sweep_angle_contribution)
    }

    /// The arc is closed: every sequential check is satisfied.
    pub fn is_complete(&self) -> bool {
        self.sweep_angle >= FULL_SWEEP_DEG
    }
}
