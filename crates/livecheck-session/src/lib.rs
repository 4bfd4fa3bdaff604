//! livecheck-session - Runtime for one guided face-capture screen.
//!
//! Frames enter through a throttled, keep-only-latest intake and are analyzed
//! one at a time on a dedicated worker thread that owns the check engine.
//! Each analyzed frame publishes a complete snapshot on a `watch` channel.
//! A coordinator task watches those snapshots, fires the capture gate when
//! the progress arc closes, and publishes the gate status on a second channel.

pub mod analyzer;
pub mod config;
pub mod coordinator;
pub mod gate;
pub mod scheduler;
pub mod session;

pub use analyzer::AnalysisSnapshot;
pub use config::{SessionConfig, SessionConfigError};
pub use coordinator::GateStatus;
pub use gate::{CaptureGate, CaptureOutcome, CaptureTicket, GatePhase};
pub use scheduler::{Admission, FrameScheduler};
pub use session::{LivenessSession, SessionError};
