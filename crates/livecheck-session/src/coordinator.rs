//! Capture coordinator: watches check snapshots, fires the gate, runs the
//! capture pipeline off the executor and publishes the gate status.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use image::DynamicImage;
use livecheck_core::capture::{process_capture, validate_capture};
use livecheck_core::{DetectorAdapter, FaceClassifier, LivenessConfig};
use livecheck_hw::CaptureSink;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinSet;

use crate::analyzer::AnalysisSnapshot;
use crate::gate::{CaptureGate, CaptureOutcome, CaptureTicket, GatePhase};

pub(crate) type SharedValidator = Arc<Mutex<DetectorAdapter<Box<dyn FaceClassifier>>>>;

/// Observable gate state for the UI layer.
#[derive(Debug, Clone, Default)]
pub struct GateStatus {
    pub phase: GatePhase,
    /// Last user-visible message, e.g. "Invalid image".
    pub message: Option<String>,
    /// The accepted still, present only in [`GatePhase::Captured`].
    pub captured: Option<Arc<DynamicImage>>,
}

pub(crate) enum GateCommand {
    Reset { reply: oneshot::Sender<()> },
}

/// What the blocking capture pipeline produced.
enum PipelineResult {
    Accepted(DynamicImage),
    Failed(String),
    Invalid,
}

pub(crate) struct CaptureCoordinator {
    pub(crate) gate: CaptureGate,
    pub(crate) sink: Arc<dyn CaptureSink>,
    pub(crate) validator: Option<SharedValidator>,
    pub(crate) liveness: LivenessConfig,
    pub(crate) capture_delay: Duration,
    pub(crate) status: watch::Sender<GateStatus>,
}

impl CaptureCoordinator {
    /// Drive the gate until the snapshot source or the command channel closes.
    ///
    /// Pending captures live in a `JoinSet` owned by this future, so aborting
    /// the coordinator task also aborts a capture still in its settle delay.
    pub(crate) async fn run(
        mut self,
        mut snapshots: watch::Receiver<AnalysisSnapshot>,
        mut commands: mpsc::Receiver<GateCommand>,
    ) {
        let mut captures: JoinSet<(CaptureTicket, PipelineResult)> = JoinSet::new();
        tracing::info!("capture coordinator started");

        loop {
            tokio::select! {
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let sweep = snapshots.borrow_and_update().state.sweep_angle;
                    if let Some(ticket) = self.gate.observe(sweep) {
                        tracing::info!(
                            delay_ms = self.capture_delay.as_millis() as u64,
                            "all checks passed; capture requested"
                        );
                        self.publish(None);
                        self.start_capture(&mut captures, ticket);
                    }
                }
                Some(joined) = captures.join_next() => match joined {
                    Ok((ticket, result)) => self.finish(ticket, result),
                    Err(err) if err.is_cancelled() => {
                        tracing::debug!("pending capture cancelled");
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "capture task failed");
                    }
                },
                command = commands.recv() => match command {
                    Some(GateCommand::Reset { reply }) => {
                        if !captures.is_empty() {
                            tracing::info!("retake: cancelling pending capture");
                            captures.abort_all();
                        }
                        self.gate.reset();
                        self.publish(None);
                        tracing::info!("capture gate reset");
                        let _ = reply.send(());
                    }
                    None => break,
                },
            }
        }
        captures.abort_all();
        tracing::info!("capture coordinator exiting");
    }

    fn start_capture(
        &self,
        captures: &mut JoinSet<(CaptureTicket, PipelineResult)>,
        ticket: CaptureTicket,
    ) {
        let sink = Arc::clone(&self.sink);
        let validator = self.validator.clone();
        let liveness = self.liveness.clone();
        let delay = self.capture_delay;

        captures.spawn(async move {
            tokio::time::sleep(delay).await;
            let result = tokio::task::spawn_blocking(move || {
                run_pipeline(sink.as_ref(), validator.as_ref(), &liveness)
            })
            .await
            .unwrap_or_else(|err| PipelineResult::Failed(format!("capture task failed: {err}")));
            (ticket, result)
        });
    }

    fn finish(&mut self, ticket: CaptureTicket, result: PipelineResult) {
        let (outcome, image) = match result {
            PipelineResult::Accepted(image) => (CaptureOutcome::Accepted, Some(Arc::new(image))),
            PipelineResult::Failed(reason) => (CaptureOutcome::Failed(reason), None),
            PipelineResult::Invalid => (CaptureOutcome::InvalidImage, None),
        };

        if !self.gate.complete(ticket, &outcome) {
            tracing::debug!("discarding capture result from a previous attempt");
            return;
        }
        match &outcome {
            CaptureOutcome::Accepted => tracing::info!("capture accepted"),
            CaptureOutcome::Failed(reason) => tracing::warn!(reason = %reason, "capture failed"),
            CaptureOutcome::InvalidImage => tracing::warn!("captured image failed validation"),
        }
        self.publish(image);
    }

    fn publish(&self, captured: Option<Arc<DynamicImage>>) {
        self.status.send_replace(GateStatus {
            phase: self.gate.phase(),
            message: self.gate.message().map(str::to_owned),
            captured,
        });
    }
}

fn run_pipeline(
    sink: &dyn CaptureSink,
    validator: Option<&SharedValidator>,
    liveness: &LivenessConfig,
) -> PipelineResult {
    let raw = match sink.take_picture() {
        Ok(raw) => raw,
        Err(err) => return PipelineResult::Failed(err.to_string()),
    };
    let image = match process_capture(&raw) {
        Ok(image) => image,
        Err(err) => return PipelineResult::Failed(err.to_string()),
    };
    if let Some(validator) = validator {
        let mut adapter = validator.lock().unwrap_or_else(PoisonError::into_inner);
        if !validate_capture(&mut *adapter, &image, liveness) {
            return PipelineResult::Invalid;
        }
    }
    PipelineResult::Accepted(image)
}
