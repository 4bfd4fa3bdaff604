use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Instant;

use livecheck_core::{CheckEngine, ConfigError, DetectorAdapter, FaceClassifier};
use livecheck_hw::{CameraFrame, CaptureSink, LensFacing};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};

use crate::analyzer::{spawn_analyzer, AnalysisSnapshot, FrameIntake, WorkerCommand};
use crate::config::SessionConfig;
use crate::coordinator::{CaptureCoordinator, GateCommand, GateStatus};
use crate::gate::CaptureGate;
use crate::scheduler::{Admission, FrameScheduler};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("invalid liveness config: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to spawn analyzer thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("a session must be started inside a tokio runtime")]
    NoRuntime,
    #[error("session closed")]
    ChannelClosed,
}

/// One guided capture attempt, from first frame to accepted still.
///
/// Owns the analyzer thread and the capture coordinator task. Dropping the
/// session cancels both; pending frames are released and late results are
/// never published.
pub struct LivenessSession {
    intake: FrameIntake,
    worker_commands: crossbeam::channel::Sender<WorkerCommand>,
    gate_commands: mpsc::Sender<GateCommand>,
    snapshots: watch::Receiver<AnalysisSnapshot>,
    gate_status: watch::Receiver<GateStatus>,
    lens: Mutex<LensFacing>,
    worker: Option<JoinHandle<()>>,
    coordinator: tokio::task::JoinHandle<()>,
}

impl LivenessSession {
    /// Start a session.
    ///
    /// `classifier` runs on every admitted frame. `validator`, when present and
    /// enabled in `config`, re-checks the processed still before it is accepted.
    pub fn start(
        config: SessionConfig,
        classifier: Box<dyn FaceClassifier>,
        validator: Option<Box<dyn FaceClassifier>>,
        sink: Arc<dyn CaptureSink>,
    ) -> Result<Self, SessionError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| SessionError::NoRuntime)?;
        let engine = CheckEngine::new(config.liveness.clone())?;

        let analyzer = spawn_analyzer(classifier, engine, FrameScheduler::new(config.throttle))?;

        let validator = if config.validate_capture {
            validator.map(|v| Arc::new(Mutex::new(DetectorAdapter::new(v))))
        } else {
            None
        };
        let (status_tx, gate_status) = watch::channel(GateStatus::default());
        let (gate_commands, gate_rx) = mpsc::channel(4);
        let coordinator = CaptureCoordinator {
            gate: CaptureGate::new(),
            sink,
            validator,
            liveness: config.liveness,
            capture_delay: config.capture_delay,
            status: status_tx,
        };
        let coordinator = runtime.spawn(coordinator.run(analyzer.snapshots.clone(), gate_rx));

        tracing::info!(
            throttle_ms = config.throttle.as_millis() as u64,
            capture_delay_ms = config.capture_delay.as_millis() as u64,
            validate = config.validate_capture,
            "liveness session started"
        );

        Ok(Self {
            intake: analyzer.intake,
            worker_commands: analyzer.commands,
            gate_commands,
            snapshots: analyzer.snapshots,
            gate_status,
            lens: Mutex::new(LensFacing::default()),
            worker: Some(analyzer.thread),
            coordinator,
        })
    }

    /// Offer a camera frame. Frames that are not admitted are released at once.
    pub fn submit_frame(&self, frame: CameraFrame) -> Admission {
        self.submit_frame_at(frame, Instant::now())
    }

    pub fn submit_frame_at(&self, frame: CameraFrame, now: Instant) -> Admission {
        self.intake.submit(frame, now)
    }

    /// Latest check snapshot; a new value is published for every analyzed frame.
    pub fn checks(&self) -> watch::Receiver<AnalysisSnapshot> {
        self.snapshots.clone()
    }

    pub fn gate_status(&self) -> watch::Receiver<GateStatus> {
        self.gate_status.clone()
    }

    /// Frames admitted and dropped by the scheduler so far.
    pub fn frame_stats(&self) -> (u64, u64) {
        self.intake.stats()
    }

    pub fn lens(&self) -> LensFacing {
        *self.lens.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Zero every latch and counter and re-arm the capture gate.
    ///
    /// The engine reset is applied on the analyzer thread between frames, so
    /// it never interleaves with an analysis in progress.
    pub async fn retake(&self) -> Result<(), SessionError> {
        let (reply, done) = oneshot::channel();
        self.worker_commands
            .send(WorkerCommand::Reset { reply })
            .map_err(|_| SessionError::ChannelClosed)?;
        done.await.map_err(|_| SessionError::ChannelClosed)?;

        let (reply, done) = oneshot::channel();
        self.gate_commands
            .send(GateCommand::Reset { reply })
            .await
            .map_err(|_| SessionError::ChannelClosed)?;
        done.await.map_err(|_| SessionError::ChannelClosed)?;

        tracing::info!("retake: attempt restarted");
        Ok(())
    }

    /// Flip between front and back camera. Starts a fresh attempt.
    pub async fn switch_lens(&self) -> Result<LensFacing, SessionError> {
        let lens = {
            let mut lens = self.lens.lock().unwrap_or_else(PoisonError::into_inner);
            *lens = lens.toggled();
            *lens
        };
        tracing::info!(?lens, "lens switched");
        self.retake().await?;
        Ok(lens)
    }

    /// Cancel and wait for the analyzer thread to exit.
    pub async fn shutdown(mut self) {
        self.cancel();
        if let Some(worker) = self.worker.take() {
            if tokio::task::spawn_blocking(move || worker.join()).await.is_err() {
                tracing::warn!("analyzer thread join failed");
            }
        }
        tracing::info!("liveness session closed");
    }

    fn cancel(&mut self) {
        self.intake.close();
        let _ = self.worker_commands.send(WorkerCommand::Shutdown);
        self.coordinator.abort();
    }
}

impl Drop for LivenessSession {
    fn drop(&mut self) {
        self.cancel();
    }
}
