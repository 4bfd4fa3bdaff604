//! Analysis worker: a dedicated OS thread that owns the detector adapter and
//! the check engine.
//!
//! Frames reach the worker through a one-slot intake. Submitting into a full
//! slot evicts (and releases) the frame waiting there, so the worker always
//! picks up the most recent admitted frame. Control commands share the loop
//! and are drained before each frame, which serializes a reset with analysis.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use livecheck_core::{CheckEngine, ChecksState, DetectorAdapter, FaceClassifier, FrameSignals};
use livecheck_hw::CameraFrame;
use serde::Serialize;
use tokio::sync::{oneshot, watch};

use crate::scheduler::{Admission, FrameScheduler};

/// Everything observers learn from one analyzed frame, published as a unit.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisSnapshot {
    pub state: ChecksState,
    /// All four checks met on the latest frame.
    pub detected: bool,
    pub signals: Option<FrameSignals>,
    /// Frames analyzed since the last reset.
    pub frames_analyzed: u64,
}

impl AnalysisSnapshot {
    fn initial(engine: &CheckEngine) -> Self {
        Self {
            state: engine.state().clone(),
            detected: false,
            signals: None,
            frames_analyzed: 0,
        }
    }
}

pub(crate) enum WorkerCommand {
    /// Zero the engine and publish the initial snapshot, then acknowledge.
    Reset { reply: oneshot::Sender<()> },
    Shutdown,
}

/// Producer side of the frame slot. Safe to call from any camera thread.
pub(crate) struct FrameIntake {
    scheduler: Mutex<FrameScheduler>,
    slot_tx: Sender<CameraFrame>,
    slot_rx: Receiver<CameraFrame>,
    in_flight: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
}

impl FrameIntake {
    pub(crate) fn submit(&self, frame: CameraFrame, now: Instant) -> Admission {
        if self.cancelled.load(Ordering::Acquire) {
            frame.release();
            return Admission::Closed;
        }

        let admission = self
            .scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .admit(now, self.in_flight.load(Ordering::Acquire));
        if admission != Admission::Accepted {
            tracing::trace!(sequence = frame.sequence, ?admission, "frame dropped");
            frame.release();
            return admission;
        }

        match self.slot_tx.try_send(frame) {
            Ok(()) => Admission::Accepted,
            Err(TrySendError::Full(frame)) => {
                if let Ok(stale) = self.slot_rx.try_recv() {
                    tracing::trace!(sequence = stale.sequence, "replacing queued frame");
                    stale.release();
                }
                match self.slot_tx.try_send(frame) {
                    Ok(()) => Admission::Accepted,
                    Err(err) => {
                        err.into_inner().release();
                        Admission::Busy
                    }
                }
            }
            Err(TrySendError::Disconnected(frame)) => {
                frame.release();
                Admission::Closed
            }
        }
    }

    /// Stop admitting and release whatever is still waiting in the slot.
    pub(crate) fn close(&self) {
        self.cancelled.store(true, Ordering::Release);
        while let Ok(frame) = self.slot_rx.try_recv() {
            frame.release();
        }
    }

    pub(crate) fn stats(&self) -> (u64, u64) {
        let scheduler = self.scheduler.lock().unwrap_or_else(PoisonError::into_inner);
        (scheduler.accepted(), scheduler.dropped())
    }
}

struct Analyzer {
    adapter: DetectorAdapter<Box<dyn FaceClassifier>>,
    engine: CheckEngine,
    publisher: watch::Sender<AnalysisSnapshot>,
    in_flight: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
    frames_analyzed: u64,
}

impl Analyzer {
    fn analyze(&mut self, frame: CameraFrame) {
        if self.cancelled.load(Ordering::Acquire) {
            frame.release();
            return;
        }
        self.in_flight.store(true, Ordering::Release);

        let sequence = frame.sequence;
        let faces = self.adapter.analyze(frame);
        let outcome = self.engine.process_faces(faces);
        self.frames_analyzed += 1;
        self.in_flight.store(false, Ordering::Release);

        if !self.cancelled.load(Ordering::Acquire) {
            tracing::debug!(
                sequence,
                sweep = outcome.state.sweep_angle,
                detected = outcome.detected,
                "frame analyzed"
            );
            self.publisher.send_replace(AnalysisSnapshot {
                state: outcome.state,
                detected: outcome.detected,
                signals: outcome.signals,
                frames_analyzed: self.frames_analyzed,
            });
        }
    }

    /// Returns false when the worker should exit.
    fn handle(&mut self, command: WorkerCommand, frames: &Receiver<CameraFrame>) -> bool {
        match command {
            WorkerCommand::Reset { reply } => {
                // A frame queued before the retake belongs to the old attempt.
                while let Ok(stale) = frames.try_recv() {
                    tracing::trace!(sequence = stale.sequence, "discarding frame queued before reset");
                    stale.release();
                }
                self.engine.reset();
                self.frames_analyzed = 0;
                self.publisher
                    .send_replace(AnalysisSnapshot::initial(&self.engine));
                let _ = reply.send(());
                true
            }
            WorkerCommand::Shutdown => false,
        }
    }

    fn run(mut self, frames: Receiver<CameraFrame>, commands: Receiver<WorkerCommand>) {
        tracing::info!("analyzer thread started");
        'outer: loop {
            while let Ok(command) = commands.try_recv() {
                if !self.handle(command, &frames) {
                    break 'outer;
                }
            }
            crossbeam::select! {
                recv(commands) -> command => match command {
                    Ok(command) => {
                        if !self.handle(command, &frames) {
                            break;
                        }
                    }
                    Err(_) => break,
                },
                recv(frames) -> frame => match frame {
                    Ok(frame) => self.analyze(frame),
                    Err(_) => break,
                },
            }
        }
        while let Ok(frame) = frames.try_recv() {
            frame.release();
        }
        tracing::info!(frames = self.frames_analyzed, "analyzer thread exiting");
    }
}

pub(crate) struct AnalyzerHandle {
    pub(crate) intake: FrameIntake,
    pub(crate) commands: Sender<WorkerCommand>,
    pub(crate) snapshots: watch::Receiver<AnalysisSnapshot>,
    pub(crate) thread: JoinHandle<()>,
}

/// Spawn the analyzer on a dedicated OS thread.
pub(crate) fn spawn_analyzer(
    classifier: Box<dyn FaceClassifier>,
    engine: CheckEngine,
    scheduler: FrameScheduler,
) -> std::io::Result<AnalyzerHandle> {
    let (slot_tx, slot_rx) = channel::bounded::<CameraFrame>(1);
    let (command_tx, command_rx) = channel::unbounded::<WorkerCommand>();
    let (publisher, snapshots) = watch::channel(AnalysisSnapshot::initial(&engine));
    let in_flight = Arc::new(AtomicBool::new(false));
    let cancelled = Arc::new(AtomicBool::new(false));

    let analyzer = Analyzer {
        adapter: DetectorAdapter::new(classifier),
        engine,
        publisher,
        in_flight: Arc::clone(&in_flight),
        cancelled: Arc::clone(&cancelled),
        frames_analyzed: 0,
    };
    let frames = slot_rx.clone();
    let thread = std::thread::Builder::new()
        .name("livecheck-analyzer".into())
        .spawn(move || analyzer.run(frames, command_rx))?;

    Ok(AnalyzerHandle {
        intake: FrameIntake {
            scheduler: Mutex::new(scheduler),
            slot_tx,
            slot_rx,
            in_flight,
            cancelled,
        },
        commands: command_tx,
        snapshots,
        thread,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use livecheck_core::{ClassifierError, DetectedFace, LivenessConfig};
    use livecheck_hw::{Frame, FrameError};
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::time::Duration;

    /// Blocks inside `classify` until told to continue.
    struct GatedClassifier {
        entered: mpsc::Sender<()>,
        proceed: mpsc::Receiver<()>,
    }

    impl FaceClassifier for GatedClassifier {
        fn classify(&mut self, _frame: &Frame) -> Result<Vec<DetectedFace>, ClassifierError> {
            let _ = self.entered.send(());
            let _ = self.proceed.recv();
            Ok(Vec::new())
        }
    }

    fn counted_frame(sequence: u64, released: &Arc<AtomicUsize>) -> CameraFrame {
        let frame = Frame::from_grayscale(vec![0; 4], 2, 2)
            .unwrap()
            .with_sequence(sequence);
        let released = Arc::clone(released);
        CameraFrame::with_release(
            frame,
            Box::new(move || -> Result<(), FrameError> {
                released.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        )
    }

    fn spawn_gated(interval: Duration) -> (AnalyzerHandle, mpsc::Receiver<()>, mpsc::Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (proceed_tx, proceed_rx) = mpsc::channel();
        let classifier = GatedClassifier {
            entered: entered_tx,
            proceed: proceed_rx,
        };
        let engine = CheckEngine::new(LivenessConfig::default()).unwrap();
        let handle =
            spawn_analyzer(Box::new(classifier), engine, FrameScheduler::new(interval)).unwrap();
        (handle, entered_rx, proceed_tx)
    }

    fn stop(handle: AnalyzerHandle) {
        handle.intake.close();
        let _ = handle.commands.send(WorkerCommand::Shutdown);
        handle.thread.join().unwrap();
    }

    #[test]
    fn test_frame_dropped_while_busy_is_released() {
        let released = Arc::new(AtomicUsize::new(0));
        let (handle, entered, proceed) = spawn_gated(Duration::ZERO);

        assert_eq!(
            handle.intake.submit(counted_frame(1, &released), Instant::now()),
            Admission::Accepted
        );
        entered.recv_timeout(Duration::from_secs(5)).unwrap();

        assert_eq!(
            handle.intake.submit(counted_frame(2, &released), Instant::now()),
            Admission::Busy
        );
        assert_eq!(released.load(Ordering::SeqCst), 1, "dropped frame released");

        proceed.send(()).unwrap();
        drop(proceed);
        stop(handle);
        assert_eq!(released.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_reset_publishes_initial_snapshot() {
        let (handle, _entered, _proceed) = spawn_gated(Duration::ZERO);
        let (reply_tx, reply_rx) = oneshot::channel();
        handle
            .commands
            .send(WorkerCommand::Reset { reply: reply_tx })
            .unwrap();
        reply_rx.blocking_recv().unwrap();
        let snapshot = handle.snapshots.borrow().clone();
        assert_eq!(snapshot.frames_analyzed, 0);
        assert_eq!(snapshot.state.sweep_angle, 0.0);
        stop(handle);
    }

    #[test]
    fn test_reset_discards_frame_queued_for_old_attempt() {
        let released = Arc::new(AtomicUsize::new(0));
        let (handle, entered, proceed) = spawn_gated(Duration::ZERO);

        handle.intake.submit(counted_frame(1, &released), Instant::now());
        entered.recv_timeout(Duration::from_secs(5)).unwrap();

        // Worker is inside the classifier: park a frame in the slot and queue a reset.
        handle.intake.slot_tx.try_send(counted_frame(2, &released)).unwrap();
        let (reply_tx, reply_rx) = oneshot::channel();
        handle
            .commands
            .send(WorkerCommand::Reset { reply: reply_tx })
            .unwrap();

        proceed.send(()).unwrap();
        drop(proceed);
        reply_rx.blocking_recv().unwrap();

        assert_eq!(released.load(Ordering::SeqCst), 2, "queued frame released by reset");
        assert!(
            entered.recv_timeout(Duration::from_millis(200)).is_err(),
            "queued frame must not be classified into the new attempt"
        );
        assert_eq!(handle.snapshots.borrow().frames_analyzed, 0);
        stop(handle);
    }

    #[test]
    fn test_closed_intake_rejects_and_releases() {
        let released = Arc::new(AtomicUsize::new(0));
        let (handle, _entered, _proceed) = spawn_gated(Duration::ZERO);
        handle.intake.close();
        assert_eq!(
            handle.intake.submit(counted_frame(1, &released), Instant::now()),
            Admission::Closed
        );
        assert_eq!(released.load(Ordering::SeqCst), 1);
        let _ = handle.commands.send(WorkerCommand::Shutdown);
        handle.thread.join().unwrap();
    }
}
