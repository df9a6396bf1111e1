use super::config::{ConfigError, SessionConfig};
use super::engine::{SessionCommand, SessionEngine, SessionOutcome};
use super::result::{RecordingResult, SessionStats};
use crate::audio::{CaptureBackend, CaptureError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Rejections from [`Recorder::start`].
#[derive(Debug, Error)]
pub enum StartError {
    #[error("a recording session is already active")]
    RecordingInProgress,

    #[error("invalid session config: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("capture backend failed to start: {0}")]
    Backend(#[source] CaptureError),
}

/// Rejections from [`Recorder::stop`] and [`Recorder::cancel`].
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("no recording session is active")]
    NotRecording,

    #[error("recording session task failed")]
    SessionFailed,
}

/// A started session held in the recorder slot.
struct ActiveSession {
    session_id: String,
    cmd_tx: mpsc::Sender<SessionCommand>,
    outcome_rx: oneshot::Receiver<SessionOutcome>,
    task: JoinHandle<()>,
}

impl ActiveSession {
    /// The engine drops its command receiver when its task ends, so a
    /// closed sender means the session has reached its terminal state.
    fn is_finished(&self) -> bool {
        self.cmd_tx.is_closed()
    }
}

/// Owns at most one active recording session and the claiming of its result.
///
/// `start` rejects while a session is active, `stop` claims the session's
/// single [`RecordingResult`] (including one produced earlier by an
/// automatic stop), and `cancel` discards the session without a result.
/// Dropping the recorder mid-session cancels it.
pub struct Recorder {
    starting: AtomicBool,
    active: Mutex<Option<ActiveSession>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self {
            starting: AtomicBool::new(false),
            active: Mutex::new(None),
        }
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveSession>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Validate `config`, start `backend`, and arm a new session.
    ///
    /// Rejected before the backend is touched when a session is already
    /// active or the config is out of range. A backend start failure
    /// leaves the recorder idle.
    pub async fn start(
        &self,
        config: SessionConfig,
        backend: Box<dyn CaptureBackend>,
    ) -> Result<(), StartError> {
        // One start at a time; concurrent attempts lose the exchange.
        if self
            .starting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(StartError::RecordingInProgress);
        }

        let result = self.start_inner(config, backend).await;
        self.starting.store(false, Ordering::SeqCst);
        result
    }

    async fn start_inner(
        &self,
        config: SessionConfig,
        mut backend: Box<dyn CaptureBackend>,
    ) -> Result<(), StartError> {
        {
            let mut active = self.lock_active();
            match active.as_ref() {
                Some(session) if !session.is_finished() => {
                    warn!(
                        "Rejecting start of {}: session {} still active",
                        config.session_id, session.session_id
                    );
                    return Err(StartError::RecordingInProgress);
                }
                Some(session) => {
                    warn!(
                        "Discarding unclaimed result of finished session {}",
                        session.session_id
                    );
                    *active = None;
                }
                None => {}
            }
        }

        config.validate()?;

        backend.start_capture(&config).await.map_err(|e| match e {
            CaptureError::PermissionDenied => StartError::PermissionDenied,
            other => StartError::Backend(other),
        })?;

        info!(
            "Session {} armed on {} backend",
            config.session_id,
            backend.name()
        );

        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let session_id = config.session_id.clone();
        let engine = SessionEngine::new(config, backend, cmd_rx);
        let task = tokio::spawn(engine.run(outcome_tx));

        *self.lock_active() = Some(ActiveSession {
            session_id,
            cmd_tx,
            outcome_rx,
            task,
        });
        Ok(())
    }

    /// Stop the active session and claim its result.
    ///
    /// If the session already terminated on its own, the buffered result is
    /// returned; either way each session's result can be claimed exactly
    /// once, and a second stop reports [`ControlError::NotRecording`].
    pub async fn stop(&self) -> Result<RecordingResult, ControlError> {
        let session = self.lock_active().take().ok_or(ControlError::NotRecording)?;

        // Send failure means the session already finished on its own; the
        // outcome below is buffered either way.
        let _ = session.cmd_tx.send(SessionCommand::Stop).await;

        let outcome = session
            .outcome_rx
            .await
            .map_err(|_| ControlError::SessionFailed)?;
        let _ = session.task.await;

        match outcome {
            SessionOutcome::Completed(result) => Ok(result),
            // A cancel claims the slot before it sends, so a stop that holds
            // the slot can never observe this outcome.
            SessionOutcome::Cancelled => Err(ControlError::SessionFailed),
        }
    }

    /// Cancel the active session, discarding its output file.
    ///
    /// Never yields a result. If the session finished just before the
    /// cancel arrived, the finish stands and its artifact is kept.
    pub async fn cancel(&self) -> Result<(), ControlError> {
        let session = self.lock_active().take().ok_or(ControlError::NotRecording)?;

        let _ = session.cmd_tx.send(SessionCommand::Cancel).await;

        match session.outcome_rx.await {
            Ok(SessionOutcome::Cancelled) => {}
            Ok(SessionOutcome::Completed(result)) => {
                info!(
                    "Session {} finished as {:?} before cancel arrived, keeping its artifact",
                    session.session_id, result.reason
                );
            }
            Err(_) => return Err(ControlError::SessionFailed),
        }
        let _ = session.task.await;
        Ok(())
    }

    /// Whether a session is currently active.
    pub fn is_active(&self) -> bool {
        self.lock_active()
            .as_ref()
            .is_some_and(|session| !session.is_finished())
    }

    /// Snapshot of the active session, or `None` when idle.
    pub async fn stats(&self) -> Option<SessionStats> {
        let cmd_tx = self.lock_active().as_ref().map(|s| s.cmd_tx.clone())?;

        let (reply_tx, reply_rx) = oneshot::channel();
        cmd_tx.send(SessionCommand::Stats(reply_tx)).await.ok()?;
        reply_rx.await.ok()
    }

    /// Wait until the active session terminates on its own.
    ///
    /// Returns immediately when idle. Does not claim the result; follow
    /// with [`Recorder::stop`] to claim it.
    pub async fn finished(&self) {
        let cmd_tx = match self.lock_active().as_ref() {
            Some(session) => session.cmd_tx.clone(),
            None => return,
        };
        cmd_tx.closed().await;
    }
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}
