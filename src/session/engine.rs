use super::config::SessionConfig;
use super::result::{RecordingResult, SessionStats, StopReason};
use super::state::{CheckVerdict, SessionState, TickAction};
use crate::audio::{CaptureArtifact, CaptureBackend};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Interval between loudness polls while a session is active.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Commands accepted by a running session task.
#[derive(Debug)]
pub(crate) enum SessionCommand {
    Stop,
    Cancel,
    Stats(oneshot::Sender<SessionStats>),
}

/// Terminal outcome of a session task, sent exactly once.
#[derive(Debug)]
pub(crate) enum SessionOutcome {
    Completed(RecordingResult),
    Cancelled,
}

/// How the poll loop ended.
enum Terminal {
    Finish {
        reason: StopReason,
        now: Instant,
        error: Option<String>,
    },
    Cancel,
}

/// The per-session actor: owns the backend, the timing state, the poll
/// interval, and the single deferred end-of-speech timer.
///
/// Every transition is serialized through one `select!` loop, so a timer
/// scheduled during one tick is always disarmed before a later tick can
/// process a new voice sample, and exactly one terminal outcome is produced.
pub(crate) struct SessionEngine {
    config: SessionConfig,
    backend: Box<dyn CaptureBackend>,
    state: SessionState,
    started_at: DateTime<Utc>,
    cmd_rx: mpsc::Receiver<SessionCommand>,
}

impl SessionEngine {
    /// Build the engine for an armed session. The backend must already be
    /// capturing; the session clock starts here.
    pub(crate) fn new(
        config: SessionConfig,
        backend: Box<dyn CaptureBackend>,
        cmd_rx: mpsc::Receiver<SessionCommand>,
    ) -> Self {
        let state = SessionState::new(&config, Instant::now());
        Self {
            config,
            backend,
            state,
            started_at: Utc::now(),
            cmd_rx,
        }
    }

    pub(crate) async fn run(mut self, outcome_tx: oneshot::Sender<SessionOutcome>) {
        let thresholds = self.config.vad_thresholds();
        debug!(
            "Session {} effective thresholds: noise floor {} dB, voice {} dB",
            self.config.session_id,
            thresholds.noise_floor_db(),
            thresholds.voice_threshold_db()
        );

        let mut ticks = time::interval(POLL_INTERVAL);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // The single deferred end-of-speech timer. Disarmed it is never
        // polled; rescheduling resets the deadline before re-arming.
        let check_timer = time::sleep(Duration::ZERO);
        tokio::pin!(check_timer);
        let mut check_armed = false;

        let terminal = loop {
            tokio::select! {
                biased;

                cmd = self.cmd_rx.recv() => match cmd {
                    Some(SessionCommand::Stop) => {
                        info!("Manual stop requested for session {}", self.config.session_id);
                        break Terminal::Finish {
                            reason: StopReason::ManualStop,
                            now: Instant::now(),
                            error: None,
                        };
                    }
                    Some(SessionCommand::Cancel) | None => break Terminal::Cancel,
                    Some(SessionCommand::Stats(reply)) => {
                        let _ = reply.send(self.stats_snapshot(Instant::now()));
                    }
                },

                () = &mut check_timer, if check_armed => {
                    check_armed = false;
                    let now = Instant::now();
                    match self.state.on_end_of_speech_check(now) {
                        CheckVerdict::EndOfSpeech => {
                            info!("End of speech detected for session {}", self.config.session_id);
                            break Terminal::Finish {
                                reason: StopReason::SilenceDetected,
                                now,
                                error: None,
                            };
                        }
                        CheckVerdict::TooShort => {}
                    }
                }

                _ = ticks.tick() => {
                    let now = Instant::now();
                    let level = match self.backend.poll_level().await {
                        Ok(level) => level,
                        Err(e) => {
                            error!(
                                "Level poll failed for session {}: {}",
                                self.config.session_id, e
                            );
                            break Terminal::Finish {
                                reason: StopReason::Error,
                                now,
                                error: Some(e.to_string()),
                            };
                        }
                    };

                    match self.state.on_sample(thresholds.is_voice(level), now) {
                        TickAction::Continue => {}
                        TickAction::CancelEndOfSpeechCheck => {
                            check_armed = false;
                        }
                        TickAction::ScheduleEndOfSpeechCheck { delay } => {
                            debug_assert!(!check_armed, "only one deferred check may be armed");
                            check_timer.as_mut().reset(now + delay);
                            check_armed = true;
                        }
                        TickAction::Finish(reason) => {
                            break Terminal::Finish { reason, now, error: None };
                        }
                    }
                }
            }
        };

        let outcome = match terminal {
            Terminal::Finish { reason, now, error } => {
                SessionOutcome::Completed(self.finish(reason, now, error).await)
            }
            Terminal::Cancel => {
                self.discard().await;
                SessionOutcome::Cancelled
            }
        };

        if outcome_tx.send(outcome).is_err() {
            warn!("Session {} outcome had no receiver", self.config.session_id);
        }
    }

    /// Terminate the session and assemble its single result.
    async fn finish(
        &mut self,
        mut reason: StopReason,
        now: Instant,
        mut error: Option<String>,
    ) -> RecordingResult {
        let duration = self.state.duration(now);
        let speech = match reason {
            StopReason::ManualStop => self.state.speech_until(now),
            _ => self.state.speech_until_last_voice(),
        };

        if !self.state.try_complete() {
            warn!(
                "Session {} already completed, suppressing duplicate {:?} stop",
                self.config.session_id, reason
            );
            return self.assemble(None, duration, speech, reason, error);
        }

        let artifact = match self.backend.stop_capture().await {
            Ok(artifact) => {
                debug!(
                    "Capture finalized for session {}: {} ({} bytes)",
                    self.config.session_id,
                    artifact.path.display(),
                    artifact.size_bytes
                );
                Some(artifact)
            }
            Err(e) => {
                error!(
                    "Failed to finalize capture for session {}: {}",
                    self.config.session_id, e
                );
                reason = StopReason::Error;
                if error.is_none() {
                    error = Some(e.to_string());
                }
                None
            }
        };

        info!(
            "Session {} finished: {:?} ({:.1}s total, {:.1}s speech)",
            self.config.session_id,
            reason,
            duration.as_secs_f64(),
            speech.as_secs_f64()
        );

        self.assemble(artifact, duration, speech, reason, error)
    }

    /// Cancel path: no result, output deleted.
    async fn discard(&mut self) {
        if !self.state.try_complete() {
            warn!(
                "Session {} already completed, cancel is a no-op",
                self.config.session_id
            );
            return;
        }

        info!("Cancelling session {}, discarding output", self.config.session_id);
        if let Err(e) = self.backend.discard_capture().await {
            warn!(
                "Failed to discard capture for session {}: {}",
                self.config.session_id, e
            );
        }
    }

    fn assemble(
        &self,
        artifact: Option<CaptureArtifact>,
        duration: Duration,
        speech: Duration,
        reason: StopReason,
        error: Option<String>,
    ) -> RecordingResult {
        RecordingResult {
            file_path: artifact.as_ref().map(|a| a.path.clone()),
            duration_secs: duration.as_secs_f64(),
            speech_secs: speech.as_secs_f64(),
            file_size_bytes: artifact.map(|a| a.size_bytes).unwrap_or(0),
            reason,
            error,
            started_at: self.started_at,
        }
    }

    fn stats_snapshot(&self, now: Instant) -> SessionStats {
        SessionStats {
            phase: self.state.phase(),
            started_at: self.started_at,
            duration_secs: self.state.duration(now).as_secs_f64(),
            voice_detected: self.state.voice_detected(),
            speech_secs: self.state.speech_until_last_voice().as_secs_f64(),
        }
    }
}
