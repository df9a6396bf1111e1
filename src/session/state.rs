use super::config::SessionConfig;
use super::result::StopReason;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Observable lifecycle phase of an active session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Capturing, no voice detected yet.
    Armed,
    /// Voice detected and not currently paused.
    Speaking,
    /// Tolerated silence, end-of-speech check pending.
    ThinkingPause,
}

/// What the engine must do after feeding one poll sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    /// Nothing to schedule or cancel.
    Continue,
    /// Voice resumed; drop the pending end-of-speech check.
    CancelEndOfSpeechCheck,
    /// A thinking pause began; run the end-of-speech check after `delay`.
    ScheduleEndOfSpeechCheck { delay: Duration },
    /// Terminal condition reached on this sample.
    Finish(StopReason),
}

/// Verdict of the deferred end-of-speech check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckVerdict {
    /// Silence held for the full end-of-speech threshold; finish the session.
    EndOfSpeech,
    /// The minimum recording duration has not elapsed; keep polling.
    TooShort,
}

/// Timing state for one active recording session.
///
/// Pure and synchronous: every transition takes the current instant as an
/// argument, so tests drive it with plain arithmetic instead of real time.
/// The engine owns exactly one of these per session and feeds it from a
/// single task; the deferred-timer handle itself lives with the engine,
/// which schedules and cancels it as directed by [`TickAction`].
#[derive(Debug, Clone)]
pub struct SessionState {
    started: Instant,
    speech_started: Option<Instant>,
    last_voice: Option<Instant>,
    in_thinking_pause: bool,
    completed: bool,
    thinking_pause: Duration,
    end_of_speech: Duration,
    max_duration: Duration,
    min_recording: Duration,
}

impl SessionState {
    /// The config must have passed [`SessionConfig::validate`]: the check
    /// scheduling arithmetic relies on `end_of_speech >= thinking_pause`.
    pub fn new(config: &SessionConfig, now: Instant) -> Self {
        debug_assert!(
            config.end_of_speech >= config.thinking_pause,
            "end_of_speech must not be shorter than thinking_pause"
        );
        Self {
            started: now,
            speech_started: None,
            last_voice: None,
            in_thinking_pause: false,
            completed: false,
            thinking_pause: config.thinking_pause,
            end_of_speech: config.end_of_speech,
            max_duration: config.max_duration,
            min_recording: config.min_recording,
        }
    }

    /// Feed one classified poll sample.
    ///
    /// The max-duration check supersedes everything else on the tick.
    pub fn on_sample(&mut self, is_voice: bool, now: Instant) -> TickAction {
        if now.duration_since(self.started) >= self.max_duration {
            debug!("Max duration reached at {:.1}s", self.duration(now).as_secs_f64());
            return TickAction::Finish(StopReason::MaxDurationReached);
        }

        if is_voice {
            if self.speech_started.is_none() {
                self.speech_started = Some(now);
                debug!("First voice at {:.1}s", self.duration(now).as_secs_f64());
            }
            self.last_voice = Some(now);
            let was_paused = self.in_thinking_pause;
            self.in_thinking_pause = false;
            if was_paused {
                debug!("Voice resumed, leaving thinking pause");
                return TickAction::CancelEndOfSpeechCheck;
            }
            return TickAction::Continue;
        }

        // Silence: nothing to debounce until voice has been heard once.
        let Some(last_voice) = self.last_voice else {
            return TickAction::Continue;
        };

        if !self.in_thinking_pause && now.duration_since(last_voice) >= self.thinking_pause {
            self.in_thinking_pause = true;
            let delay = self.end_of_speech - self.thinking_pause;
            debug!(
                "Entering thinking pause at {:.1}s, end-of-speech check in {:.1}s",
                self.duration(now).as_secs_f64(),
                delay.as_secs_f64()
            );
            return TickAction::ScheduleEndOfSpeechCheck { delay };
        }

        TickAction::Continue
    }

    /// The deferred end-of-speech check.
    ///
    /// Only fires while a thinking pause is active: the engine drops the
    /// timer the moment voice resumes, so a delivered check implies silence
    /// has held for the full end-of-speech threshold.
    pub fn on_end_of_speech_check(&mut self, now: Instant) -> CheckVerdict {
        if now.duration_since(self.started) < self.min_recording {
            // Too short to finish. Clear the pause so subsequent silent
            // ticks re-evaluate and may schedule a fresh check.
            self.in_thinking_pause = false;
            debug!("End-of-speech check before minimum duration, pause cleared");
            return CheckVerdict::TooShort;
        }
        CheckVerdict::EndOfSpeech
    }

    /// Mark the session complete. Returns false if it already was.
    pub fn try_complete(&mut self) -> bool {
        if self.completed {
            return false;
        }
        self.completed = true;
        true
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn phase(&self) -> Phase {
        if self.speech_started.is_none() {
            Phase::Armed
        } else if self.in_thinking_pause {
            Phase::ThinkingPause
        } else {
            Phase::Speaking
        }
    }

    pub fn voice_detected(&self) -> bool {
        self.speech_started.is_some()
    }

    pub fn duration(&self, now: Instant) -> Duration {
        now.duration_since(self.started)
    }

    /// Speech span ending at the last detected voice, used by automatic
    /// stops so trailing silence is excluded. Zero when no voice was heard.
    pub fn speech_until_last_voice(&self) -> Duration {
        match (self.speech_started, self.last_voice) {
            (Some(start), Some(last)) => last.duration_since(start),
            _ => Duration::ZERO,
        }
    }

    /// Speech span ending now, used by manual stops mid-speech. Zero when
    /// no voice was heard.
    pub fn speech_until(&self, now: Instant) -> Duration {
        match self.speech_started {
            Some(start) => now.duration_since(start),
            None => Duration::ZERO,
        }
    }
}
