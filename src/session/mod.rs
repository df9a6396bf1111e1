//! Recording session lifecycle
//!
//! This module provides the voice-activity-driven session machinery:
//! - `SessionConfig` validation and defaults
//! - The pure, tick-driven lifecycle state machine (`SessionState`)
//! - The per-session engine task that polls a capture backend and drives
//!   the state machine through the debounced end-of-speech check
//! - The `Recorder` controller that enforces single-session exclusivity
//!   and exactly-once result claiming

mod config;
mod engine;
mod recorder;
mod result;
mod state;

pub use config::{
    ConfigError, RecordingFormat, SessionConfig, MAX_BIT_RATE, MAX_SAMPLE_RATE, MIN_BIT_RATE,
    MIN_SAMPLE_RATE,
};
pub use engine::POLL_INTERVAL;
pub use recorder::{ControlError, Recorder, StartError};
pub use result::{RecordingResult, SessionStats, StopReason};
pub use state::{CheckVerdict, Phase, SessionState, TickAction};
