use super::state::Phase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Why a recording session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Silence exceeded the end-of-speech threshold after detected speech.
    SilenceDetected,
    /// The caller requested the stop.
    ManualStop,
    /// The configured maximum duration elapsed.
    MaxDurationReached,
    /// A capture failure ended the session.
    Error,
}

/// Final outcome of a recording session, produced exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingResult {
    /// Path to the finalized recording, absent when the backend could not
    /// produce an artifact on an error-path stop
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,

    /// Wall-clock duration from start to stop, in seconds
    pub duration_secs: f64,

    /// Detected speech span, excluding trailing silence, in seconds
    pub speech_secs: f64,

    /// Size of the finalized recording in bytes (0 when there is no file)
    pub file_size_bytes: u64,

    /// Why the session stopped
    pub reason: StopReason,

    /// Capture diagnostic accompanying [`StopReason::Error`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// When the session started
    pub started_at: DateTime<Utc>,
}

/// Live snapshot of an active session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Current lifecycle phase
    pub phase: Phase,

    /// When the session started
    pub started_at: DateTime<Utc>,

    /// Elapsed wall-clock seconds
    pub duration_secs: f64,

    /// Whether any voice has been detected yet
    pub voice_detected: bool,

    /// Speech seconds so far, up to the last detected voice
    pub speech_secs: f64,
}
