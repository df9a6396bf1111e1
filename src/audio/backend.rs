use crate::session::SessionConfig;
use crate::vad::LevelSample;
use std::path::PathBuf;
use thiserror::Error;

/// Failures reported by a capture backend.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("no input device available")]
    NoDevice,

    #[error("failed to configure capture device: {0}")]
    DeviceConfig(String),

    #[error("capture stream failed: {0}")]
    Stream(String),

    #[error("failed to write recording: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode recording: {0}")]
    Encoding(String),

    #[error("capture not active")]
    NotActive,
}

/// Finalized recording artifact returned by [`CaptureBackend::stop_capture`].
#[derive(Debug, Clone)]
pub struct CaptureArtifact {
    /// Path to the finalized file
    pub path: PathBuf,
    /// File size in bytes
    pub size_bytes: u64,
}

/// Audio capture backend trait
///
/// Implementations own the platform capture resources and the output file.
/// The session engine calls `poll_level` once per poll tick while active
/// and ends the capture with exactly one of `stop_capture` (finalize and
/// keep) or `discard_capture` (delete).
#[async_trait::async_trait]
pub trait CaptureBackend: Send {
    /// Acquire the capture device and create the output artifact.
    ///
    /// On failure, every partially-acquired resource is released before
    /// returning.
    async fn start_capture(&mut self, config: &SessionConfig) -> Result<(), CaptureError>;

    /// Current loudness of the input signal.
    async fn poll_level(&mut self) -> Result<LevelSample, CaptureError>;

    /// Stop capturing and finalize the output file.
    async fn stop_capture(&mut self) -> Result<CaptureArtifact, CaptureError>;

    /// Stop capturing and delete any output.
    async fn discard_capture(&mut self) -> Result<(), CaptureError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}
