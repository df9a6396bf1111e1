pub mod audio;
pub mod config;
pub mod session;
pub mod vad;

pub use audio::{
    list_input_devices, CaptureArtifact, CaptureBackend, CaptureError, MicBackend, ScriptedBackend,
    ScriptedFailure,
};
pub use config::Config;
pub use session::{
    ControlError, Recorder, RecordingFormat, RecordingResult, SessionConfig, SessionStats,
    StartError, StopReason, POLL_INTERVAL,
};
pub use vad::{LevelSample, VadThresholds};
