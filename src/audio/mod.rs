pub mod backend;
pub mod mic;
pub mod scripted;

pub use backend::{CaptureArtifact, CaptureBackend, CaptureError};
pub use mic::{list_input_devices, MicBackend};
pub use scripted::{ScriptedBackend, ScriptedFailure};
