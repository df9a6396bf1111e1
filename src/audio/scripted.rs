use super::backend::{CaptureArtifact, CaptureBackend, CaptureError};
use crate::session::{SessionConfig, POLL_INTERVAL};
use crate::vad::{db_to_amp, LevelSample, SILENCE_FLOOR_DBFS};
use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Failure modes a script can inject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedFailure {
    /// `start_capture` fails with a permission rejection.
    PermissionDenied,
    /// `poll_level` fails once the script is exhausted.
    PollFailure,
}

/// Deterministic capture backend driven by a per-tick loudness script.
///
/// Each `poll_level` call pops the next scripted dBFS value; once the
/// script runs out the tail level repeats. Every poll also appends a
/// matching block of PCM to a real WAV file, so sessions driven by this
/// backend produce inspectable recordings and the cancel path has a real
/// file to delete.
pub struct ScriptedBackend {
    output_dir: PathBuf,
    script: VecDeque<f32>,
    tail_db: f32,
    failure: Option<ScriptedFailure>,
    recording: Option<ScriptedRecording>,
}

struct ScriptedRecording {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    path: PathBuf,
    channels: u16,
    samples_per_poll: u32,
}

impl ScriptedBackend {
    /// `script` holds one dBFS level per poll tick, in order.
    pub fn new(output_dir: impl Into<PathBuf>, script: Vec<f32>) -> Self {
        Self {
            output_dir: output_dir.into(),
            script: script.into(),
            tail_db: SILENCE_FLOOR_DBFS,
            failure: None,
            recording: None,
        }
    }

    /// Level reported on every poll after the script is exhausted.
    pub fn with_tail(mut self, tail_db: f32) -> Self {
        self.tail_db = tail_db;
        self
    }

    pub fn with_failure(mut self, failure: ScriptedFailure) -> Self {
        self.failure = Some(failure);
        self
    }
}

#[async_trait::async_trait]
impl CaptureBackend for ScriptedBackend {
    async fn start_capture(&mut self, config: &SessionConfig) -> Result<(), CaptureError> {
        if self.failure == Some(ScriptedFailure::PermissionDenied) {
            return Err(CaptureError::PermissionDenied);
        }

        fs::create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join(format!("{}.wav", config.session_id));

        let spec = hound::WavSpec {
            channels: config.channels,
            sample_rate: config.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(&path, spec)
            .map_err(|e| CaptureError::Encoding(e.to_string()))?;

        let samples_per_poll = config.sample_rate * POLL_INTERVAL.as_millis() as u32 / 1000;

        info!("Scripted capture started: {}", path.display());
        self.recording = Some(ScriptedRecording {
            writer: Some(writer),
            path,
            channels: config.channels,
            samples_per_poll,
        });
        Ok(())
    }

    async fn poll_level(&mut self) -> Result<LevelSample, CaptureError> {
        let recording = self.recording.as_mut().ok_or(CaptureError::NotActive)?;

        let level_db = match self.script.pop_front() {
            Some(level) => level,
            None if self.failure == Some(ScriptedFailure::PollFailure) => {
                return Err(CaptureError::Stream("scripted poll failure".to_string()));
            }
            None => self.tail_db,
        };

        recording.write_block(level_db)?;
        debug!("Scripted poll: {:.1} dBFS", level_db);
        Ok(LevelSample::Dbfs(level_db))
    }

    async fn stop_capture(&mut self) -> Result<CaptureArtifact, CaptureError> {
        let mut recording = self.recording.take().ok_or(CaptureError::NotActive)?;

        if let Some(writer) = recording.writer.take() {
            writer
                .finalize()
                .map_err(|e| CaptureError::Encoding(e.to_string()))?;
        }
        let size_bytes = fs::metadata(&recording.path)?.len();

        info!(
            "Scripted capture finalized: {} ({} bytes)",
            recording.path.display(),
            size_bytes
        );
        Ok(CaptureArtifact {
            path: recording.path.clone(),
            size_bytes,
        })
    }

    async fn discard_capture(&mut self) -> Result<(), CaptureError> {
        if let Some(mut recording) = self.recording.take() {
            drop(recording.writer.take());
            fs::remove_file(&recording.path)?;
            info!("Scripted capture discarded: {}", recording.path.display());
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

impl ScriptedRecording {
    /// Append one poll interval of PCM at the given level.
    fn write_block(&mut self, level_db: f32) -> Result<(), CaptureError> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };

        let amplitude = db_to_amp(level_db).clamp(0.0, 1.0);
        let magnitude = (amplitude * i16::MAX as f32) as i16;

        for i in 0..self.samples_per_poll {
            // Alternate the sign so the synthesized block has zero mean.
            let sample = if i % 2 == 0 { magnitude } else { -magnitude };
            for _ in 0..self.channels {
                writer
                    .write_sample(sample)
                    .map_err(|e| CaptureError::Encoding(e.to_string()))?;
            }
        }
        Ok(())
    }
}

impl Drop for ScriptedRecording {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("Failed to finalize scripted WAV on drop: {}", e);
            }
        }
    }
}
