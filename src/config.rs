use crate::session::{RecordingFormat, SessionConfig};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub vad: VadConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "voicegate".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub output_dir: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_rate: u32,
    pub format: RecordingFormat,
    pub max_duration_secs: f64,
    pub min_recording_ms: u64,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        let defaults = SessionConfig::default();
        Self {
            output_dir: "recordings".to_string(),
            sample_rate: defaults.sample_rate,
            channels: defaults.channels,
            bit_rate: defaults.bit_rate,
            format: defaults.format,
            max_duration_secs: defaults.max_duration.as_secs_f64(),
            min_recording_ms: defaults.min_recording.as_millis() as u64,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct VadConfig {
    pub noise_floor_db: f32,
    pub voice_threshold_db: f32,
    pub thinking_pause_secs: f64,
    pub end_of_speech_secs: f64,
}

impl Default for VadConfig {
    fn default() -> Self {
        let defaults = SessionConfig::default();
        Self {
            noise_floor_db: defaults.noise_floor_db,
            voice_threshold_db: defaults.voice_threshold_db,
            thinking_pause_secs: defaults.thinking_pause.as_secs_f64(),
            end_of_speech_secs: defaults.end_of_speech.as_secs_f64(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Build a session config from the file values, minting a fresh session id.
    ///
    /// Duration fields must be finite seconds; negative values clamp to zero
    /// and non-finite or oversized values are a load error.
    pub fn session_config(&self) -> Result<SessionConfig> {
        Ok(SessionConfig {
            format: self.recording.format,
            sample_rate: self.recording.sample_rate,
            channels: self.recording.channels,
            bit_rate: self.recording.bit_rate,
            noise_floor_db: self.vad.noise_floor_db,
            voice_threshold_db: self.vad.voice_threshold_db,
            thinking_pause: secs("vad.thinking_pause_secs", self.vad.thinking_pause_secs)?,
            end_of_speech: secs("vad.end_of_speech_secs", self.vad.end_of_speech_secs)?,
            max_duration: secs("recording.max_duration_secs", self.recording.max_duration_secs)?,
            min_recording: Duration::from_millis(self.recording.min_recording_ms),
            ..SessionConfig::default()
        })
    }
}

fn secs(key: &str, value: f64) -> Result<Duration> {
    if value < 0.0 {
        return Ok(Duration::ZERO);
    }
    Duration::try_from_secs_f64(value)
        .with_context(|| format!("{key} must be a finite number of seconds, got {value}"))
}
