use crate::vad::VadThresholds;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Supported sample rate range in Hz.
pub const MIN_SAMPLE_RATE: u32 = 8_000;
pub const MAX_SAMPLE_RATE: u32 = 48_000;

/// Supported bit rate range in bps.
pub const MIN_BIT_RATE: u32 = 8_000;
pub const MAX_BIT_RATE: u32 = 320_000;

/// Validation failures for a [`SessionConfig`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("sample rate {0} Hz outside supported range 8000-48000 Hz")]
    SampleRate(u32),

    #[error("channel count {0} outside supported range 1-2")]
    Channels(u16),

    #[error("bit rate {0} bps outside supported range 8000-320000 bps")]
    BitRate(u32),

    #[error("end-of-speech threshold {end_of_speech:?} shorter than thinking pause {thinking_pause:?}")]
    ThresholdOrder {
        thinking_pause: Duration,
        end_of_speech: Duration,
    },

    #[error("max duration must be greater than zero")]
    MaxDuration,
}

/// Container format tag for the finalized recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingFormat {
    /// 16-bit PCM WAV.
    #[default]
    Wav,
}

/// Configuration for a recording session, immutable once the session starts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique session identifier, used for output naming and log context
    pub session_id: String,

    /// Container format for the finalized recording
    pub format: RecordingFormat,

    /// Requested sample rate in Hz (8000-48000)
    pub sample_rate: u32,

    /// Number of audio channels (1 = mono, 2 = stereo)
    pub channels: u16,

    /// Requested bit rate in bps (8000-320000); advisory for uncompressed formats
    pub bit_rate: u32,

    /// Loudness at or below which a sample is always silence, in dBFS
    pub noise_floor_db: f32,

    /// Loudness a sample must exceed to count as voice, in dBFS
    pub voice_threshold_db: f32,

    /// Silence tolerated mid-speech without ending the session
    pub thinking_pause: Duration,

    /// Cumulative silence after which speech is presumed finished
    pub end_of_speech: Duration,

    /// Hard cap on session length
    pub max_duration: Duration,

    /// Minimum session length before silence may end it
    pub min_recording: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("rec-{}", uuid::Uuid::new_v4()),
            format: RecordingFormat::Wav,
            sample_rate: 16000,
            channels: 1,
            bit_rate: 128_000,
            noise_floor_db: -60.0,
            voice_threshold_db: -40.0,
            thinking_pause: Duration::from_millis(1500),
            end_of_speech: Duration::from_millis(2500),
            max_duration: Duration::from_secs(120),
            min_recording: Duration::from_millis(500),
        }
    }
}

impl SessionConfig {
    /// Validate numeric ranges and threshold ordering.
    ///
    /// Runs before any capture resource is acquired; a violation rejects
    /// the session outright. The voice/noise threshold relation is not an
    /// error: [`VadThresholds::new`] coerces it instead.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            return Err(ConfigError::SampleRate(self.sample_rate));
        }
        if !(1..=2).contains(&self.channels) {
            return Err(ConfigError::Channels(self.channels));
        }
        if !(MIN_BIT_RATE..=MAX_BIT_RATE).contains(&self.bit_rate) {
            return Err(ConfigError::BitRate(self.bit_rate));
        }
        if self.end_of_speech < self.thinking_pause {
            return Err(ConfigError::ThresholdOrder {
                thinking_pause: self.thinking_pause,
                end_of_speech: self.end_of_speech,
            });
        }
        if self.max_duration.is_zero() {
            return Err(ConfigError::MaxDuration);
        }
        Ok(())
    }

    /// Classification thresholds for this session, coerced as needed.
    pub fn vad_thresholds(&self) -> VadThresholds {
        VadThresholds::new(self.noise_floor_db, self.voice_threshold_db)
    }
}
