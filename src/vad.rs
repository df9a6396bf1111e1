//! Voice activity detection over periodic loudness samples.
//!
//! Classification is a pure threshold test: a sample counts as voice only
//! when it rises above both the noise floor and the voice activity threshold.
//! Everything stateful (pauses, debouncing, session termination) lives in
//! the session state machine; this module never looks at more than one
//! sample at a time.

use tracing::warn;

/// Level reported for zero or invalid amplitude, in dBFS.
pub const SILENCE_FLOOR_DBFS: f32 = -96.0;

/// Margin added to the noise floor when a misconfigured voice threshold is coerced.
pub const VOICE_THRESHOLD_MARGIN_DB: f32 = 10.0;

/// One loudness measurement from a capture backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LevelSample {
    /// Already expressed in dBFS (0.0 = full scale, negative below).
    Dbfs(f32),
    /// Linear amplitude in [0.0, 1.0] relative to full scale.
    Amplitude(f32),
}

impl LevelSample {
    /// Express the sample in dBFS.
    pub fn as_dbfs(self) -> f32 {
        match self {
            LevelSample::Dbfs(db) if db.is_finite() => db,
            LevelSample::Dbfs(_) => SILENCE_FLOOR_DBFS,
            LevelSample::Amplitude(amp) => amp_to_dbfs(amp),
        }
    }
}

/// Convert a linear amplitude to dBFS.
///
/// Non-positive and non-finite input maps to [`SILENCE_FLOOR_DBFS`].
pub fn amp_to_dbfs(amp: f32) -> f32 {
    if !amp.is_finite() || amp <= 0.0 {
        return SILENCE_FLOOR_DBFS;
    }
    (20.0 * amp.log10()).max(SILENCE_FLOOR_DBFS)
}

/// Convert dBFS to linear amplitude (0 dBFS = 1.0).
pub fn db_to_amp(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Root-mean-square amplitude of a block of normalized samples.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    // Accumulate in f64 for numerical stability on long blocks.
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_sq / samples.len() as f64).sqrt() as f32
}

/// Classification thresholds, normalized at construction.
///
/// A voice threshold at or below the noise floor is coerced to the floor
/// plus [`VOICE_THRESHOLD_MARGIN_DB`], so the voice test is always the
/// stricter of the two.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VadThresholds {
    noise_floor_db: f32,
    voice_threshold_db: f32,
}

impl VadThresholds {
    pub fn new(noise_floor_db: f32, voice_threshold_db: f32) -> Self {
        let voice_threshold_db = if voice_threshold_db <= noise_floor_db {
            let coerced = noise_floor_db + VOICE_THRESHOLD_MARGIN_DB;
            warn!(
                "Voice threshold {} dB at or below noise floor {} dB, coercing to {} dB",
                voice_threshold_db, noise_floor_db, coerced
            );
            coerced
        } else {
            voice_threshold_db
        };

        Self {
            noise_floor_db,
            voice_threshold_db,
        }
    }

    /// Classify one loudness sample.
    pub fn is_voice(&self, sample: LevelSample) -> bool {
        let db = sample.as_dbfs();
        db > self.noise_floor_db && db > self.voice_threshold_db
    }

    pub fn noise_floor_db(&self) -> f32 {
        self.noise_floor_db
    }

    pub fn voice_threshold_db(&self) -> f32 {
        self.voice_threshold_db
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn test_full_scale_amplitude_is_zero_dbfs() {
        assert!(close(amp_to_dbfs(1.0), 0.0));
    }

    #[test]
    fn test_tenth_amplitude_is_minus_twenty_dbfs() {
        assert!(close(amp_to_dbfs(0.1), -20.0));
    }

    #[test]
    fn test_zero_and_negative_amplitude_hit_the_floor() {
        assert!(close(amp_to_dbfs(0.0), SILENCE_FLOOR_DBFS));
        assert!(close(amp_to_dbfs(-0.5), SILENCE_FLOOR_DBFS));
        assert!(close(amp_to_dbfs(f32::NAN), SILENCE_FLOOR_DBFS));
    }

    #[test]
    fn test_db_amp_round_trip() {
        assert!(close(amp_to_dbfs(db_to_amp(-40.0)), -40.0));
    }

    #[test]
    fn test_rms_of_empty_block_is_zero() {
        assert!(close(rms(&[]), 0.0));
    }

    #[test]
    fn test_rms_of_constant_block() {
        assert!(close(rms(&[0.5; 256]), 0.5));
        assert!(close(rms(&[-0.5; 256]), 0.5));
    }

    #[test]
    fn test_sample_above_both_thresholds_is_voice() {
        let thresholds = VadThresholds::new(-60.0, -40.0);
        assert!(thresholds.is_voice(LevelSample::Dbfs(-20.0)));
    }

    #[test]
    fn test_sample_between_thresholds_is_silence() {
        let thresholds = VadThresholds::new(-60.0, -40.0);
        assert!(!thresholds.is_voice(LevelSample::Dbfs(-50.0)));
    }

    #[test]
    fn test_sample_below_noise_floor_is_silence() {
        let thresholds = VadThresholds::new(-60.0, -40.0);
        assert!(!thresholds.is_voice(LevelSample::Dbfs(-70.0)));
    }

    #[test]
    fn test_sample_exactly_at_threshold_is_silence() {
        let thresholds = VadThresholds::new(-60.0, -40.0);
        assert!(!thresholds.is_voice(LevelSample::Dbfs(-40.0)));
    }

    #[test]
    fn test_inverted_threshold_is_coerced_above_the_floor() {
        let thresholds = VadThresholds::new(-50.0, -55.0);
        assert!(close(thresholds.voice_threshold_db(), -40.0));
        // Below the coerced threshold but above the floor: still silence.
        assert!(!thresholds.is_voice(LevelSample::Dbfs(-45.0)));
        assert!(thresholds.is_voice(LevelSample::Dbfs(-35.0)));
    }

    #[test]
    fn test_amplitude_samples_classify_like_their_dbfs() {
        let thresholds = VadThresholds::new(-60.0, -40.0);
        assert!(thresholds.is_voice(LevelSample::Amplitude(db_to_amp(-20.0))));
        assert!(!thresholds.is_voice(LevelSample::Amplitude(db_to_amp(-50.0))));
        assert!(!thresholds.is_voice(LevelSample::Amplitude(0.0)));
    }

    #[test]
    fn test_non_finite_dbfs_sample_is_silence() {
        let thresholds = VadThresholds::new(-60.0, -40.0);
        assert!(!thresholds.is_voice(LevelSample::Dbfs(f32::NAN)));
        assert!(!thresholds.is_voice(LevelSample::Dbfs(f32::NEG_INFINITY)));
    }
}
