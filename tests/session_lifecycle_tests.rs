// Integration tests for the voice-activated session lifecycle
//
// These tests drive complete sessions through the Recorder with a
// scripted backend on tokio's paused clock, so every poll tick and
// deferred end-of-speech check fires at a deterministic instant. Poll
// k samples the script at t = k * 100ms.

use anyhow::Result;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::sleep;
use voicegate::{
    ControlError, Recorder, ScriptedBackend, ScriptedFailure, SessionConfig, StopReason,
};

/// Thresholds used throughout: 1.5s thinking pause, 2.5s end of
/// speech, 0.5s minimum recording, 120s cap.
fn config() -> SessionConfig {
    SessionConfig {
        thinking_pause: Duration::from_millis(1500),
        end_of_speech: Duration::from_millis(2500),
        max_duration: Duration::from_secs(120),
        min_recording: Duration::from_millis(500),
        ..SessionConfig::default()
    }
}

/// Build a per-poll dBFS script from (polls, level) runs.
fn levels(runs: &[(usize, f32)]) -> Vec<f32> {
    runs.iter()
        .flat_map(|&(polls, db)| std::iter::repeat(db).take(polls))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_trailing_silence_stops_the_recording() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = config();
    let session_id = config.session_id.clone();

    // Ambient noise for 2 polls, voice from t=200ms through t=1000ms,
    // then silence. The thinking pause begins at t=2500ms and the
    // end-of-speech check fires at t=3500ms.
    let script = levels(&[(2, -70.0), (9, -20.0)]);
    let backend = ScriptedBackend::new(temp_dir.path(), script);

    let recorder = Recorder::new();
    recorder.start(config, Box::new(backend)).await?;

    recorder.finished().await;
    let result = recorder.stop().await?;

    assert_eq!(result.reason, StopReason::SilenceDetected);
    assert!(
        (result.duration_secs - 3.5).abs() < 0.01,
        "should stop at the end-of-speech check, got {:.3}s",
        result.duration_secs
    );
    assert!(
        (result.speech_secs - 0.8).abs() < 0.01,
        "speech should span first to last voice, got {:.3}s",
        result.speech_secs
    );
    assert!(result.speech_secs <= result.duration_secs);
    assert!(result.error.is_none());

    // The recording file is kept and non-trivial.
    let path = result.file_path.as_ref().expect("automatic stop keeps the artifact");
    assert!(path.exists(), "recording file should exist");
    assert!(
        path.to_string_lossy().contains(&session_id),
        "file should be named after the session id"
    );
    assert!(result.file_size_bytes > 44, "WAV should hold more than a header");
    assert_eq!(result.file_size_bytes, std::fs::metadata(path)?.len());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_voice_resume_cancels_the_pending_check() -> Result<()> {
    let temp_dir = TempDir::new()?;

    // Voice through t=400ms, then silence: the pause begins at t=1900ms
    // and a check is scheduled for t=2900ms. Voice resumes at t=2000ms,
    // which must cancel that check; speech then runs through t=2500ms
    // and the session ends via a fresh pause cycle at t=5000ms.
    let script = levels(&[(5, -20.0), (15, -70.0), (6, -20.0)]);
    let backend = ScriptedBackend::new(temp_dir.path(), script);

    let recorder = Recorder::new();
    recorder.start(config(), Box::new(backend)).await?;

    recorder.finished().await;
    let result = recorder.stop().await?;

    assert_eq!(result.reason, StopReason::SilenceDetected);
    assert!(
        result.duration_secs > 4.9,
        "the cancelled check at 2.9s must not fire, got {:.3}s",
        result.duration_secs
    );
    assert!((result.duration_secs - 5.0).abs() < 0.01);
    assert!(
        (result.speech_secs - 2.5).abs() < 0.01,
        "speech should span both bursts, got {:.3}s",
        result.speech_secs
    );

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_short_speech_burst_ends_at_the_first_check() -> Result<()> {
    let temp_dir = TempDir::new()?;

    // Voice from t=0 through t=300ms only. The pause begins at t=1800ms
    // and the check at t=2800ms finds the 0.5s minimum long satisfied.
    let script = levels(&[(4, -20.0)]);
    let backend = ScriptedBackend::new(temp_dir.path(), script);

    let recorder = Recorder::new();
    recorder.start(config(), Box::new(backend)).await?;

    recorder.finished().await;
    let result = recorder.stop().await?;

    assert_eq!(result.reason, StopReason::SilenceDetected);
    assert!((result.duration_secs - 2.8).abs() < 0.01);
    assert!((result.speech_secs - 0.3).abs() < 0.01);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_manual_stop_wins_over_a_pending_check() -> Result<()> {
    let temp_dir = TempDir::new()?;

    // Voice through t=1000ms; the pause begins at t=2500ms with a check
    // armed for t=3500ms. Stopping at t=3000ms must beat that check.
    let script = levels(&[(11, -20.0)]);
    let backend = ScriptedBackend::new(temp_dir.path(), script);

    let recorder = Recorder::new();
    recorder.start(config(), Box::new(backend)).await?;

    sleep(Duration::from_millis(3000)).await;
    let result = recorder.stop().await?;

    assert_eq!(
        result.reason,
        StopReason::ManualStop,
        "a stop issued before the check fires must win"
    );
    assert!((result.duration_secs - 3.0).abs() < 0.01);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_manual_stop_counts_speech_to_the_stop_instant() -> Result<()> {
    let temp_dir = TempDir::new()?;

    // Voice through t=900ms, then silence. Stopping at t=1550ms lands
    // inside the tolerated silence.
    let script = levels(&[(10, -20.0)]);
    let backend = ScriptedBackend::new(temp_dir.path(), script);

    let recorder = Recorder::new();
    recorder.start(config(), Box::new(backend)).await?;

    sleep(Duration::from_millis(1550)).await;
    let result = recorder.stop().await?;

    assert_eq!(result.reason, StopReason::ManualStop);
    assert!((result.duration_secs - 1.55).abs() < 0.01);
    // Manual stops count speech up to the stop instant, so the trailing
    // silence is included rather than cut at the last voice sample.
    assert!(
        (result.speech_secs - 1.55).abs() < 0.01,
        "manual stop should not truncate at last voice, got {:.3}s",
        result.speech_secs
    );

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_max_duration_supersedes_ongoing_voice() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = SessionConfig {
        max_duration: Duration::from_secs(2),
        ..config()
    };

    // Uninterrupted voice well past the cap.
    let script = levels(&[(30, -20.0)]);
    let backend = ScriptedBackend::new(temp_dir.path(), script);

    let recorder = Recorder::new();
    recorder.start(config, Box::new(backend)).await?;

    recorder.finished().await;
    let result = recorder.stop().await?;

    assert_eq!(result.reason, StopReason::MaxDurationReached);
    assert!((result.duration_secs - 2.0).abs() < 0.01);
    // The capping tick is not processed as voice, so speech ends at the
    // previous poll.
    assert!((result.speech_secs - 1.9).abs() < 0.01);
    assert!(result.file_path.is_some(), "capped recording keeps its file");

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_voiceless_session_runs_to_max_duration() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = SessionConfig {
        max_duration: Duration::from_secs(1),
        ..config()
    };

    // Nothing but floor-level silence; no end-of-speech cycle ever
    // starts, so only the cap can end the session.
    let backend = ScriptedBackend::new(temp_dir.path(), Vec::new());

    let recorder = Recorder::new();
    recorder.start(config, Box::new(backend)).await?;

    recorder.finished().await;
    let result = recorder.stop().await?;

    assert_eq!(result.reason, StopReason::MaxDurationReached);
    assert!((result.duration_secs - 1.0).abs() < 0.01);
    assert_eq!(result.speech_secs, 0.0, "no voice means zero speech");
    assert!(result.file_path.is_some());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_short_recording_is_not_cut_before_minimum_duration() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = SessionConfig {
        thinking_pause: Duration::from_millis(200),
        end_of_speech: Duration::from_millis(300),
        min_recording: Duration::from_millis(1000),
        ..config()
    };

    // A single voice poll at t=0, then silence. The first check fires
    // at t=300ms but the minimum is 1s, so the pause cycle repeats
    // until a check lands at t=1000ms.
    let script = levels(&[(1, -20.0)]);
    let backend = ScriptedBackend::new(temp_dir.path(), script);

    let recorder = Recorder::new();
    recorder.start(config, Box::new(backend)).await?;

    recorder.finished().await;
    let result = recorder.stop().await?;

    assert_eq!(result.reason, StopReason::SilenceDetected);
    assert!(
        result.duration_secs >= 0.99,
        "session must keep running until the minimum, got {:.3}s",
        result.duration_secs
    );
    assert!((result.duration_secs - 1.0).abs() < 0.01);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_poll_failure_ends_the_session_with_partial_artifact() -> Result<()> {
    let temp_dir = TempDir::new()?;

    // The script covers three polls; the fourth fails at t=300ms.
    let script = levels(&[(2, -70.0), (1, -20.0)]);
    let backend =
        ScriptedBackend::new(temp_dir.path(), script).with_failure(ScriptedFailure::PollFailure);

    let recorder = Recorder::new();
    recorder.start(config(), Box::new(backend)).await?;

    recorder.finished().await;
    let result = recorder.stop().await?;

    assert_eq!(result.reason, StopReason::Error);
    let message = result.error.as_deref().expect("error reason carries a message");
    assert!(
        message.contains("scripted poll failure"),
        "unexpected error message: {message}"
    );
    assert!((result.duration_secs - 0.3).abs() < 0.01);
    // What was captured before the failure is still finalized.
    let path = result.file_path.as_ref().expect("partial artifact is kept");
    assert!(path.exists());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_result_is_claimed_exactly_once() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let script = levels(&[(2, -70.0), (9, -20.0)]);
    let backend = ScriptedBackend::new(temp_dir.path(), script);

    let recorder = Recorder::new();
    recorder.start(config(), Box::new(backend)).await?;

    recorder.finished().await;
    assert!(
        !recorder.is_active(),
        "a naturally finished session is no longer active"
    );

    // The buffered result is claimed by the first stop and only by it.
    let result = recorder.stop().await?;
    assert_eq!(result.reason, StopReason::SilenceDetected);

    assert!(
        matches!(recorder.stop().await, Err(ControlError::NotRecording)),
        "second stop must not see a result"
    );

    Ok(())
}
