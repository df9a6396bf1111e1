// Example: Drive a recording session with a scripted level sequence
//
// This example demonstrates the complete session lifecycle without a
// microphone:
// 1. Build a ScriptedBackend that replays a fixed dBFS sequence
// 2. Arm a session and let the scripted voice activity start the recording
// 3. Watch the thinking pause and end-of-speech detection fire
// 4. Claim the result and print it as JSON
//
// Usage: cargo run --example scripted_session -- --voice-secs 2
//
// The synthetic recording is saved to ~/.voicegate/demo/

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, Level};
use voicegate::{Recorder, ScriptedBackend, SessionConfig, POLL_INTERVAL};

#[derive(Parser)]
#[command(name = "scripted_session")]
#[command(about = "Run a voice-activated session against scripted levels")]
struct Args {
    /// Seconds of scripted voice activity
    #[arg(short, long, default_value = "1.5")]
    voice_secs: f64,

    /// Level of the scripted voice in dBFS
    #[arg(long, default_value = "-20.0")]
    voice_db: f32,

    /// Output directory
    #[arg(short, long, default_value = "~/.voicegate/demo")]
    output_dir: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    let args = Args::parse();

    // Expand home directory
    let output_dir = shellexpand::tilde(&args.output_dir);
    let output_dir = PathBuf::from(output_dir.as_ref());

    info!("Voicegate - Scripted Session Example");
    info!("Output directory: {}", output_dir.display());

    // Two polls of ambient noise, then the scripted voice burst. The
    // backend replays silence once the script runs out, so the session
    // ends through end-of-speech detection on its own.
    let polls_per_sec = (1000 / POLL_INTERVAL.as_millis()) as usize;
    // The burst is capped at an hour of polls so a wild flag value cannot
    // allocate an unbounded script.
    let voice_secs = args.voice_secs.clamp(0.0, 3600.0);
    let voice_polls = (voice_secs * polls_per_sec as f64).round() as usize;
    let mut script = vec![-70.0; 2];
    script.extend(std::iter::repeat(args.voice_db).take(voice_polls));

    let backend = ScriptedBackend::new(output_dir, script);
    let config = SessionConfig::default();

    info!(
        "Session {}: {:.1}s of voice at {:.0} dBFS, then silence",
        config.session_id, voice_secs, args.voice_db
    );

    let recorder = Recorder::new();
    recorder.start(config, Box::new(backend)).await?;

    // Log progress once a second until the session ends on its own.
    loop {
        tokio::select! {
            () = recorder.finished() => break,
            () = sleep(Duration::from_secs(1)) => {
                if let Some(stats) = recorder.stats().await {
                    info!(
                        "t={:.1}s phase={:?} voice_detected={} speech={:.1}s",
                        stats.duration_secs, stats.phase, stats.voice_detected, stats.speech_secs
                    );
                }
            }
        }
    }

    let result = recorder.stop().await?;

    info!("Session complete!");
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}
