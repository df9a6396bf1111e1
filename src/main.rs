use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::time::Duration;
use tracing::info;
use voicegate::{list_input_devices, Config, MicBackend, Recorder, SessionConfig};

#[derive(Parser, Debug)]
#[command(name = "voicegate")]
#[command(about = "Voice-activated recording with automatic silence detection")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record from the microphone until trailing silence, max duration, or Ctrl+C
    Record(RecordArgs),
    /// List available input devices
    Devices,
}

#[derive(Args, Debug)]
struct RecordArgs {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<String>,

    /// Output directory for recordings
    #[arg(short, long)]
    output_dir: Option<String>,

    /// Input device name (system default when omitted)
    #[arg(short, long)]
    device: Option<String>,

    /// Maximum recording duration in seconds
    #[arg(long, value_parser = parse_secs)]
    max_duration: Option<Duration>,

    /// Silence tolerated mid-speech before an end-of-speech check is scheduled, in seconds
    #[arg(long, value_parser = parse_secs)]
    thinking_pause: Option<Duration>,

    /// Trailing silence that ends the recording, in seconds
    #[arg(long, value_parser = parse_secs)]
    end_of_speech: Option<Duration>,

    /// Noise floor in dBFS
    #[arg(long, allow_negative_numbers = true)]
    noise_floor_db: Option<f32>,

    /// Voice threshold in dBFS
    #[arg(long, allow_negative_numbers = true)]
    voice_threshold_db: Option<f32>,
}

/// Seconds flag value as a `Duration`. Negative values clamp to zero, like
/// the config file path; non-finite values are a parse error.
fn parse_secs(raw: &str) -> Result<Duration, String> {
    let secs = raw.parse::<f64>().map_err(|e| e.to_string())?;
    if secs < 0.0 {
        return Ok(Duration::ZERO);
    }
    Duration::try_from_secs_f64(secs).map_err(|_| "not a finite number of seconds".to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Record(args) => record(args).await,
        Command::Devices => {
            let devices = list_input_devices();
            if devices.is_empty() {
                println!("No input devices found");
            }
            for name in devices {
                println!("{name}");
            }
            Ok(())
        }
    }
}

async fn record(args: RecordArgs) -> Result<()> {
    let (mut config, mut output_dir) = match &args.config {
        Some(path) => {
            let file = Config::load(path)?;
            let output_dir = file.recording.output_dir.clone();
            (file.session_config()?, output_dir)
        }
        None => (SessionConfig::default(), "recordings".to_string()),
    };

    if let Some(dir) = args.output_dir {
        output_dir = dir;
    }
    if let Some(max_duration) = args.max_duration {
        config.max_duration = max_duration;
    }
    if let Some(thinking_pause) = args.thinking_pause {
        config.thinking_pause = thinking_pause;
    }
    if let Some(end_of_speech) = args.end_of_speech {
        config.end_of_speech = end_of_speech;
    }
    if let Some(db) = args.noise_floor_db {
        config.noise_floor_db = db;
    }
    if let Some(db) = args.voice_threshold_db {
        config.voice_threshold_db = db;
    }

    let mut backend = MicBackend::new(&output_dir);
    if let Some(name) = args.device {
        backend = backend.with_device(name);
    }

    let recorder = Recorder::new();
    recorder.start(config, Box::new(backend)).await?;

    info!("Recording armed, speak to begin. Press Ctrl+C to stop.");

    tokio::select! {
        () = recorder.finished() => {
            info!("Recording stopped on its own");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C received, stopping");
        }
    }

    let result = recorder.stop().await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}
