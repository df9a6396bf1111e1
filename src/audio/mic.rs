use super::backend::{CaptureArtifact, CaptureBackend, CaptureError};
use crate::session::SessionConfig;
use crate::vad::{rms, LevelSample, SILENCE_FLOOR_DBFS};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::{Arc, Mutex as StdMutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{error, info, warn};

/// Commands sent to the capture thread
enum CaptureCommand {
    Stop,
}

/// Microphone capture backend built on cpal.
///
/// The cpal stream is not `Send`, so it lives on a dedicated thread whose
/// callback appends normalized samples to a shared buffer. `poll_level`
/// drains that buffer once per tick, computing the RMS level and writing
/// the drained block to the WAV file incrementally, so the output file
/// exists and grows for the whole session.
pub struct MicBackend {
    output_dir: PathBuf,
    device_name: Option<String>,
    buffer: Arc<StdMutex<Vec<f32>>>,
    active: Option<ActiveCapture>,
}

struct ActiveCapture {
    command_tx: mpsc::Sender<CaptureCommand>,
    thread_handle: Option<JoinHandle<()>>,
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    path: PathBuf,
}

impl Drop for ActiveCapture {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("Failed to finalize WAV writer on drop: {}", e);
            }
        }
    }
}

impl MicBackend {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            device_name: None,
            buffer: Arc::new(StdMutex::new(Vec::new())),
            active: None,
        }
    }

    /// Capture from the named input device instead of the default one.
    pub fn with_device(mut self, name: impl Into<String>) -> Self {
        self.device_name = Some(name.into());
        self
    }

    fn find_device(&self) -> Result<cpal::Device, CaptureError> {
        let host = cpal::default_host();

        match &self.device_name {
            Some(name) => {
                let mut devices = host
                    .input_devices()
                    .map_err(|e| classify_device_error(e.to_string()))?;
                devices
                    .find(|d| d.name().map(|n| n == *name).unwrap_or(false))
                    .ok_or_else(|| {
                        CaptureError::DeviceConfig(format!("input device not found: {}", name))
                    })
            }
            None => host.default_input_device().ok_or(CaptureError::NoDevice),
        }
    }

    fn lock_buffer(&self) -> std::sync::MutexGuard<'_, Vec<f32>> {
        self.buffer.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait::async_trait]
impl CaptureBackend for MicBackend {
    async fn start_capture(&mut self, config: &SessionConfig) -> Result<(), CaptureError> {
        if self.active.is_some() {
            return Err(CaptureError::Stream("capture already active".to_string()));
        }

        let device = self.find_device()?;
        let device_config = device
            .default_input_config()
            .map_err(|e| classify_device_error(e.to_string()))?;

        let sample_rate = device_config.sample_rate().0;
        let channels = device_config.channels();
        if sample_rate != config.sample_rate {
            info!(
                "Requested {} Hz but device runs at {} Hz, recording at device rate",
                config.sample_rate, sample_rate
            );
        }

        fs::create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join(format!("{}.wav", config.session_id));

        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(&path, spec)
            .map_err(|e| CaptureError::Encoding(e.to_string()))?;

        self.lock_buffer().clear();

        let buffer = Arc::clone(&self.buffer);
        let sample_format = device_config.sample_format();
        let stream_config: cpal::StreamConfig = device_config.into();
        let (command_tx, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();

        let thread_handle = thread::spawn(move || {
            run_capture_thread(
                device,
                stream_config,
                sample_format,
                buffer,
                command_rx,
                ready_tx,
            )
        });

        // The stream is built and started on the capture thread; wait for
        // its verdict so start failures are synchronous.
        match ready_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = thread_handle.join();
                let _ = fs::remove_file(&path);
                return Err(e);
            }
            Err(_) => {
                drop(command_tx);
                let _ = thread_handle.join();
                let _ = fs::remove_file(&path);
                return Err(CaptureError::Stream(
                    "capture thread did not report readiness".to_string(),
                ));
            }
        }

        info!(
            "Microphone capture started: {} ({} Hz, {} channels)",
            path.display(),
            sample_rate,
            channels
        );
        self.active = Some(ActiveCapture {
            command_tx,
            thread_handle: Some(thread_handle),
            writer: Some(writer),
            path,
        });
        Ok(())
    }

    async fn poll_level(&mut self) -> Result<LevelSample, CaptureError> {
        let drained = {
            let mut buffer = self.lock_buffer();
            std::mem::take(&mut *buffer)
        };

        let active = self.active.as_mut().ok_or(CaptureError::NotActive)?;

        if drained.is_empty() {
            return Ok(LevelSample::Dbfs(SILENCE_FLOOR_DBFS));
        }

        let level = rms(&drained);
        if let Some(writer) = active.writer.as_mut() {
            for &sample in &drained {
                writer
                    .write_sample(float_to_i16(sample))
                    .map_err(|e| CaptureError::Encoding(e.to_string()))?;
            }
        }

        Ok(LevelSample::Amplitude(level))
    }

    async fn stop_capture(&mut self) -> Result<CaptureArtifact, CaptureError> {
        let mut active = self.active.take().ok_or(CaptureError::NotActive)?;
        stop_capture_thread(&mut active);

        // Flush whatever the callback appended after the last poll.
        let drained = {
            let mut buffer = self.lock_buffer();
            std::mem::take(&mut *buffer)
        };
        if let Some(writer) = active.writer.as_mut() {
            for &sample in &drained {
                writer
                    .write_sample(float_to_i16(sample))
                    .map_err(|e| CaptureError::Encoding(e.to_string()))?;
            }
        }
        if let Some(writer) = active.writer.take() {
            writer
                .finalize()
                .map_err(|e| CaptureError::Encoding(e.to_string()))?;
        }

        let size_bytes = fs::metadata(&active.path)?.len();
        info!(
            "Microphone capture stopped: {} ({} bytes)",
            active.path.display(),
            size_bytes
        );
        Ok(CaptureArtifact {
            path: active.path.clone(),
            size_bytes,
        })
    }

    async fn discard_capture(&mut self) -> Result<(), CaptureError> {
        if let Some(mut active) = self.active.take() {
            stop_capture_thread(&mut active);
            drop(active.writer.take());
            fs::remove_file(&active.path)?;
            self.lock_buffer().clear();
            info!("Microphone capture discarded: {}", active.path.display());
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "microphone"
    }
}

impl Drop for MicBackend {
    fn drop(&mut self) {
        if let Some(mut active) = self.active.take() {
            stop_capture_thread(&mut active);
        }
    }
}

fn stop_capture_thread(active: &mut ActiveCapture) {
    // Ignore send failure: the thread may have exited already.
    let _ = active.command_tx.send(CaptureCommand::Stop);
    if let Some(handle) = active.thread_handle.take() {
        if handle.join().is_err() {
            warn!("Capture thread panicked");
        }
    }
}

fn float_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

fn classify_device_error(message: String) -> CaptureError {
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") {
        CaptureError::PermissionDenied
    } else {
        CaptureError::DeviceConfig(message)
    }
}

/// Run the cpal stream on a dedicated thread until told to stop.
fn run_capture_thread(
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_format: SampleFormat,
    buffer: Arc<StdMutex<Vec<f32>>>,
    command_rx: mpsc::Receiver<CaptureCommand>,
    ready_tx: mpsc::Sender<Result<(), CaptureError>>,
) {
    use cpal::Sample;

    let err_fn = |err| {
        error!("Audio stream error: {}", err);
    };

    let stream = match sample_format {
        SampleFormat::F32 => {
            let buffer = buffer.clone();
            device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = buffer.lock() {
                        buf.extend_from_slice(data);
                    }
                },
                err_fn,
                None,
            )
        }
        SampleFormat::I16 => {
            let buffer = buffer.clone();
            device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let samples: Vec<f32> = data.iter().map(|&s| s.to_float_sample()).collect();
                    if let Ok(mut buf) = buffer.lock() {
                        buf.extend_from_slice(&samples);
                    }
                },
                err_fn,
                None,
            )
        }
        SampleFormat::U16 => {
            let buffer = buffer.clone();
            device.build_input_stream(
                &config,
                move |data: &[u16], _: &cpal::InputCallbackInfo| {
                    let samples: Vec<f32> = data.iter().map(|&s| s.to_float_sample()).collect();
                    if let Ok(mut buf) = buffer.lock() {
                        buf.extend_from_slice(&samples);
                    }
                },
                err_fn,
                None,
            )
        }
        other => {
            let _ = ready_tx.send(Err(CaptureError::DeviceConfig(format!(
                "unsupported sample format: {:?}",
                other
            ))));
            return;
        }
    };

    let stream = match stream {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(classify_stream_error(e.to_string())));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(classify_stream_error(e.to_string())));
        return;
    }
    let _ = ready_tx.send(Ok(()));

    loop {
        match command_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(CaptureCommand::Stop) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    // Stream is dropped here, stopping capture
}

fn classify_stream_error(message: String) -> CaptureError {
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") {
        CaptureError::PermissionDenied
    } else {
        CaptureError::Stream(message)
    }
}

/// Names of the available input devices.
pub fn list_input_devices() -> Vec<String> {
    let host = cpal::default_host();
    host.input_devices()
        .map(|devices| devices.filter_map(|d| d.name().ok()).collect())
        .unwrap_or_default()
}
