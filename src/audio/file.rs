use anyhow::{Context, Result};
use hound::WavReader;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame, MicrophoneProvider};
use crate::error::{CaptureError, PlatformError};

pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path)
            .context("Failed to open WAV file")?;

        let spec = reader.spec();
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds = samples.len() as f64 /
            (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }
}

/// Provides a "microphone" backed by a WAV file
///
/// The file is replayed in a loop at real-time pace, so it behaves like a
/// live input that never runs dry.
pub struct FileProvider {
    path: PathBuf,
    config: AudioBackendConfig,
}

impl FileProvider {
    pub fn new(path: impl Into<PathBuf>, config: AudioBackendConfig) -> Self {
        Self {
            path: path.into(),
            config,
        }
    }
}

#[async_trait::async_trait]
impl MicrophoneProvider for FileProvider {
    fn is_available(&self) -> bool {
        true
    }

    async fn acquire(&self) -> Result<Box<dyn AudioBackend>, PlatformError> {
        if !self.path.exists() {
            return Err(PlatformError::new(
                "NotFoundError",
                format!("{} does not exist", self.path.display()),
            ));
        }

        let audio = AudioFile::open(&self.path)
            .map_err(|e| PlatformError::new("NotReadableError", format!("{:#}", e)))?;

        if audio.samples.is_empty() || audio.channels == 0 {
            return Err(PlatformError::new(
                "NotReadableError",
                format!("{} contains no audio", audio.path),
            ));
        }

        Ok(Box::new(FileBackend::new(audio, self.config.buffer_duration_ms)))
    }

    fn name(&self) -> &str {
        "file"
    }
}

/// Replays decoded file samples as timed frames
pub struct FileBackend {
    audio: std::sync::Arc<AudioFile>,
    buffer_duration_ms: u64,
    feeder: Option<JoinHandle<()>>,
}

impl FileBackend {
    pub fn new(audio: AudioFile, buffer_duration_ms: u64) -> Self {
        Self {
            audio: std::sync::Arc::new(audio),
            buffer_duration_ms: buffer_duration_ms.max(1),
            feeder: None,
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for FileBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        if self.feeder.is_some() {
            return Err(CaptureError::Unknown("file backend already started".into()));
        }

        let (tx, rx) = mpsc::channel(100);
        let audio = std::sync::Arc::clone(&self.audio);
        let buffer_duration_ms = self.buffer_duration_ms;

        let feeder = tokio::spawn(async move {
            let channels = audio.channels as usize;
            let frames_per_buffer =
                (audio.sample_rate as u64 * buffer_duration_ms / 1000).max(1) as usize;
            let samples_per_buffer = frames_per_buffer * channels;

            let mut ticker = tokio::time::interval(Duration::from_millis(buffer_duration_ms));
            let mut timestamp_ms = 0u64;

            for samples in audio.samples.chunks(samples_per_buffer).cycle() {
                ticker.tick().await;

                let frame = AudioFrame {
                    samples: samples.to_vec(),
                    sample_rate: audio.sample_rate,
                    channels: audio.channels,
                    timestamp_ms,
                };
                timestamp_ms += frame.duration_ms();

                if tx.send(frame).await.is_err() {
                    debug!("Frame receiver dropped, ending file replay");
                    break;
                }
            }
        });

        self.feeder = Some(feeder);
        info!("File replay started: {}", self.audio.path);

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        if let Some(feeder) = self.feeder.take() {
            feeder.abort();
            info!("File replay stopped: {}", self.audio.path);
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.feeder.as_ref().is_some_and(|f| !f.is_finished())
    }

    fn name(&self) -> &str {
        "file"
    }
}

impl Drop for FileBackend {
    fn drop(&mut self) {
        if let Some(feeder) = self.feeder.take() {
            feeder.abort();
        }
    }
}
