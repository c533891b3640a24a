// Scripted capture platform shared by the integration tests
//
// Produces 16kHz stereo frames every `frame_ms` with a constant left level
// of 0.5 and right level of -0.25, so every downmixed sample is 0.125.

#![allow(dead_code)]

use mic_capture::audio::{AudioBackend, AudioFrame, MicrophoneProvider};
use mic_capture::{CaptureError, PlatformError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const SAMPLE_RATE: u32 = 16000;
pub const LEFT: i16 = 16384;
pub const RIGHT: i16 = -8192;
pub const EXPECTED_MONO: f32 = 0.125;

pub struct ScriptedProvider {
    pub available: bool,
    pub failure: Option<PlatformError>,
    pub frame_ms: u64,
    pub hang_up_after: Option<usize>,
    pub acquisitions: Arc<AtomicUsize>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            available: true,
            failure: None,
            frame_ms: 10,
            hang_up_after: None,
            acquisitions: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            failure: Some(PlatformError::new(name, "scripted failure")),
            ..Self::new()
        }
    }

    /// Device disappears after `frames` frames have been delivered
    pub fn hanging_up_after(frames: usize) -> Self {
        Self {
            hang_up_after: Some(frames),
            ..Self::new()
        }
    }

    pub fn acquisition_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.acquisitions)
    }
}

#[async_trait::async_trait]
impl MicrophoneProvider for ScriptedProvider {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn acquire(&self) -> Result<Box<dyn AudioBackend>, PlatformError> {
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }

        self.acquisitions.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(ScriptedBackend {
            frame_ms: self.frame_ms,
            hang_up_after: self.hang_up_after,
            feeder: None,
        }))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub struct ScriptedBackend {
    frame_ms: u64,
    hang_up_after: Option<usize>,
    feeder: Option<JoinHandle<()>>,
}

#[async_trait::async_trait]
impl AudioBackend for ScriptedBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        let (tx, rx) = mpsc::channel(64);
        let frame_ms = self.frame_ms;
        let hang_up_after = self.hang_up_after.unwrap_or(usize::MAX);

        self.feeder = Some(tokio::spawn(async move {
            let frames_per_buffer = (SAMPLE_RATE as u64 * frame_ms / 1000) as usize;
            let mut timestamp_ms = 0;

            for _ in 0..hang_up_after {
                tokio::time::sleep(Duration::from_millis(frame_ms)).await;

                let frame = AudioFrame {
                    samples: [LEFT, RIGHT].repeat(frames_per_buffer),
                    sample_rate: SAMPLE_RATE,
                    channels: 2,
                    timestamp_ms,
                };
                timestamp_ms += frame_ms;

                if tx.send(frame).await.is_err() {
                    break;
                }
            }
        }));

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        if let Some(feeder) = self.feeder.take() {
            feeder.abort();
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.feeder.as_ref().is_some_and(|f| !f.is_finished())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
