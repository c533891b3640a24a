//! Live microphone capture via `cpal`.
//!
//! `cpal::Stream` is not `Send` on every host, so the stream is built and
//! kept alive on a dedicated thread. The backend only holds a stop signal
//! and the join handle for that thread.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame, MicrophoneProvider};
use crate::error::{CaptureError, PlatformError};

/// Default input device of the default cpal host
pub struct CpalProvider {
    config: AudioBackendConfig,
}

impl CpalProvider {
    pub fn new(config: AudioBackendConfig) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl MicrophoneProvider for CpalProvider {
    fn is_available(&self) -> bool {
        !cpal::available_hosts().is_empty()
    }

    async fn acquire(&self) -> Result<Box<dyn AudioBackend>, PlatformError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| PlatformError::new("NotFoundError", "no default input device"))?;

        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

        // Probing the config is the closest cpal gets to a permission check
        let supported = device
            .default_input_config()
            .map_err(|e| PlatformError::new("NotReadableError", e.to_string()))?;

        info!(
            "Acquired input device '{}': {}Hz, {} channels, {:?}",
            device_name,
            supported.sample_rate().0,
            supported.channels(),
            supported.sample_format()
        );

        Ok(Box::new(CpalBackend {
            device_name,
            buffer_duration_ms: self.config.buffer_duration_ms,
            worker: None,
        }))
    }

    fn name(&self) -> &str {
        "cpal"
    }
}

struct StreamWorker {
    stop_tx: std_mpsc::Sender<()>,
    thread: JoinHandle<()>,
}

pub struct CpalBackend {
    device_name: String,
    buffer_duration_ms: u64,
    worker: Option<StreamWorker>,
}

#[async_trait::async_trait]
impl AudioBackend for CpalBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        if self.worker.is_some() {
            return Err(CaptureError::Unknown("microphone already started".into()));
        }

        // Deep enough for a couple of seconds of callbacks
        let capacity = (2000 / self.buffer_duration_ms.max(1)).max(16) as usize;
        let (tx, rx) = mpsc::channel(capacity);
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<(), CaptureError>>();

        let thread = std::thread::Builder::new()
            .name("mic-capture-cpal".to_string())
            .spawn(move || run_stream(tx, stop_rx, ready_tx))
            .map_err(|e| CaptureError::Unknown(e.to_string()))?;

        let ready = tokio::task::spawn_blocking(move || ready_rx.recv())
            .await
            .map_err(|e| CaptureError::Unknown(e.to_string()))?
            .map_err(|_| CaptureError::DeviceUnreadable)?;
        ready?;

        self.worker = Some(StreamWorker { stop_tx, thread });
        info!("Microphone stream started: {}", self.device_name);

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
            tokio::task::spawn_blocking(move || worker.thread.join())
                .await
                .map_err(|e| CaptureError::Unknown(e.to_string()))?
                .map_err(|_| CaptureError::Unknown("microphone thread panicked".into()))?;
            info!("Microphone stream stopped: {}", self.device_name);
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.thread.is_finished())
    }

    fn name(&self) -> &str {
        "cpal"
    }
}

impl Drop for CpalBackend {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
        }
    }
}

fn run_stream(
    tx: mpsc::Sender<AudioFrame>,
    stop_rx: std_mpsc::Receiver<()>,
    ready_tx: std_mpsc::Sender<Result<(), CaptureError>>,
) {
    let stream = match build_stream(tx) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        error!("Failed to start microphone stream: {}", e);
        let _ = ready_tx.send(Err(CaptureError::DeviceUnreadable));
        return;
    }
    let _ = ready_tx.send(Ok(()));

    // Either an explicit stop or the backend being dropped ends the stream
    let _ = stop_rx.recv();
    drop(stream);
}

fn build_stream(tx: mpsc::Sender<AudioFrame>) -> Result<cpal::Stream, CaptureError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or(CaptureError::DeviceNotFound)?;
    let supported = device
        .default_input_config()
        .map_err(|_| CaptureError::DeviceUnreadable)?;

    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();

    match sample_format {
        cpal::SampleFormat::F32 => build_typed_stream::<f32>(&device, &config, tx),
        cpal::SampleFormat::I16 => build_typed_stream::<i16>(&device, &config, tx),
        cpal::SampleFormat::U16 => build_typed_stream::<u16>(&device, &config, tx),
        other => Err(CaptureError::Unknown(format!(
            "unsupported sample format {:?}",
            other
        ))),
    }
}

fn build_typed_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    tx: mpsc::Sender<AudioFrame>,
) -> Result<cpal::Stream, CaptureError>
where
    T: SizedSample,
    i16: FromSample<T>,
{
    let sample_rate = config.sample_rate.0;
    let channels = config.channels;
    let mut frames_seen: u64 = 0;

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let frame = AudioFrame {
                    samples: data.iter().map(|s| i16::from_sample(*s)).collect(),
                    sample_rate,
                    channels,
                    timestamp_ms: frames_seen * 1000 / sample_rate.max(1) as u64,
                };
                frames_seen += frame.frame_count() as u64;

                // Never block the audio thread; a full queue drops the buffer
                if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(frame) {
                    warn!("Frame queue full, dropping microphone buffer");
                }
            },
            |err: cpal::StreamError| {
                error!("cpal stream error: {}", err);
            },
            None,
        )
        .map_err(|e| match e {
            cpal::BuildStreamError::DeviceNotAvailable => CaptureError::DeviceNotFound,
            other => {
                error!("Failed to build input stream: {}", other);
                CaptureError::DeviceUnreadable
            }
        })
}
