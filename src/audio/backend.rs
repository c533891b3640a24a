use anyhow::Result;
use tokio::sync::mpsc;

use super::file::FileProvider;
use crate::error::{CaptureError, PlatformError};

/// Raw audio delivered by a capture backend (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Number of sample frames (one sample per channel)
    pub fn frame_count(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    /// Duration covered by this frame in milliseconds
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.frame_count() as u64 * 1000 / self.sample_rate as u64
    }
}

/// Configuration for audio backends
///
/// Sample rate and channel count always follow the device (or file); the
/// decoder picks them up from each chunk.
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Frame size in milliseconds (affects latency)
    pub buffer_duration_ms: u64,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            buffer_duration_ms: 100,
        }
    }
}

/// An acquired input stream
///
/// Holding a backend means holding the device. Dropping it releases the
/// underlying stream.
#[async_trait::async_trait]
pub trait AudioBackend: Send + Sync {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive audio frames. The channel
    /// closing while the backend is still capturing means the device was lost.
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError>;

    /// Stop capturing audio
    async fn stop(&mut self) -> Result<(), CaptureError>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// The platform's capture capability
#[async_trait::async_trait]
pub trait MicrophoneProvider: Send + Sync {
    /// Whether this platform exposes any capture API at all
    fn is_available(&self) -> bool;

    /// Request access to an input device
    async fn acquire(&self) -> Result<Box<dyn AudioBackend>, PlatformError>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}

/// Audio source type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Default microphone input (requires the `cpal` feature)
    Microphone,
    /// WAV file replayed in real time
    File(String),
}

/// Audio provider factory
pub struct AudioBackendFactory;

impl AudioBackendFactory {
    /// Create a microphone provider for the given source
    pub fn create(
        source: AudioSource,
        config: AudioBackendConfig,
    ) -> Result<Box<dyn MicrophoneProvider>> {
        match source {
            AudioSource::Microphone => {
                #[cfg(feature = "cpal")]
                {
                    use super::microphone::CpalProvider;
                    Ok(Box::new(CpalProvider::new(config)))
                }

                #[cfg(not(feature = "cpal"))]
                {
                    let _ = config;
                    tracing::warn!("Built without the `cpal` feature, no microphone capture available");
                    Ok(Box::new(UnavailableProvider))
                }
            }

            AudioSource::File(path) => Ok(Box::new(FileProvider::new(path, config))),
        }
    }
}

/// Stands in for a platform without any capture API
///
/// `CaptureSession::initialize` reports `CapabilityUnavailable` for it.
pub struct UnavailableProvider;

#[async_trait::async_trait]
impl MicrophoneProvider for UnavailableProvider {
    fn is_available(&self) -> bool {
        false
    }

    async fn acquire(&self) -> Result<Box<dyn AudioBackend>, PlatformError> {
        Err(PlatformError::new("NotSupportedError", "no capture API on this build"))
    }

    fn name(&self) -> &str {
        "unavailable"
    }
}
