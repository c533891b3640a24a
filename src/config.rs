use anyhow::{Context, Result};
use serde::Deserialize;

use crate::audio::{AudioBackendConfig, AudioSource};
use crate::session::SessionConfig;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub capture: CaptureConfig,
    pub audio: AudioConfig,
}

#[derive(Debug, Deserialize)]
pub struct CaptureConfig {
    pub chunk_interval_ms: u64,
    /// WAV file to replay instead of the live microphone
    pub file: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    pub buffer_duration_ms: u64,
}

impl Config {
    /// Load configuration from `path` (optional) and `MIC_CAPTURE_*` env vars (`__` separates sections)
    pub fn load(path: &str) -> Result<Self> {
        let defaults = AudioBackendConfig::default();

        let settings = config::Config::builder()
            .set_default("capture.chunk_interval_ms", 1000i64)?
            .set_default("audio.buffer_duration_ms", defaults.buffer_duration_ms as i64)?
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("MIC_CAPTURE").separator("__"))
            .build()
            .with_context(|| format!("Failed to load configuration from {}", path))?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            chunk_interval_ms: self.capture.chunk_interval_ms,
            ..SessionConfig::default()
        }
    }

    pub fn backend_config(&self) -> AudioBackendConfig {
        AudioBackendConfig {
            buffer_duration_ms: self.audio.buffer_duration_ms,
        }
    }

    pub fn source(&self) -> AudioSource {
        match &self.capture.file {
            Some(path) => AudioSource::File(path.clone()),
            None => AudioSource::Microphone,
        }
    }
}
