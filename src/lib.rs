pub mod audio;
pub mod config;
pub mod error;
pub mod session;

pub use audio::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioChunk, AudioFile, AudioFrame,
    AudioSource, ChunkSlicer, DecodedAudioBuffer, MicrophoneProvider, MonoAmplitudeSequence,
    MonoDownmixer,
};
pub use config::Config;
pub use error::{CaptureError, PlatformError};
pub use session::{AmplitudePipeline, CaptureSession, CaptureState, SessionConfig, SessionStats};
