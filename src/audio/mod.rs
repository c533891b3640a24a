pub mod backend;
pub mod chunk;
pub mod decode;
pub mod downmix;
pub mod file;

#[cfg(feature = "cpal")]
pub mod microphone;

pub use backend::{AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioSource, MicrophoneProvider};
pub use chunk::{AudioChunk, ChunkSlicer};
pub use decode::{AudioDecoder, DecodedAudioBuffer, SymphoniaDecoder};
pub use downmix::{downmix_buffer, MonoAmplitudeSequence, MonoDownmixer};
pub use file::{AudioFile, FileBackend, FileProvider};
