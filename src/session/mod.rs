//! Capture session management
//!
//! This module provides the `CaptureSession` abstraction that manages:
//! - Microphone acquisition and release
//! - Time-sliced chunk emission while recording
//! - The amplitude pipeline (decode + mono downmix) on top of emitted chunks
//! - Session statistics and state management

mod config;
mod pipeline;
mod session;
mod state;
mod stats;

pub use config::SessionConfig;
pub use pipeline::AmplitudePipeline;
pub use session::{CaptureSession, ChunkHandler, SessionHandle};
pub use state::CaptureState;
pub use stats::SessionStats;
