use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Statistics about a capture session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: String,

    /// Current state label (idle, ready, recording, ...)
    pub state: String,

    /// Whether recording is currently active
    pub is_recording: bool,

    /// When the session was created
    pub started_at: DateTime<Utc>,

    /// Seconds since the session was created
    pub duration_secs: f64,

    /// Number of underlying device acquisitions
    pub acquisitions: usize,

    /// Chunks handed to the chunk handler
    pub chunks_emitted: usize,

    /// Chunks successfully decoded and downmixed
    pub chunks_decoded: usize,

    /// Chunks dropped because they failed to encode or decode
    pub chunks_dropped: usize,

    /// Amplitude sequences delivered to the caller
    pub sequences_delivered: usize,

    /// Decoded results thrown away because recording had stopped
    pub results_discarded: usize,
}

/// Live counters shared between a session and its tasks
#[derive(Debug, Default)]
pub(crate) struct SessionCounters {
    pub acquisitions: AtomicUsize,
    pub chunks_emitted: AtomicUsize,
    pub chunks_decoded: AtomicUsize,
    pub chunks_dropped: AtomicUsize,
    pub sequences_delivered: AtomicUsize,
    pub results_discarded: AtomicUsize,
}

impl SessionCounters {
    pub fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}
