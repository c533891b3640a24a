use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Configuration for a capture session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Identifier used in log lines and stats (e.g., "capture-20261019-101500")
    pub session_id: String,

    /// Default chunk emission interval when `start` is given none
    /// Default: 1000 ms
    pub chunk_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("capture-{}", Utc::now().format("%Y%m%d-%H%M%S")),
            chunk_interval_ms: 1000,
        }
    }
}
