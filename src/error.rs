use thiserror::Error;

/// Errors surfaced by capture sessions and the downmix pipeline
///
/// Initialization failures are returned to the caller; decode failures are
/// recovered locally by dropping the offending chunk.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Audio recording is not supported on this platform")]
    CapabilityUnavailable,

    #[error("Please enable microphone permissions")]
    PermissionDenied,

    #[error("No recording device found")]
    DeviceNotFound,

    #[error("A hardware error has occurred")]
    DeviceUnreadable,

    #[error("Security settings are blocking audio recording")]
    SecurityBlocked,

    #[error("An OS abort error has occurred")]
    Aborted,

    #[error("Initialize the capture session first")]
    NotInitialized,

    #[error("Failed to decode audio chunk: {0}")]
    DecodeError(String),

    #[error("An unknown error has occurred: {0}")]
    Unknown(String),
}

/// Raw error reported by a capture platform before normalisation
///
/// `name` is the platform's error identifier (e.g. `NotAllowedError`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformError {
    pub name: String,
    pub message: String,
}

impl PlatformError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for PlatformError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

impl From<PlatformError> for CaptureError {
    fn from(err: PlatformError) -> Self {
        match err.name.as_str() {
            "AbortError" => CaptureError::Aborted,
            "NotAllowedError" | "PermissionDeniedError" => CaptureError::PermissionDenied,
            "NotFoundError" | "DevicesNotFoundError" => CaptureError::DeviceNotFound,
            "NotReadableError" | "TrackStartError" => CaptureError::DeviceUnreadable,
            // TypeError is raised when policy forbids the request outright
            "SecurityError" | "TypeError" => CaptureError::SecurityBlocked,
            "NotSupportedError" => CaptureError::CapabilityUnavailable,
            _ => CaptureError::Unknown(err.name),
        }
    }
}

impl CaptureError {
    /// Whether this error puts a session into its terminal failed state
    pub fn is_fatal(&self) -> bool {
        !matches!(self, CaptureError::NotInitialized | CaptureError::DecodeError(_))
    }
}
