use crate::error::CaptureError;

/// Capture session state machine.
///
/// State transitions:
/// ```text
/// idle → acquiring → ready → recording → stopped → acquiring → ...
///            ↓                    ↓
///          failed ←───────────────┘ (hardware loss)
/// ```
///
/// `Failed` is terminal: a new session has to be constructed.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureState {
    Idle,
    Acquiring,
    Ready,
    Recording,
    Stopped,
    Failed(CaptureError),
}

impl CaptureState {
    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording)
    }

    /// Whether the session currently holds an acquired stream
    pub fn is_initialized(&self) -> bool {
        matches!(self, Self::Ready | Self::Recording)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Acquiring => "acquiring",
            Self::Ready => "ready",
            Self::Recording => "recording",
            Self::Stopped => "stopped",
            Self::Failed(_) => "failed",
        }
    }
}

impl std::fmt::Display for CaptureState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed(err) => write!(f, "failed ({})", err),
            other => f.write_str(other.label()),
        }
    }
}
