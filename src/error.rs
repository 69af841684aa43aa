//! Session error taxonomy
//!
//! Only whole-session-ending conditions reach the caller. Per-segment upload
//! failures are absorbed by the upload pipeline and show up on the completion.

use thiserror::Error;

/// Errors surfaced by a recording session
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Invalid session configuration: {0}")]
    InvalidConfig(String),

    #[error("Capture permission denied")]
    PermissionDenied,

    #[error("Failed to start capture: {0}")]
    CaptureStartFailed(String),

    #[error("Capture interrupted and could not be recovered: {0}")]
    CaptureInterrupted(String),

    #[error("Segment {index} failed to upload after {attempts} attempts")]
    SegmentUploadFailed { index: usize, attempts: u32 },

    #[error("No segments were uploaded for session {session_id}")]
    NoSegmentsUploaded { session_id: String },

    #[error("Session was cancelled")]
    Cancelled,

    #[error("Session {0} is no longer running")]
    SessionClosed(String),
}

impl SessionError {
    /// Stable machine-readable code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::InvalidConfig(_) => "INVALID_CONFIG",
            SessionError::PermissionDenied => "PERMISSION_DENIED",
            SessionError::CaptureStartFailed(_) => "CAPTURE_START_FAILED",
            SessionError::CaptureInterrupted(_) => "CAPTURE_INTERRUPTED",
            SessionError::SegmentUploadFailed { .. } => "SEGMENT_UPLOAD_FAILED",
            SessionError::NoSegmentsUploaded { .. } => "NO_SEGMENTS_UPLOADED",
            SessionError::Cancelled => "CANCELLED",
            SessionError::SessionClosed(_) => "SESSION_CLOSED",
        }
    }
}
