use serde::{Deserialize, Serialize};

use super::config::SessionConfig;
use crate::audio::ResourceRef;

/// Session state machine
///
/// `Idle -> Capturing <-> Rotating`, `Capturing -> Recovering -> Capturing | Stopping`,
/// `-> Stopping -> Stopped`, and any state `-> Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Capturing,
    Rotating,
    Recovering,
    Stopping,
    Stopped,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Stopped | SessionState::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    Pending,
    Uploading,
    Uploaded,
    Failed,
}

/// Who asked for the stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    User,
    System,
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum StopCause {
    /// Explicit user stop
    User,
    /// System stop requested through the handle
    System,
    /// Session reached `max_session_duration_ms`
    MaxDuration,
    /// The next segment's capture could not be started
    CaptureRestartFailed { reason: String },
    /// Every handle was dropped while capturing
    Abandoned,
}

impl StopCause {
    pub fn reason(&self) -> StopReason {
        match self {
            StopCause::User => StopReason::User,
            _ => StopReason::System,
        }
    }
}

impl From<StopReason> for StopCause {
    fn from(reason: StopReason) -> Self {
        match reason {
            StopReason::User => StopCause::User,
            StopReason::System => StopCause::System,
        }
    }
}

/// One captured segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentRecord {
    /// 0-based, contiguous
    pub index: usize,
    /// Captured resource; kept until upload succeeds
    pub local_handle: Option<ResourceRef>,
    pub remote_location: Option<String>,
    /// Wall-clock capture length, set on commit
    pub duration_ms: u64,
    pub upload_state: UploadState,
    pub retry_count: u32,
    /// False once the capture has stopped and the duration is committed
    pub capturing: bool,
}

impl SegmentRecord {
    pub(crate) fn new(index: usize, resource: ResourceRef) -> Self {
        Self {
            index,
            local_handle: Some(resource),
            remote_location: None,
            duration_ms: 0,
            upload_state: UploadState::Pending,
            retry_count: 0,
            capturing: true,
        }
    }
}

/// Data model for one recording attempt
///
/// Mutated only by the session controller.
#[derive(Debug, Clone)]
pub struct RecordingSession {
    pub session_id: String,
    pub segments: Vec<SegmentRecord>,
    /// Sum of durations of segments that have stopped capturing
    pub total_committed_duration_ms: u64,
    pub state: SessionState,
    pub config: SessionConfig,
}

impl RecordingSession {
    pub fn new(session_id: String, config: SessionConfig) -> Self {
        Self {
            session_id,
            segments: Vec::new(),
            total_committed_duration_ms: 0,
            state: SessionState::Idle,
            config,
        }
    }

    /// Index the next segment will get
    pub fn next_index(&self) -> usize {
        self.segments.len()
    }

    /// Locations of uploaded segments, in capture order
    pub fn uploaded_locations(&self) -> Vec<String> {
        self.segments
            .iter()
            .filter_map(|s| s.remote_location.clone())
            .collect()
    }

    pub fn uploaded_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| s.upload_state == UploadState::Uploaded)
            .count()
    }

    pub fn failed_indices(&self) -> Vec<usize> {
        self.segments
            .iter()
            .filter(|s| s.upload_state == UploadState::Failed)
            .map(|s| s.index)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_user_stop_reports_user_reason() {
        assert_eq!(StopCause::User.reason(), StopReason::User);
        assert_eq!(StopCause::MaxDuration.reason(), StopReason::System);
        assert_eq!(StopCause::Abandoned.reason(), StopReason::System);
        assert_eq!(
            StopCause::CaptureRestartFailed { reason: "no input".to_string() }.reason(),
            StopReason::System
        );
        assert_eq!(StopCause::from(StopReason::System), StopCause::System);
    }
}
