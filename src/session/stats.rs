use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::model::SessionState;

/// Read-only snapshot of a recording session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: String,

    pub state: SessionState,

    /// When the recording started
    pub started_at: DateTime<Utc>,

    /// Committed plus in-progress duration in milliseconds
    pub elapsed_ms: u64,

    /// Duration of segments that have stopped capturing
    pub committed_duration_ms: u64,

    /// Number of segments produced so far, including the one capturing
    pub segments_count: usize,

    /// Number of segments stored remotely ("N segments saved")
    pub segments_uploaded: usize,

    /// Uploads still running
    pub uploads_in_flight: usize,

    /// Input level for display, 0.0..=1.0
    pub level: f32,
}

impl SessionStats {
    pub(crate) fn initial(session_id: String, state: SessionState) -> Self {
        Self {
            session_id,
            state,
            started_at: Utc::now(),
            elapsed_ms: 0,
            committed_duration_ms: 0,
            segments_count: 0,
            segments_uploaded: 0,
            uploads_in_flight: 0,
            level: 0.0,
        }
    }

    pub fn is_uploading(&self) -> bool {
        self.uploads_in_flight > 0
    }
}
