use serde::Serialize;

use super::model::{SegmentRecord, StopCause};
use crate::error::SessionError;

/// Delivered once when a session stops with at least one uploaded segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionCompletion {
    pub session_id: String,
    /// Locations of uploaded segments, in capture order
    pub segment_locations: Vec<String>,
    pub total_duration_ms: u64,
    pub ended_by: StopCause,
    /// Indices whose upload gave up after retries
    pub failed_segments: Vec<usize>,
    /// Set when the last segment, awaited at stop, failed to upload
    #[serde(skip)]
    pub final_segment_error: Option<SessionError>,
    pub segments: Vec<SegmentRecord>,
}

/// Terminal result of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed(SessionCompletion),
    Failed(SessionError),
    Cancelled,
}

impl SessionOutcome {
    pub fn from_result(result: Result<SessionCompletion, SessionError>) -> Self {
        match result {
            Ok(completion) => SessionOutcome::Completed(completion),
            Err(SessionError::Cancelled) => SessionOutcome::Cancelled,
            Err(e) => SessionOutcome::Failed(e),
        }
    }

    pub fn into_result(self) -> Result<SessionCompletion, SessionError> {
        match self {
            SessionOutcome::Completed(completion) => Ok(completion),
            SessionOutcome::Failed(e) => Err(e),
            SessionOutcome::Cancelled => Err(SessionError::Cancelled),
        }
    }
}

pub type CompleteCallback = Box<dyn FnOnce(SessionCompletion) + Send>;
pub type CancelCallback = Box<dyn FnOnce() + Send>;

/// The two caller-facing callbacks
///
/// Both are `FnOnce`; each fires at most once per session and never both.
#[derive(Default)]
pub struct SessionCallbacks {
    on_complete: Option<CompleteCallback>,
    on_cancel: Option<CancelCallback>,
}

impl SessionCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_complete(mut self, f: impl FnOnce(SessionCompletion) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }

    pub fn on_cancel(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_cancel = Some(Box::new(f));
        self
    }

    pub(crate) fn complete(&mut self, completion: SessionCompletion) {
        self.on_cancel = None;
        if let Some(f) = self.on_complete.take() {
            f(completion);
        }
    }

    pub(crate) fn cancel(&mut self) {
        self.on_complete = None;
        if let Some(f) = self.on_cancel.take() {
            f();
        }
    }
}
