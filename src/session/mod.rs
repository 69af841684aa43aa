//! Recording session management
//!
//! This module provides the `SessionController` that manages:
//! - Segment capture and rotation at a fixed threshold
//! - Interruption detection (app lifecycle + health polling) and recovery
//! - Fire-and-forget uploads for interior segments, awaited upload at stop
//! - Session statistics and the completion/cancellation callbacks

mod callbacks;
mod config;
mod controller;
mod deps;
mod handle;
mod lifecycle;
mod model;
mod stats;

pub use callbacks::{CancelCallback, CompleteCallback, SessionCallbacks, SessionCompletion, SessionOutcome};
pub use config::SessionConfig;
pub use controller::SessionController;
pub use deps::SessionDeps;
pub use handle::SessionHandle;
pub use lifecycle::{ActiveCapture, AppLifecycle, InterruptionSource, LifecycleMonitor, RecoveryTrigger};
pub use model::{RecordingSession, SegmentRecord, SessionState, StopCause, StopReason, UploadState};
pub use stats::SessionStats;
