//! Interruption detection
//!
//! Two observers feed one recovery entry point on the controller:
//! - app foreground/background transitions (checked once on resume)
//! - a periodic health poll while capturing
//!
//! The monitor never touches the capture itself; it only tells the
//! controller which segment it found stopped.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::model::SessionState;
use crate::audio::CaptureHandle;

/// App lifecycle signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppLifecycle {
    Foreground,
    Background,
}

/// Which observer noticed the stoppage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptionSource {
    ForegroundResume,
    HealthPoll,
}

/// Request to recover a silently stopped segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryTrigger {
    pub segment_index: usize,
    pub source: InterruptionSource,
}

/// The capture currently owned by the controller
pub struct ActiveCapture<'a> {
    pub segment_index: usize,
    pub handle: &'a dyn CaptureHandle,
}

#[derive(Debug, Default)]
pub struct LifecycleMonitor {
    was_capturing_before_background: bool,
    /// Segment a recovery was already requested for
    triggered_for: Option<usize>,
}

impl LifecycleMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn was_capturing_before_background(&self) -> bool {
        self.was_capturing_before_background
    }

    pub async fn on_foreground_background_change(
        &mut self,
        signal: AppLifecycle,
        state: SessionState,
        active: Option<ActiveCapture<'_>>,
    ) -> Option<RecoveryTrigger> {
        match signal {
            AppLifecycle::Background => {
                if state == SessionState::Capturing {
                    debug!("App backgrounded while capturing");
                    self.was_capturing_before_background = true;
                }
                None
            }
            AppLifecycle::Foreground => {
                if !std::mem::take(&mut self.was_capturing_before_background) {
                    return None;
                }
                debug!("App foregrounded, checking capture");
                self.check(state, active, InterruptionSource::ForegroundResume)
                    .await
            }
        }
    }

    pub async fn on_health_poll_tick(
        &mut self,
        state: SessionState,
        active: Option<ActiveCapture<'_>>,
    ) -> Option<RecoveryTrigger> {
        self.check(state, active, InterruptionSource::HealthPoll).await
    }

    async fn check(
        &mut self,
        state: SessionState,
        active: Option<ActiveCapture<'_>>,
        source: InterruptionSource,
    ) -> Option<RecoveryTrigger> {
        if state != SessionState::Capturing {
            return None;
        }
        let active = active?;

        if self.triggered_for == Some(active.segment_index) {
            debug!(
                segment = active.segment_index,
                "Recovery already requested for this segment"
            );
            return None;
        }

        let stopped = match active.handle.status().await {
            Ok(status) => !status.is_capturing,
            Err(e) => {
                warn!(segment = active.segment_index, error = %e, "Capture status check failed");
                true
            }
        };
        if !stopped {
            return None;
        }

        warn!(
            segment = active.segment_index,
            ?source,
            "Capture stopped unexpectedly, requesting recovery"
        );
        self.triggered_for = Some(active.segment_index);

        Some(RecoveryTrigger {
            segment_index: active.segment_index,
            source,
        })
    }
}
