use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use super::callbacks::{SessionCompletion, SessionOutcome};
use super::controller::SessionCommand;
use super::lifecycle::AppLifecycle;
use super::model::StopReason;
use super::stats::SessionStats;
use crate::error::SessionError;

/// Caller-side handle to a running session
///
/// Cheap to clone. Dropping every handle while capturing stops the session.
#[derive(Clone)]
pub struct SessionHandle {
    session_id: String,
    commands: mpsc::Sender<SessionCommand>,
    stats: watch::Receiver<SessionStats>,
    outcome: watch::Receiver<Option<SessionOutcome>>,
}

impl SessionHandle {
    pub(crate) fn new(
        session_id: String,
        commands: mpsc::Sender<SessionCommand>,
        stats: watch::Receiver<SessionStats>,
        outcome: watch::Receiver<Option<SessionOutcome>>,
    ) -> Self {
        Self {
            session_id,
            commands,
            stats,
            outcome,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Current snapshot (elapsed time, segments saved, upload activity)
    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }

    /// Terminal outcome, once the session has ended
    pub fn outcome(&self) -> Option<SessionOutcome> {
        self.outcome.borrow().clone()
    }

    /// Stop the session and wait for the final segment's upload
    ///
    /// Fails with `NoSegmentsUploaded` when nothing reached storage.
    pub async fn stop(&self, reason: StopReason) -> Result<SessionCompletion, SessionError> {
        if let Some(outcome) = self.outcome() {
            return outcome.into_result();
        }

        let (reply, rx) = oneshot::channel();
        if self
            .commands
            .send(SessionCommand::Stop { reason, reply })
            .await
            .is_err()
        {
            return self.wait().await.into_result();
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => self.wait().await.into_result(),
        }
    }

    /// Cancel the session; pending uploads are neither awaited nor retried
    pub async fn cancel(&self) {
        if self.outcome().is_some() {
            return;
        }

        let (reply, rx) = oneshot::channel();
        if self
            .commands
            .send(SessionCommand::Cancel { reply })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }

    /// Forward an app foreground/background transition
    pub async fn notify_lifecycle(&self, signal: AppLifecycle) {
        if self
            .commands
            .send(SessionCommand::Lifecycle(signal))
            .await
            .is_err()
        {
            debug!(
                "Session {} already ended, ignoring {:?}",
                self.session_id, signal
            );
        }
    }

    /// Wait for the session to end, however it ends
    pub async fn wait(&self) -> SessionOutcome {
        let mut outcome = self.outcome.clone();
        let finished = outcome
            .wait_for(|o| o.is_some())
            .await
            .ok()
            .and_then(|o| o.clone());

        finished.unwrap_or_else(|| {
            SessionOutcome::Failed(SessionError::SessionClosed(self.session_id.clone()))
        })
    }
}
