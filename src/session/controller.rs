use chrono::{DateTime, Utc};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep};
use tracing::{debug, error, info, warn};

use super::callbacks::{SessionCallbacks, SessionCompletion, SessionOutcome};
use super::config::SessionConfig;
use super::deps::SessionDeps;
use super::handle::SessionHandle;
use super::lifecycle::{ActiveCapture, AppLifecycle, InterruptionSource, LifecycleMonitor, RecoveryTrigger};
use super::model::{RecordingSession, SegmentRecord, SessionState, StopCause, StopReason, UploadState};
use super::stats::SessionStats;
use crate::audio::level::normalized_level;
use crate::audio::{CaptureBackend, CaptureHandle, CaptureOptions};
use crate::clock::Clock;
use crate::error::SessionError;
use crate::upload::{UploadPipeline, UploadReport};

pub(crate) type StopReply = oneshot::Sender<Result<SessionCompletion, SessionError>>;

/// Messages from handles to the controller task
pub(crate) enum SessionCommand {
    Stop { reason: StopReason, reply: StopReply },
    Cancel { reply: oneshot::Sender<()> },
    Lifecycle(AppLifecycle),
}

/// The capture currently running
struct ActiveSegment {
    index: usize,
    handle: Box<dyn CaptureHandle>,
    started_at_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RotationCause {
    Threshold,
    Interrupted(InterruptionSource),
}

/// Periodic work that only exists while capturing
///
/// Re-created for every segment and dropped on any transition out of
/// `Capturing`, so no timer outlives the state it serves.
struct CaptureTimers {
    deadline: Pin<Box<Sleep>>,
    elapsed: Interval,
    level: Interval,
    health: Interval,
}

impl CaptureTimers {
    fn arm(config: &SessionConfig, until_deadline: Duration) -> Self {
        Self {
            deadline: Box::pin(tokio::time::sleep(until_deadline)),
            elapsed: periodic(config.tick_interval()),
            level: periodic(config.level_sample_interval()),
            health: periodic(config.health_poll_interval()),
        }
    }
}

fn periodic(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Owns one recording session: its data model, the active capture, and the
/// timers, rotation, recovery and termination logic tying them together
///
/// Runs as a single task; handles talk to it over a command channel and read
/// state through `watch` snapshots. A fresh controller is created per session.
pub struct SessionController {
    session: RecordingSession,
    capture: Arc<dyn CaptureBackend>,
    uploader: Arc<UploadPipeline>,
    clock: Arc<dyn Clock>,
    monitor: LifecycleMonitor,
    callbacks: SessionCallbacks,
    started_at: DateTime<Utc>,

    active: Option<ActiveSegment>,
    /// Re-entrancy guard for rotation/recovery
    recovering: bool,
    /// Timers must be re-armed for a new segment
    rearm: bool,
    level: f32,

    in_flight: usize,
    upload_tx: mpsc::UnboundedSender<UploadReport>,
    upload_rx: mpsc::UnboundedReceiver<UploadReport>,

    commands: mpsc::Receiver<SessionCommand>,
    commands_open: bool,
    stop_replies: Vec<StopReply>,
    cancel_replies: Vec<oneshot::Sender<()>>,

    stats_tx: watch::Sender<SessionStats>,
    outcome_tx: watch::Sender<Option<SessionOutcome>>,
}

impl SessionController {
    /// Start a new session and begin capturing its first segment
    pub async fn start(
        config: SessionConfig,
        deps: SessionDeps,
        callbacks: SessionCallbacks,
    ) -> Result<SessionHandle, SessionError> {
        config.validate()?;

        let granted = deps.capture.request_permission().await.map_err(|e| {
            error!("Capture permission check failed: {:#}", e);
            SessionError::CaptureStartFailed(format!("{:#}", e))
        })?;
        if !granted {
            warn!("Capture permission not granted");
            return Err(SessionError::PermissionDenied);
        }

        let session_id = uuid::Uuid::new_v4().to_string();
        info!(
            "Starting recording session {} ({} capture, segments of {}ms, cap {}ms)",
            session_id,
            deps.capture.name(),
            config.segment_threshold_ms,
            config.max_session_duration_ms
        );

        let uploader = Arc::new(UploadPipeline::new(
            deps.reader,
            deps.store,
            config.owner_id.clone(),
            config.retry_policy(),
            Arc::clone(&deps.clock),
        ));

        let (command_tx, commands) = mpsc::channel(32);
        let (upload_tx, upload_rx) = mpsc::unbounded_channel();
        let (stats_tx, stats_rx) =
            watch::channel(SessionStats::initial(session_id.clone(), SessionState::Idle));
        let (outcome_tx, outcome_rx) = watch::channel(None);

        let mut controller = Self {
            session: RecordingSession::new(session_id.clone(), config),
            capture: deps.capture,
            uploader,
            clock: deps.clock,
            monitor: LifecycleMonitor::new(),
            callbacks,
            started_at: Utc::now(),
            active: None,
            recovering: false,
            rearm: false,
            level: 0.0,
            in_flight: 0,
            upload_tx,
            upload_rx,
            commands,
            commands_open: true,
            stop_replies: Vec::new(),
            cancel_replies: Vec::new(),
            stats_tx,
            outcome_tx,
        };

        if let Err(e) = controller.begin_segment().await {
            error!("Failed to start first capture for {}: {:#}", session_id, e);
            return Err(SessionError::CaptureStartFailed(format!("{:#}", e)));
        }
        controller.set_state(SessionState::Capturing);

        tokio::spawn(controller.run());

        Ok(SessionHandle::new(session_id, command_tx, stats_rx, outcome_rx))
    }

    async fn run(mut self) {
        while self.session.state == SessionState::Capturing {
            let mut timers = CaptureTimers::arm(&self.session.config, self.until_deadline());
            self.rearm = false;

            while self.session.state == SessionState::Capturing && !self.rearm {
                tokio::select! {
                    command = self.commands.recv(), if self.commands_open => {
                        self.on_command(command).await;
                    }
                    Some(report) = self.upload_rx.recv() => self.apply_report(report),
                    _ = &mut timers.deadline => {
                        self.rearm = true;
                        self.check_limits().await;
                    }
                    _ = timers.elapsed.tick() => self.check_limits().await,
                    _ = timers.level.tick() => self.on_level_sample().await,
                    _ = timers.health.tick() => self.on_health_poll().await,
                }
            }
        }

        debug!(
            "Session controller {} finished in state {:?}",
            self.session.session_id, self.session.state
        );
    }

    async fn on_command(&mut self, command: Option<SessionCommand>) {
        match command {
            Some(SessionCommand::Stop { reason, reply }) => {
                self.stop_replies.push(reply);
                self.finish(reason.into()).await;
            }
            Some(SessionCommand::Cancel { reply }) => {
                self.cancel_replies.push(reply);
                self.cancel().await;
            }
            Some(SessionCommand::Lifecycle(signal)) => {
                let state = self.session.state;
                let active = self.active.as_ref().map(|a| ActiveCapture {
                    segment_index: a.index,
                    handle: a.handle.as_ref(),
                });
                let trigger = self
                    .monitor
                    .on_foreground_background_change(signal, state, active)
                    .await;
                if let Some(trigger) = trigger {
                    self.recover(trigger).await;
                }
            }
            None => {
                self.commands_open = false;
                warn!(
                    "All handles for session {} dropped while capturing, stopping",
                    self.session.session_id
                );
                self.finish(StopCause::Abandoned).await;
            }
        }
    }

    async fn on_health_poll(&mut self) {
        let state = self.session.state;
        let active = self.active.as_ref().map(|a| ActiveCapture {
            segment_index: a.index,
            handle: a.handle.as_ref(),
        });
        let trigger = self.monitor.on_health_poll_tick(state, active).await;
        if let Some(trigger) = trigger {
            self.recover(trigger).await;
        }
    }

    async fn on_level_sample(&mut self) {
        let Some(active) = &self.active else {
            return;
        };
        match active.handle.status().await {
            Ok(status) => self.level = normalized_level(status.metering_level),
            Err(e) => debug!("Level sample failed: {:#}", e),
        }
        self.publish_stats();
    }

    /// Rotate or stop once the active segment reaches the threshold or the
    /// session reaches its cap
    async fn check_limits(&mut self) {
        if self.active.is_none() {
            return;
        }

        let config = &self.session.config;
        let in_progress = self.in_progress_ms();
        let total = self.session.total_committed_duration_ms + in_progress;

        if total >= config.max_session_duration_ms {
            info!(
                "Session {} reached maximum duration ({}ms)",
                self.session.session_id, config.max_session_duration_ms
            );
            self.finish(StopCause::MaxDuration).await;
        } else if in_progress >= config.segment_threshold_ms {
            self.rotate(RotationCause::Threshold).await;
        } else {
            self.publish_stats();
        }
    }

    /// Recovery entry point for the lifecycle monitor
    async fn recover(&mut self, trigger: RecoveryTrigger) {
        match &self.active {
            Some(active) if active.index == trigger.segment_index => {}
            _ => {
                debug!(
                    "Ignoring stale recovery request for segment {}",
                    trigger.segment_index
                );
                return;
            }
        }

        warn!(
            session_id = %self.session.session_id,
            segment = trigger.segment_index,
            source = ?trigger.source,
            "Recovering interrupted capture"
        );
        self.rotate(RotationCause::Interrupted(trigger.source)).await;
    }

    /// Stop the active segment, hand it to the uploader without waiting, and
    /// immediately start the next one
    async fn rotate(&mut self, cause: RotationCause) {
        if self.recovering {
            debug!("Rotation already in progress, ignoring {:?}", cause);
            return;
        }
        let Some(active) = self.active.take() else {
            return;
        };

        self.recovering = true;
        self.rearm = true;
        self.set_state(match cause {
            RotationCause::Threshold => SessionState::Rotating,
            RotationCause::Interrupted(_) => SessionState::Recovering,
        });

        let index = self.commit_active(active).await;
        self.spawn_upload(index);

        if self.session.total_committed_duration_ms >= self.session.config.max_session_duration_ms {
            self.recovering = false;
            self.finish(StopCause::MaxDuration).await;
            return;
        }

        let restarted = self.begin_segment().await;
        self.recovering = false;

        match restarted {
            Ok(()) => self.set_state(SessionState::Capturing),
            Err(e) => {
                let reason = match cause {
                    RotationCause::Interrupted(_) => {
                        SessionError::CaptureInterrupted(format!("{:#}", e)).to_string()
                    }
                    RotationCause::Threshold => format!("{:#}", e),
                };
                error!(
                    session_id = %self.session.session_id,
                    error = %reason,
                    "Failed to restart capture, finalizing existing segments"
                );
                self.finish(StopCause::CaptureRestartFailed { reason }).await;
            }
        }
    }

    /// Stop capturing, wait for every upload, and deliver the outcome
    async fn finish(&mut self, cause: StopCause) {
        if self.session.state.is_terminal() || self.session.state == SessionState::Stopping {
            return;
        }

        info!(
            reason = ?cause.reason(),
            "Stopping session {} ({:?})",
            self.session.session_id,
            cause
        );
        self.set_state(SessionState::Stopping);

        let mut final_index = None;
        if let Some(active) = self.active.take() {
            let index = self.commit_active(active).await;
            self.spawn_upload(index);
            final_index = Some(index);
        }

        if !self.drain_uploads().await {
            self.cancel().await;
            return;
        }

        let final_segment_error = final_index
            .and_then(|i| self.session.segments.get(i))
            .filter(|s| s.upload_state == UploadState::Failed)
            .map(|s| SessionError::SegmentUploadFailed {
                index: s.index,
                attempts: s.retry_count,
            });

        self.set_state(SessionState::Stopped);

        let segment_locations = self.session.uploaded_locations();
        let outcome = if segment_locations.is_empty() {
            let e = SessionError::NoSegmentsUploaded {
                session_id: self.session.session_id.clone(),
            };
            error!("{}", e);
            SessionOutcome::Failed(e)
        } else {
            let completion = SessionCompletion {
                session_id: self.session.session_id.clone(),
                segment_locations,
                total_duration_ms: self.session.total_committed_duration_ms,
                ended_by: cause,
                failed_segments: self.session.failed_indices(),
                final_segment_error,
                segments: self.session.segments.clone(),
            };
            info!(
                "Session {} complete: {} of {} segments uploaded, {:.1}s",
                completion.session_id,
                completion.segment_locations.len(),
                completion.segments.len(),
                completion.total_duration_ms as f64 / 1000.0
            );
            self.callbacks.complete(completion.clone());
            SessionOutcome::Completed(completion)
        };

        self.conclude(outcome);
    }

    /// Wait for in-flight uploads; returns false if a cancel arrived meanwhile
    async fn drain_uploads(&mut self) -> bool {
        while self.in_flight > 0 {
            tokio::select! {
                report = self.upload_rx.recv() => match report {
                    Some(report) => self.apply_report(report),
                    None => break,
                },
                command = self.commands.recv(), if self.commands_open => match command {
                    Some(SessionCommand::Cancel { reply }) => {
                        self.cancel_replies.push(reply);
                        return false;
                    }
                    Some(SessionCommand::Stop { reply, .. }) => self.stop_replies.push(reply),
                    Some(SessionCommand::Lifecycle(_)) => {}
                    None => self.commands_open = false,
                },
            }
        }
        true
    }

    /// Stop capturing and abandon pending uploads
    async fn cancel(&mut self) {
        if self.session.state.is_terminal() {
            return;
        }

        info!("Cancelling session {}", self.session.session_id);

        if let Some(mut active) = self.active.take() {
            if let Err(e) = active.handle.stop().await {
                warn!("Failed to stop capture on cancel: {:#}", e);
            }
        }

        self.set_state(SessionState::Cancelled);
        // In-flight uploads finish on their own; their reports are dropped
        self.upload_rx.close();
        self.callbacks.cancel();
        self.conclude(SessionOutcome::Cancelled);
    }

    fn conclude(&mut self, outcome: SessionOutcome) {
        for reply in self.stop_replies.drain(..) {
            let _ = reply.send(outcome.clone().into_result());
        }
        for reply in self.cancel_replies.drain(..) {
            let _ = reply.send(());
        }
        self.outcome_tx.send_replace(Some(outcome));
        self.publish_stats();
    }

    async fn begin_segment(&mut self) -> anyhow::Result<()> {
        let index = self.session.next_index();
        let handle = self
            .capture
            .start_capture(CaptureOptions {
                session_id: self.session.session_id.clone(),
                segment_index: index,
            })
            .await?;

        self.session
            .segments
            .push(SegmentRecord::new(index, handle.resource().clone()));
        self.active = Some(ActiveSegment {
            index,
            handle,
            started_at_ms: self.clock.now_ms(),
        });

        debug!("Session {}: segment {} capturing", self.session.session_id, index);
        Ok(())
    }

    /// Stop a capture and commit its duration
    async fn commit_active(&mut self, mut active: ActiveSegment) -> usize {
        let measured_ms = self.clock.now_ms().saturating_sub(active.started_at_ms);
        let duration_ms = match active.handle.stop().await {
            Ok(captured) => captured.elapsed_ms,
            Err(e) => {
                warn!(
                    "Segment {} did not stop cleanly, using measured duration: {:#}",
                    active.index, e
                );
                measured_ms
            }
        };

        if let Some(record) = self.session.segments.get_mut(active.index) {
            record.duration_ms = duration_ms;
            record.capturing = false;
        }
        self.session.total_committed_duration_ms += duration_ms;

        info!(
            "Session {}: segment {} committed ({:.1}s, {:.1}s total)",
            self.session.session_id,
            active.index,
            duration_ms as f64 / 1000.0,
            self.session.total_committed_duration_ms as f64 / 1000.0
        );

        active.index
    }

    fn spawn_upload(&mut self, index: usize) {
        let Some(record) = self.session.segments.get_mut(index) else {
            return;
        };
        let Some(resource) = record.local_handle.clone() else {
            return;
        };

        record.upload_state = UploadState::Uploading;
        let duration_ms = record.duration_ms;
        let uploader = Arc::clone(&self.uploader);
        let session_id = self.session.session_id.clone();
        let reports = self.upload_tx.clone();
        self.in_flight += 1;

        tokio::spawn(async move {
            let report = uploader
                .upload(&resource, duration_ms, &session_id, index)
                .await;
            // Receiver is closed after cancel
            let _ = reports.send(report);
        });

        self.publish_stats();
    }

    fn apply_report(&mut self, report: UploadReport) {
        self.in_flight = self.in_flight.saturating_sub(1);

        if let Some(record) = self.session.segments.get_mut(report.index) {
            record.retry_count = report.attempts;
            match report.location {
                Some(location) => {
                    record.remote_location = Some(location);
                    record.upload_state = UploadState::Uploaded;
                    record.local_handle = None;
                }
                None => {
                    record.upload_state = UploadState::Failed;
                    warn!(
                        "{}; segment dropped from session {}",
                        SessionError::SegmentUploadFailed {
                            index: report.index,
                            attempts: report.attempts,
                        },
                        self.session.session_id
                    );
                }
            }
        }

        self.publish_stats();
    }

    fn in_progress_ms(&self) -> u64 {
        self.active
            .as_ref()
            .map(|a| self.clock.now_ms().saturating_sub(a.started_at_ms))
            .unwrap_or(0)
    }

    /// Time until the active segment hits the threshold or the session hits its cap
    fn until_deadline(&self) -> Duration {
        let config = &self.session.config;
        let in_progress = self.in_progress_ms();
        let to_threshold = config.segment_threshold_ms.saturating_sub(in_progress);
        let to_cap = config
            .max_session_duration_ms
            .saturating_sub(self.session.total_committed_duration_ms + in_progress);
        Duration::from_millis(to_threshold.min(to_cap))
    }

    fn set_state(&mut self, next: SessionState) {
        debug!(
            "Session {}: {:?} -> {:?}",
            self.session.session_id, self.session.state, next
        );
        self.session.state = next;
        self.publish_stats();
    }

    fn publish_stats(&self) {
        let committed = self.session.total_committed_duration_ms;
        self.stats_tx.send_replace(SessionStats {
            session_id: self.session.session_id.clone(),
            state: self.session.state,
            started_at: self.started_at,
            elapsed_ms: committed + self.in_progress_ms(),
            committed_duration_ms: committed,
            segments_count: self.session.segments.len(),
            segments_uploaded: self.session.uploaded_count(),
            uploads_in_flight: self.in_flight,
            level: self.level,
        });
    }
}
