use super::state::AppState;
use crate::error::SessionError;
use crate::session::{
    AppLifecycle, SessionCallbacks, SessionCompletion, SessionController, SessionOutcome,
    StopReason,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct StartSessionRequest {
    /// Segment length override in milliseconds
    pub segment_threshold_ms: Option<u64>,

    /// Session cap override in milliseconds
    pub max_session_duration_ms: Option<u64>,

    /// Upload attempts per segment override
    pub max_retries: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub session_id: String,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StopSessionResponse {
    pub session_id: String,
    pub status: String,
    pub completion: SessionCompletion,
}

#[derive(Debug, Serialize)]
pub struct CancelSessionResponse {
    pub session_id: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct LifecycleRequest {
    pub state: AppLifecycle,
}

#[derive(Debug, Serialize)]
pub struct LifecycleResponse {
    pub sessions_notified: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub error: String,
}

fn error_response(status: StatusCode, code: &str, message: String) -> Response {
    (
        status,
        Json(ErrorResponse {
            code: code.to_string(),
            error: message,
        }),
    )
        .into_response()
}

fn session_error_response(e: &SessionError) -> Response {
    let status = match e {
        SessionError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
        SessionError::PermissionDenied => StatusCode::FORBIDDEN,
        SessionError::CaptureStartFailed(_) | SessionError::CaptureInterrupted(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        SessionError::SegmentUploadFailed { .. } | SessionError::NoSegmentsUploaded { .. } => {
            StatusCode::BAD_GATEWAY
        }
        SessionError::Cancelled => StatusCode::CONFLICT,
        SessionError::SessionClosed(_) => StatusCode::GONE,
    };
    error_response(status, e.code(), e.to_string())
}

fn not_found(session_id: &str) -> Response {
    error_response(
        StatusCode::NOT_FOUND,
        "NOT_FOUND",
        format!("Session {} not found", session_id),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /sessions/start
/// Start a new recording session
pub async fn start_session(
    State(state): State<AppState>,
    Json(req): Json<StartSessionRequest>,
) -> impl IntoResponse {
    let mut config = state.defaults.clone();
    if let Some(threshold) = req.segment_threshold_ms {
        config.segment_threshold_ms = threshold;
    }
    if let Some(cap) = req.max_session_duration_ms {
        config.max_session_duration_ms = cap;
    }
    if let Some(retries) = req.max_retries {
        config.max_retries = retries;
    }

    if let Err(e) = config.validate() {
        return session_error_response(&e);
    }

    let handle = match SessionController::start(config, state.deps.clone(), SessionCallbacks::new()).await {
        Ok(handle) => handle,
        Err(e) => {
            error!("Failed to start session: {}", e);
            return session_error_response(&e);
        }
    };

    let session_id = handle.session_id().to_string();

    {
        let mut sessions = state.sessions.write().await;
        sessions.insert(session_id.clone(), handle.clone());
    }

    // Sessions that end on their own (cap, restart failure) leave the map here
    let sessions = Arc::clone(&state.sessions);
    tokio::spawn(async move {
        let outcome = handle.wait().await;
        if sessions.write().await.remove(handle.session_id()).is_some() {
            match outcome {
                SessionOutcome::Completed(completion) => info!(
                    "Session {} ended on its own ({:?}), {} segments uploaded",
                    handle.session_id(),
                    completion.ended_by,
                    completion.segment_locations.len()
                ),
                SessionOutcome::Failed(e) => error!("Session {} failed: {}", handle.session_id(), e),
                SessionOutcome::Cancelled => info!("Session {} cancelled", handle.session_id()),
            }
        }
    });

    info!("Recording started for session: {}", session_id);

    (
        StatusCode::OK,
        Json(StartSessionResponse {
            session_id: session_id.clone(),
            status: "recording".to_string(),
            message: format!("Recording started for session {}", session_id),
        }),
    )
        .into_response()
}

/// POST /sessions/:session_id/stop
/// Stop recording and wait for the final upload
pub async fn stop_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    info!("Stopping recording for session: {}", session_id);

    // Find and remove session
    let handle = {
        let mut sessions = state.sessions.write().await;
        sessions.remove(&session_id)
    };

    let Some(handle) = handle else {
        return not_found(&session_id);
    };

    match handle.stop(StopReason::User).await {
        Ok(completion) => {
            info!(
                "Recording stopped for session {}: {} segments",
                session_id,
                completion.segment_locations.len()
            );
            (
                StatusCode::OK,
                Json(StopSessionResponse {
                    session_id,
                    status: "stopped".to_string(),
                    completion,
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!("Failed to stop session {}: {}", session_id, e);
            session_error_response(&e)
        }
    }
}

/// POST /sessions/:session_id/cancel
/// Cancel a recording without waiting on uploads
pub async fn cancel_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let handle = {
        let mut sessions = state.sessions.write().await;
        sessions.remove(&session_id)
    };

    let Some(handle) = handle else {
        return not_found(&session_id);
    };

    handle.cancel().await;
    info!("Recording cancelled for session: {}", session_id);

    (
        StatusCode::OK,
        Json(CancelSessionResponse {
            session_id,
            status: "cancelled".to_string(),
        }),
    )
        .into_response()
}

/// GET /sessions/:session_id/status
/// Get status of a recording session
pub async fn session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let sessions = state.sessions.read().await;

    match sessions.get(&session_id) {
        Some(handle) => (StatusCode::OK, Json(handle.stats())).into_response(),
        None => not_found(&session_id),
    }
}

/// POST /lifecycle
/// Forward a foreground/background transition to every live session
pub async fn lifecycle_change(
    State(state): State<AppState>,
    Json(req): Json<LifecycleRequest>,
) -> impl IntoResponse {
    let handles: Vec<_> = {
        let sessions = state.sessions.read().await;
        sessions.values().cloned().collect()
    };

    futures::future::join_all(handles.iter().map(|h| h.notify_lifecycle(req.state))).await;

    info!("App lifecycle {:?} forwarded to {} sessions", req.state, handles.len());

    (
        StatusCode::OK,
        Json(LifecycleResponse {
            sessions_notified: handles.len(),
        }),
    )
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
