// Shared test doubles for session, upload and HTTP tests
//
// Everything here is in-memory and driven by tokio time, so tests can run
// with a paused clock.

#![allow(dead_code)]

use anyhow::{anyhow, bail, Result};
use loqa_narrate::audio::{CaptureOptions, CapturedSegment};
use loqa_narrate::{
    CaptureBackend, CaptureHandle, CaptureStatus, Clock, ObjectStore, ResourceReader, ResourceRef,
    SessionCallbacks, SessionCompletion, SessionConfig, SessionDeps,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

// ============================================================================
// Capture
// ============================================================================

struct CaptureState {
    started: Instant,
    alive: AtomicBool,
    /// Set when the capture dies on its own
    stopped_at: Mutex<Option<Instant>>,
}

/// Capture backend whose segments can be killed from the test
pub struct FakeCapture {
    permission: bool,
    fail_from: Mutex<Option<usize>>,
    starts: AtomicUsize,
    stops: Arc<AtomicUsize>,
    current: Mutex<Option<Arc<CaptureState>>>,
}

impl FakeCapture {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::with_permission(true))
    }

    pub fn denied() -> Arc<Self> {
        Arc::new(Self::with_permission(false))
    }

    fn with_permission(permission: bool) -> Self {
        Self {
            permission,
            fail_from: Mutex::new(None),
            starts: AtomicUsize::new(0),
            stops: Arc::new(AtomicUsize::new(0)),
            current: Mutex::new(None),
        }
    }

    /// Refuse every capture whose segment index is `index` or later
    pub fn fail_starts_from(&self, index: usize) {
        *self.fail_from.lock().unwrap() = Some(index);
    }

    /// Successful `start_capture` calls so far
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// `stop` calls so far, across all handles
    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Whether the most recent capture is still running
    pub fn current_alive(&self) -> bool {
        self.current
            .lock()
            .unwrap()
            .as_ref()
            .map(|s| s.alive.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Silently kill the running capture, as an OS interruption would
    pub fn interrupt_current(&self) {
        if let Some(state) = self.current.lock().unwrap().as_ref() {
            state.alive.store(false, Ordering::SeqCst);
            *state.stopped_at.lock().unwrap() = Some(Instant::now());
        }
    }
}

#[async_trait::async_trait]
impl CaptureBackend for FakeCapture {
    async fn request_permission(&self) -> Result<bool> {
        Ok(self.permission)
    }

    async fn start_capture(&self, options: CaptureOptions) -> Result<Box<dyn CaptureHandle>> {
        if let Some(from) = *self.fail_from.lock().unwrap() {
            if options.segment_index >= from {
                bail!("microphone unavailable");
            }
        }

        let state = Arc::new(CaptureState {
            started: Instant::now(),
            alive: AtomicBool::new(true),
            stopped_at: Mutex::new(None),
        });
        *self.current.lock().unwrap() = Some(Arc::clone(&state));
        self.starts.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(FakeHandle {
            resource: ResourceRef::new(format!(
                "mem://{}/{}.wav",
                options.session_id, options.segment_index
            )),
            state,
            stops: Arc::clone(&self.stops),
        }))
    }

    fn name(&self) -> &str {
        "fake"
    }
}

struct FakeHandle {
    resource: ResourceRef,
    state: Arc<CaptureState>,
    stops: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl CaptureHandle for FakeHandle {
    fn resource(&self) -> &ResourceRef {
        &self.resource
    }

    async fn status(&self) -> Result<CaptureStatus> {
        Ok(CaptureStatus {
            is_capturing: self.state.alive.load(Ordering::SeqCst),
            metering_level: Some(-30.0),
        })
    }

    async fn stop(&mut self) -> Result<CapturedSegment> {
        let stopped_at = *self.state.stopped_at.lock().unwrap();
        let ended = stopped_at.unwrap_or_else(Instant::now);
        self.state.alive.store(false, Ordering::SeqCst);
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(CapturedSegment {
            resource: self.resource.clone(),
            elapsed_ms: ended.duration_since(self.state.started).as_millis() as u64,
        })
    }
}

// ============================================================================
// Upload
// ============================================================================

/// Reader that returns the resource URI as bytes
#[derive(Default)]
pub struct MemoryReader {
    unreadable: Mutex<Vec<String>>,
}

impl MemoryReader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn make_unreadable(&self, resource: &str) {
        self.unreadable.lock().unwrap().push(resource.to_string());
    }
}

#[async_trait::async_trait]
impl ResourceReader for MemoryReader {
    async fn read_fully(&self, resource: &ResourceRef) -> Result<Vec<u8>> {
        if self.unreadable.lock().unwrap().iter().any(|r| r == resource.as_str()) {
            bail!("resource vanished: {}", resource);
        }
        Ok(resource.as_str().as_bytes().to_vec())
    }
}

/// Object store with scripted failures, keyed by segment index
#[derive(Default)]
pub struct ScriptedStore {
    /// Remaining failures per segment index
    failures: Mutex<HashMap<usize, u32>>,
    always_fail: AtomicBool,
    attempts: Mutex<HashMap<String, u32>>,
    objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
}

impl ScriptedStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let store = Self::default();
        store.always_fail.store(true, Ordering::SeqCst);
        Arc::new(store)
    }

    /// Fail the next `times` puts for segment `index`
    pub fn fail_segment(&self, index: usize, times: u32) {
        self.failures.lock().unwrap().insert(index, times);
    }

    pub fn attempts_for(&self, path: &str) -> u32 {
        self.attempts.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    pub fn total_attempts(&self) -> u32 {
        self.attempts.lock().unwrap().values().sum()
    }

    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<_> = self.objects.lock().unwrap().keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn content_type_of(&self, path: &str) -> Option<String> {
        self.objects.lock().unwrap().get(path).map(|(_, ct)| ct.clone())
    }
}

fn segment_index_of(path: &str) -> Option<usize> {
    let name = path.rsplit('/').next()?;
    let stem = name.strip_prefix("segment_")?;
    stem.split('.').next()?.parse().ok()
}

#[async_trait::async_trait]
impl ObjectStore for ScriptedStore {
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        *self.attempts.lock().unwrap().entry(path.to_string()).or_insert(0) += 1;

        if self.always_fail.load(Ordering::SeqCst) {
            return Err(anyhow!("storage offline"));
        }

        if let Some(index) = segment_index_of(path) {
            let mut failures = self.failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(&index) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(anyhow!("503 Service Unavailable"));
                }
            }
        }

        self.objects
            .lock()
            .unwrap()
            .insert(path.to_string(), (bytes, content_type.to_string()));
        Ok(())
    }

    fn public_url_for(&self, path: &str) -> String {
        format!("https://store.test/{}", path)
    }
}

// ============================================================================
// Clock
// ============================================================================

/// Clock on tokio time whose sleeps are recorded and skipped
pub struct RecordingClock {
    origin: Instant,
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            origin: Instant::now(),
            sleeps: Mutex::new(Vec::new()),
        })
    }

    pub fn sleeps_ms(&self) -> Vec<u64> {
        self.sleeps
            .lock()
            .unwrap()
            .iter()
            .map(|d| d.as_millis() as u64)
            .collect()
    }
}

#[async_trait::async_trait]
impl Clock for RecordingClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        tokio::task::yield_now().await;
    }
}

// ============================================================================
// Session wiring
// ============================================================================

pub struct Harness {
    pub capture: Arc<FakeCapture>,
    pub reader: Arc<MemoryReader>,
    pub store: Arc<ScriptedStore>,
    pub clock: Arc<RecordingClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(ScriptedStore::new())
    }

    pub fn with_store(store: Arc<ScriptedStore>) -> Self {
        Self {
            capture: FakeCapture::new(),
            reader: MemoryReader::new(),
            store,
            clock: RecordingClock::new(),
        }
    }

    pub fn deps(&self) -> SessionDeps {
        SessionDeps::new(
            self.capture.clone(),
            self.reader.clone(),
            self.store.clone(),
        )
        .with_clock(self.clock.clone())
    }
}

pub fn session_config(segment_threshold_ms: u64, max_session_duration_ms: u64) -> SessionConfig {
    SessionConfig {
        segment_threshold_ms,
        max_session_duration_ms,
        owner_id: "user-1".to_string(),
        ..SessionConfig::default()
    }
}

/// Records what the session callbacks delivered
#[derive(Clone, Default)]
pub struct CallbackSpy {
    completions: Arc<Mutex<Vec<SessionCompletion>>>,
    cancels: Arc<AtomicUsize>,
}

impl CallbackSpy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn callbacks(&self) -> SessionCallbacks {
        let completions = Arc::clone(&self.completions);
        let cancels = Arc::clone(&self.cancels);
        SessionCallbacks::new()
            .on_complete(move |completion| completions.lock().unwrap().push(completion))
            .on_cancel(move || {
                cancels.fetch_add(1, Ordering::SeqCst);
            })
    }

    pub fn completions(&self) -> Vec<SessionCompletion> {
        self.completions.lock().unwrap().clone()
    }

    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }
}
