use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Opaque reference to a captured resource (a local file for WAV captures)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceRef(String);

impl ResourceRef {
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    pub fn from_path(path: impl AsRef<Path>) -> Self {
        Self(path.as_ref().display().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_path(&self) -> PathBuf {
        PathBuf::from(&self.0)
    }

    /// Lower-cased file extension, if the reference has one
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.0)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parameters for a single segment capture
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub session_id: String,
    pub segment_index: usize,
}

/// Point-in-time status of a running capture
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureStatus {
    pub is_capturing: bool,
    /// Latest metering reading in dBFS, if the primitive reports one
    pub metering_level: Option<f32>,
}

/// Result of stopping a capture
#[derive(Debug, Clone)]
pub struct CapturedSegment {
    pub resource: ResourceRef,
    pub elapsed_ms: u64,
}

/// Device capture primitive
///
/// Only the session controller starts and stops captures.
#[async_trait::async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Ask for (or confirm) capture permission
    async fn request_permission(&self) -> Result<bool>;

    /// Begin capturing one segment
    async fn start_capture(&self, options: CaptureOptions) -> Result<Box<dyn CaptureHandle>>;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// A single running capture
#[async_trait::async_trait]
pub trait CaptureHandle: Send + Sync {
    /// Resource the capture writes to; known from the moment capture starts
    fn resource(&self) -> &ResourceRef;

    /// Query whether the capture is still running
    async fn status(&self) -> Result<CaptureStatus>;

    /// Stop capturing and finalize the resource
    async fn stop(&mut self) -> Result<CapturedSegment>;
}
