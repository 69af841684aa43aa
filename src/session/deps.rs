use anyhow::{bail, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::audio::{CaptureBackend, WavCaptureBackend};
use crate::clock::{Clock, TokioClock};
use crate::config::{Config, StorageBackend};
use crate::upload::{FsObjectStore, FsResourceReader, HttpObjectStore, ObjectStore, ResourceReader};

/// External collaborators a session drives
#[derive(Clone)]
pub struct SessionDeps {
    pub capture: Arc<dyn CaptureBackend>,
    pub reader: Arc<dyn ResourceReader>,
    pub store: Arc<dyn ObjectStore>,
    pub clock: Arc<dyn Clock>,
}

impl SessionDeps {
    pub fn new(
        capture: Arc<dyn CaptureBackend>,
        reader: Arc<dyn ResourceReader>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            capture,
            reader,
            store,
            clock: Arc::new(TokioClock::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Build WAV capture and the configured object store
    pub fn from_config(config: &Config) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());

        let capture = WavCaptureBackend::new(
            PathBuf::from(&config.capture.recordings_path),
            config.capture.audio_source(),
            config.capture.backend_config(),
            Arc::clone(&clock),
        );

        let storage = &config.storage;
        let store: Arc<dyn ObjectStore> = match storage.backend {
            StorageBackend::Filesystem => {
                info!("Uploading segments to directory {}", storage.root);
                Arc::new(FsObjectStore::new(
                    PathBuf::from(&storage.root),
                    storage.public_base_url.clone(),
                ))
            }
            StorageBackend::Http => {
                if storage.public_base_url.is_empty() {
                    bail!("storage.public_base_url is required for the http backend");
                }
                info!(
                    "Uploading segments to {} (bucket {})",
                    storage.public_base_url, storage.bucket
                );
                Arc::new(HttpObjectStore::new(
                    storage.public_base_url.clone(),
                    storage.bucket.clone(),
                    storage.api_key.clone(),
                ))
            }
        };

        Ok(Self {
            capture: Arc::new(capture),
            reader: Arc::new(FsResourceReader),
            store,
            clock,
        })
    }
}
