use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::retry::RetryPolicy;
use super::store::{content_type_for, segment_object_path, ObjectStore, ResourceReader};
use crate::audio::ResourceRef;
use crate::clock::Clock;

/// Outcome of uploading one segment, after retries
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReport {
    pub index: usize,
    /// Public location, `None` once retries are exhausted
    pub location: Option<String>,
    /// Attempts made, including the successful one
    pub attempts: u32,
}

/// Persists finished segments to remote storage
///
/// Holds no session state; safe to share across concurrently running uploads.
pub struct UploadPipeline {
    reader: Arc<dyn ResourceReader>,
    store: Arc<dyn ObjectStore>,
    owner_id: String,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl UploadPipeline {
    pub fn new(
        reader: Arc<dyn ResourceReader>,
        store: Arc<dyn ObjectStore>,
        owner_id: impl Into<String>,
        retry: RetryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            reader,
            store,
            owner_id: owner_id.into(),
            retry,
            clock,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Upload a segment, returning its location or `None` after exhausting retries
    pub async fn upload_segment(
        &self,
        resource: &ResourceRef,
        duration_ms: u64,
        session_id: &str,
        index: usize,
    ) -> Option<String> {
        self.upload(resource, duration_ms, session_id, index)
            .await
            .location
    }

    /// Upload a segment and report how many attempts it took
    pub async fn upload(
        &self,
        resource: &ResourceRef,
        duration_ms: u64,
        session_id: &str,
        index: usize,
    ) -> UploadReport {
        let extension = resource.extension().unwrap_or_else(|| "wav".to_string());
        let path = segment_object_path(&self.owner_id, session_id, index, &extension);
        let content_type = content_type_for(&extension);

        let mut attempt = 0u32;

        loop {
            attempt += 1;

            match self.try_upload(resource, &path, content_type).await {
                Ok(location) => {
                    info!(
                        session_id,
                        index,
                        attempt,
                        duration_ms,
                        "Segment uploaded to {}",
                        location
                    );
                    return UploadReport {
                        index,
                        location: Some(location),
                        attempts: attempt,
                    };
                }
                Err(e) => {
                    if self.retry.should_retry(attempt) {
                        let delay = self.retry.delay_for_attempt(attempt);
                        warn!(
                            session_id,
                            index,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Segment upload failed, retrying"
                        );
                        self.clock.sleep(delay).await;
                        continue;
                    }

                    error!(
                        session_id,
                        index,
                        attempt,
                        error = %e,
                        "Segment upload failed, giving up"
                    );
                    return UploadReport {
                        index,
                        location: None,
                        attempts: attempt,
                    };
                }
            }
        }
    }

    async fn try_upload(&self, resource: &ResourceRef, path: &str, content_type: &str) -> Result<String> {
        let bytes = self.reader.read_fully(resource).await?;
        self.store.put(path, bytes, content_type).await?;
        Ok(self.store.public_url_for(path))
    }
}
