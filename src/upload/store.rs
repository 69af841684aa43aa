//! Local resource reading and remote object storage
//!
//! - `FsResourceReader` reads captured files from local disk
//! - `FsObjectStore` mirrors uploads into a directory (local deployments, tests)
//! - `HttpObjectStore` talks to a Supabase-style storage REST API

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use tracing::debug;

use crate::audio::ResourceRef;

/// Reads a captured resource into memory
#[async_trait::async_trait]
pub trait ResourceReader: Send + Sync {
    async fn read_fully(&self, resource: &ResourceRef) -> Result<Vec<u8>>;
}

/// Remote object store
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `bytes` to `path`, replacing any existing object
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;

    /// Public location for an object path
    fn public_url_for(&self, path: &str) -> String;
}

/// Object path for a segment: `{owner_id}/{session_id}/segment_{index}.{ext}`
pub fn segment_object_path(owner_id: &str, session_id: &str, index: usize, extension: &str) -> String {
    format!("{}/{}/segment_{}.{}", owner_id, session_id, index, extension)
}

/// Content type for a resource extension
pub fn content_type_for(extension: &str) -> &'static str {
    match extension {
        "wav" => "audio/wav",
        "m4a" => "audio/m4a",
        "mp3" => "audio/mpeg",
        _ => "application/octet-stream",
    }
}

#[derive(Debug, Clone, Default)]
pub struct FsResourceReader;

#[async_trait::async_trait]
impl ResourceReader for FsResourceReader {
    async fn read_fully(&self, resource: &ResourceRef) -> Result<Vec<u8>> {
        tokio::fs::read(resource.to_path())
            .await
            .with_context(|| format!("Failed to read captured resource: {}", resource))
    }
}

/// Object store backed by a local directory
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
    public_base_url: String,
}

impl FsObjectStore {
    pub fn new(root: PathBuf, public_base_url: impl Into<String>) -> Self {
        Self {
            root,
            public_base_url: public_base_url.into(),
        }
    }
}

#[async_trait::async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let target = self.root.join(path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }

        debug!("Writing {} bytes ({}) to {:?}", bytes.len(), content_type, target);

        tokio::fs::write(&target, bytes)
            .await
            .with_context(|| format!("Failed to write object: {:?}", target))
    }

    fn public_url_for(&self, path: &str) -> String {
        format!("{}/{}", self.public_base_url.trim_end_matches('/'), path)
    }
}

/// Object store speaking the Supabase storage REST API
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    client: reqwest::Client,
    base_url: String,
    bucket: String,
    api_key: Option<String>,
}

impl HttpObjectStore {
    pub fn new(base_url: impl Into<String>, bucket: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bucket: bucket.into(),
            api_key,
        }
    }
}

#[async_trait::async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let url = format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, path);

        let mut request = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .body(bytes);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to send upload request to {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Upload to {} failed with {}: {}", url, status, body);
        }

        Ok(())
    }

    fn public_url_for(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.bucket, path
        )
    }
}
