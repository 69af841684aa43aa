use anyhow::{anyhow, Result};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use super::file::{FileBackend, FileReplay};
use super::synthetic::SilenceBackend;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since the source started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Duration covered by this frame in milliseconds
    pub fn duration_ms(&self) -> u64 {
        let per_channel = self.samples.len() as u64 / self.channels.max(1) as u64;
        per_channel * 1000 / self.sample_rate.max(1) as u64
    }
}

/// Configuration for audio backend
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Sample rate for generated audio
    pub target_sample_rate: u32,
    /// Channel count (1 = mono, 2 = stereo)
    pub target_channels: u16,
    /// Buffer size in milliseconds (affects latency)
    pub buffer_duration_ms: u64,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 16000, // 16kHz speech
            target_channels: 1,        // Mono
            buffer_duration_ms: 100,   // 100ms buffers
        }
    }
}

/// Frame source feeding a capture
///
/// Implementations:
/// - File: replay a WAV file in real time (testing/batch narration)
/// - Silence: paced zero samples (service smoke runs)
///
/// A source that closes its channel before `stop` is called has stopped
/// silently; the capture layer reports that as "not capturing".
#[async_trait::async_trait]
pub trait AudioBackend: Send + Sync {
    /// Start producing audio
    ///
    /// Returns a channel receiver that will receive audio frames
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Stop producing audio
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently producing frames
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Builds a fresh frame source for each segment
pub type SourceFactory = Arc<dyn Fn() -> Result<Box<dyn AudioBackend>> + Send + Sync>;

/// Audio backend factory
pub struct AudioBackendFactory;

impl AudioBackendFactory {
    /// Source factory for the configured input
    ///
    /// File input is opened on first use; later segments continue from where
    /// the previous segment's source stopped.
    pub fn per_segment(source: AudioSource, config: AudioBackendConfig) -> SourceFactory {
        match source {
            AudioSource::Silence => Arc::new(move || {
                Ok(Box::new(SilenceBackend::new(config.clone())) as Box<dyn AudioBackend>)
            }),
            AudioSource::File { path, looped } => {
                let replay: Mutex<Option<Arc<FileReplay>>> = Mutex::new(None);
                Arc::new(move || {
                    let mut slot = replay
                        .lock()
                        .map_err(|_| anyhow!("File replay state poisoned"))?;
                    let shared = match slot.as_ref() {
                        Some(shared) => Arc::clone(shared),
                        None => {
                            let opened = Arc::new(FileReplay::open(&path, config.buffer_duration_ms)?);
                            *slot = Some(Arc::clone(&opened));
                            opened
                        }
                    };
                    Ok(Box::new(FileBackend::new(shared, looped)) as Box<dyn AudioBackend>)
                })
            }
        }
    }
}

/// Audio source type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Generated silence
    Silence,
    /// File input, optionally restarted at EOF
    File { path: PathBuf, looped: bool },
}
