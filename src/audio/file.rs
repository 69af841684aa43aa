use anyhow::{bail, Context, Result};
use hound::WavReader;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::backend::{AudioBackend, AudioFrame};

pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path)
            .context("Failed to open WAV file")?;

        let spec = reader.spec();
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds = samples.len() as f64 /
            (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Split the file into frames of `frame_ms` milliseconds each
    pub fn frames(&self, frame_ms: u64) -> Vec<AudioFrame> {
        let per_frame = (self.sample_rate as u64 * frame_ms / 1000) as usize
            * self.channels.max(1) as usize;
        if per_frame == 0 {
            return Vec::new();
        }

        self.samples
            .chunks(per_frame)
            .enumerate()
            .map(|(i, chunk)| AudioFrame {
                samples: chunk.to_vec(),
                sample_rate: self.sample_rate,
                channels: self.channels,
                timestamp_ms: i as u64 * frame_ms,
            })
            .collect()
    }
}

/// Replay position in a WAV file, shared by every segment fed from it
///
/// Each segment's `FileBackend` picks up at the frame where the previous
/// segment's source stopped.
pub struct FileReplay {
    path: String,
    frames: Vec<AudioFrame>,
    frame_ms: u64,
    position: AtomicUsize,
}

impl FileReplay {
    pub fn open(path: impl AsRef<Path>, frame_ms: u64) -> Result<Self> {
        Ok(Self::from_file(AudioFile::open(path)?, frame_ms))
    }

    pub fn from_file(file: AudioFile, frame_ms: u64) -> Self {
        let frame_ms = frame_ms.max(1);
        Self {
            frames: file.frames(frame_ms),
            path: file.path,
            frame_ms,
            position: AtomicUsize::new(0),
        }
    }

    /// Index of the next frame to deliver
    pub fn position(&self) -> usize {
        self.position.load(Ordering::SeqCst)
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.position() >= self.frames.len()
    }
}

/// Frame source replaying a WAV file at real-time pace
///
/// Without `looped`, the stream ends at EOF, which the capture layer sees
/// as a silent stop.
pub struct FileBackend {
    replay: Arc<FileReplay>,
    looped: bool,
    capturing: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl FileBackend {
    pub fn new(replay: Arc<FileReplay>, looped: bool) -> Self {
        Self {
            replay,
            looped,
            capturing: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for FileBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.capturing.load(Ordering::SeqCst) {
            bail!("Already capturing");
        }
        if self.replay.frames.is_empty() {
            bail!("Audio file {} contains no samples", self.replay.path);
        }
        if self.replay.is_exhausted() && !self.looped {
            bail!("Audio file {} has been fully replayed", self.replay.path);
        }

        let (tx, rx) = mpsc::channel(100);
        let capturing = Arc::clone(&self.capturing);
        let replay = Arc::clone(&self.replay);
        let looped = self.looped;
        capturing.store(true, Ordering::SeqCst);

        debug!(
            "File source resuming {} at frame {}/{}",
            replay.path,
            replay.position(),
            replay.frame_count()
        );

        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(replay.frame_ms));
            let mut timestamp_ms = 0u64;

            loop {
                let position = replay.position();
                let Some(frame) = replay.frames.get(position) else {
                    if looped {
                        replay.position.store(0, Ordering::SeqCst);
                        continue;
                    }
                    debug!("File source reached end of input");
                    break;
                };

                ticker.tick().await;
                if !capturing.load(Ordering::SeqCst) {
                    break;
                }

                let mut frame = frame.clone();
                frame.timestamp_ms = timestamp_ms;
                timestamp_ms += frame.duration_ms();

                if tx.send(frame).await.is_err() {
                    break;
                }
                replay.position.store(position + 1, Ordering::SeqCst);
            }

            capturing.store(false, Ordering::SeqCst);
        }));

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.capturing.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "file"
    }
}
