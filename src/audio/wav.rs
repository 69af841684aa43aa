use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::backend::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioSource, SourceFactory,
};
use super::capture::{CaptureBackend, CaptureHandle, CaptureOptions, CaptureStatus, CapturedSegment, ResourceRef};
use super::level::{rms_dbfs, SILENCE_DBFS};
use crate::clock::Clock;

/// Metadata for a finalized segment file
#[derive(Debug, Clone)]
pub struct SegmentFile {
    /// Segment number (0-indexed)
    pub segment_index: usize,
    /// File path to the segment
    pub file_path: PathBuf,
    /// Sample rate
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Number of samples in this segment
    pub sample_count: usize,
}

impl SegmentFile {
    /// Audio length derived from the sample count
    pub fn audio_ms(&self) -> u64 {
        let frames = self.sample_count as u64 / self.channels.max(1) as u64;
        frames * 1000 / self.sample_rate.max(1) as u64
    }
}

/// Capture primitive writing one WAV file per segment
///
/// Files land at `{output_dir}/{session_id}-segment-{index:03}.wav`.
pub struct WavCaptureBackend {
    output_dir: PathBuf,
    sources: SourceFactory,
    fallback: AudioBackendConfig,
    clock: Arc<dyn Clock>,
}

impl WavCaptureBackend {
    pub fn new(
        output_dir: PathBuf,
        source: AudioSource,
        config: AudioBackendConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let fallback = config.clone();
        let sources = AudioBackendFactory::per_segment(source, config);

        Self {
            output_dir,
            sources,
            fallback,
            clock,
        }
    }

    pub fn with_source_factory(
        output_dir: PathBuf,
        sources: SourceFactory,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            output_dir,
            sources,
            fallback: AudioBackendConfig::default(),
            clock,
        }
    }

    fn segment_path(&self, options: &CaptureOptions) -> PathBuf {
        self.output_dir.join(format!(
            "{}-segment-{:03}.wav",
            options.session_id, options.segment_index
        ))
    }
}

#[async_trait::async_trait]
impl CaptureBackend for WavCaptureBackend {
    async fn request_permission(&self) -> Result<bool> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .with_context(|| format!("Failed to create output directory: {:?}", self.output_dir))?;
        Ok(true)
    }

    async fn start_capture(&self, options: CaptureOptions) -> Result<Box<dyn CaptureHandle>> {
        let path = self.segment_path(&options);

        let mut source = (self.sources)().context("Failed to create audio source")?;
        let frames = source
            .start()
            .await
            .with_context(|| format!("Failed to start {} source", source.name()))?;

        info!(
            "Capture started: segment {} from {} source -> {:?}",
            options.segment_index,
            source.name(),
            path
        );

        let shared = Arc::new(CaptureShared::new());
        let (stop_tx, stop_rx) = oneshot::channel();
        let started_at_ms = self.clock.now_ms();

        let task = tokio::spawn(record_segment(
            SegmentJob {
                path: path.clone(),
                segment_index: options.segment_index,
                fallback: self.fallback.clone(),
            },
            source,
            frames,
            stop_rx,
            Arc::clone(&shared),
            Arc::clone(&self.clock),
        ));

        Ok(Box::new(WavCaptureHandle {
            resource: ResourceRef::from_path(&path),
            started_at_ms,
            shared,
            stop_tx: Some(stop_tx),
            task: Some(task),
        }))
    }

    fn name(&self) -> &str {
        "wav"
    }
}

/// State shared between a capture handle and its writer task
struct CaptureShared {
    alive: AtomicBool,
    level_bits: AtomicU32,
    ended_at_ms: AtomicU64,
}

impl CaptureShared {
    fn new() -> Self {
        Self {
            alive: AtomicBool::new(true),
            level_bits: AtomicU32::new(SILENCE_DBFS.to_bits()),
            ended_at_ms: AtomicU64::new(0),
        }
    }

    fn mark_ended(&self, at_ms: u64) {
        if self.alive.swap(false, Ordering::SeqCst) {
            self.ended_at_ms.store(at_ms, Ordering::SeqCst);
        }
    }
}

struct SegmentJob {
    path: PathBuf,
    segment_index: usize,
    fallback: AudioBackendConfig,
}

async fn record_segment(
    job: SegmentJob,
    mut source: Box<dyn AudioBackend>,
    mut frames: mpsc::Receiver<AudioFrame>,
    mut stop_rx: oneshot::Receiver<()>,
    shared: Arc<CaptureShared>,
    clock: Arc<dyn Clock>,
) -> Result<SegmentFile> {
    let mut writer: Option<SegmentWriter> = None;

    let written = async {
        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                frame = frames.recv() => match frame {
                    Some(frame) => {
                        if writer.is_none() {
                            writer = Some(SegmentWriter::new(
                                job.path.clone(),
                                job.segment_index,
                                frame.sample_rate,
                                frame.channels,
                            )?);
                        }
                        shared
                            .level_bits
                            .store(rms_dbfs(&frame.samples).to_bits(), Ordering::Relaxed);
                        if let Some(w) = writer.as_mut() {
                            w.write_frame(&frame)?;
                        }
                    }
                    None => {
                        warn!("Segment {}: audio source stopped delivering frames", job.segment_index);
                        break;
                    }
                }
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    shared.mark_ended(clock.now_ms());

    if source.is_capturing() {
        if let Err(e) = source.stop().await {
            warn!("Failed to stop {} source: {}", source.name(), e);
        }
    }
    written?;

    let writer = match writer {
        Some(writer) => writer,
        None => {
            debug!("Segment {} received no frames, writing empty file", job.segment_index);
            SegmentWriter::new(
                job.path,
                job.segment_index,
                job.fallback.target_sample_rate,
                job.fallback.target_channels,
            )?
        }
    };

    let segment = writer.finish()?;
    info!(
        "Segment {} written: {:.1}s ({} samples)",
        segment.segment_index,
        segment.audio_ms() as f64 / 1000.0,
        segment.sample_count
    );

    Ok(segment)
}

/// Handle to a running WAV capture
pub struct WavCaptureHandle {
    resource: ResourceRef,
    started_at_ms: u64,
    shared: Arc<CaptureShared>,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Result<SegmentFile>>>,
}

#[async_trait::async_trait]
impl CaptureHandle for WavCaptureHandle {
    fn resource(&self) -> &ResourceRef {
        &self.resource
    }

    async fn status(&self) -> Result<CaptureStatus> {
        Ok(CaptureStatus {
            is_capturing: self.shared.alive.load(Ordering::SeqCst),
            metering_level: Some(f32::from_bits(self.shared.level_bits.load(Ordering::Relaxed))),
        })
    }

    async fn stop(&mut self) -> Result<CapturedSegment> {
        if let Some(stop_tx) = self.stop_tx.take() {
            // Writer may already have exited on a silent stop
            let _ = stop_tx.send(());
        }

        let Some(task) = self.task.take() else {
            bail!("Capture already stopped: {}", self.resource);
        };
        task.await.context("Capture task panicked")??;

        let ended_at_ms = self.shared.ended_at_ms.load(Ordering::SeqCst);

        Ok(CapturedSegment {
            resource: self.resource.clone(),
            elapsed_ms: ended_at_ms.saturating_sub(self.started_at_ms),
        })
    }
}

impl Drop for WavCaptureHandle {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
    }
}

/// Writes a single segment to disk as WAV file
struct SegmentWriter {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    metadata: SegmentFile,
}

impl SegmentWriter {
    fn new(
        file_path: PathBuf,
        segment_index: usize,
        sample_rate: u32,
        channels: u16,
    ) -> Result<Self> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = hound::WavWriter::create(&file_path, spec)
            .with_context(|| format!("Failed to create WAV file: {:?}", file_path))?;

        Ok(Self {
            writer: Some(writer),
            metadata: SegmentFile {
                segment_index,
                file_path,
                sample_rate,
                channels,
                sample_count: 0,
            },
        })
    }

    fn write_frame(&mut self, frame: &AudioFrame) -> Result<()> {
        if let Some(writer) = &mut self.writer {
            for &sample in &frame.samples {
                writer.write_sample(sample)
                    .context("Failed to write sample to WAV")?;
            }

            self.metadata.sample_count += frame.samples.len();
        }

        Ok(())
    }

    fn finish(mut self) -> Result<SegmentFile> {
        if let Some(writer) = self.writer.take() {
            writer.finalize()
                .context("Failed to finalize WAV file")?;
        }

        Ok(self.metadata.clone())
    }
}

impl Drop for SegmentWriter {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("Failed to finalize WAV writer on drop: {}", e);
            }
        }
    }
}
