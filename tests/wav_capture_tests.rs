// Integration tests for the WAV capture primitive and filesystem storage
//
// These run on real time against a temporary directory.

use anyhow::Result;
use loqa_narrate::audio::{CaptureOptions, SourceFactory};
use loqa_narrate::upload::{FsObjectStore, FsResourceReader};
use loqa_narrate::{
    AudioBackend, AudioBackendConfig, AudioFile, AudioFrame, AudioSource, CaptureBackend,
    CaptureHandle, ObjectStore, ResourceReader, TokioClock, WavCaptureBackend,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

fn options(index: usize) -> CaptureOptions {
    CaptureOptions {
        session_id: "sess".to_string(),
        segment_index: index,
    }
}

fn silence_backend(dir: &Path) -> WavCaptureBackend {
    WavCaptureBackend::new(
        dir.to_path_buf(),
        AudioSource::Silence,
        AudioBackendConfig {
            target_sample_rate: 8000,
            target_channels: 1,
            buffer_duration_ms: 20,
        },
        Arc::new(TokioClock::new()),
    )
}

/// Write a mono 16kHz tone of `ms` milliseconds
fn write_tone(path: &Path, ms: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for i in 0..(16 * ms) {
        let t = i as f32 / 16000.0;
        let sample = (t * 440.0 * 2.0 * std::f32::consts::PI).sin() * i16::MAX as f32 * 0.5;
        writer.write_sample(sample as i16)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Write a mono 16kHz ramp where each sample holds its index
fn write_ramp(path: &Path, ms: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for i in 0..(16 * ms) {
        writer.write_sample(i as i16)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Source that emits a fixed number of frames and then ends
struct FiniteSource {
    frames: usize,
    running: bool,
}

#[async_trait::async_trait]
impl AudioBackend for FiniteSource {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        let (tx, rx) = mpsc::channel(self.frames.max(1));
        for i in 0..self.frames {
            tx.send(AudioFrame {
                samples: vec![1000; 160],
                sample_rate: 16000,
                channels: 1,
                timestamp_ms: i as u64 * 10,
            })
            .await?;
        }
        self.running = true;
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.running = false;
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.running
    }

    fn name(&self) -> &str {
        "finite"
    }
}

#[tokio::test]
async fn test_request_permission_creates_output_dir() -> Result<()> {
    let dir = TempDir::new()?;
    let output = dir.path().join("nested").join("recordings");
    let backend = silence_backend(&output);

    assert!(backend.request_permission().await?);
    assert!(output.is_dir());

    Ok(())
}

#[tokio::test]
async fn test_capture_writes_readable_wav() -> Result<()> {
    let dir = TempDir::new()?;
    let backend = silence_backend(dir.path());
    backend.request_permission().await?;

    let mut handle = backend.start_capture(options(2)).await?;
    let expected = dir.path().join("sess-segment-002.wav");
    assert_eq!(handle.resource().to_path(), expected);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(handle.status().await?.is_capturing);

    let captured = handle.stop().await?;
    assert!(captured.elapsed_ms >= 150, "elapsed {}", captured.elapsed_ms);
    assert_eq!(captured.resource.to_path(), expected);

    let reader = hound::WavReader::open(&expected)?;
    assert_eq!(reader.spec().sample_rate, 8000);
    assert_eq!(reader.spec().channels, 1);
    assert!(reader.duration() > 0);

    Ok(())
}

#[tokio::test]
async fn test_stopping_twice_fails() -> Result<()> {
    let dir = TempDir::new()?;
    let backend = silence_backend(dir.path());
    backend.request_permission().await?;

    let mut handle = backend.start_capture(options(0)).await?;
    handle.stop().await?;

    assert!(handle.stop().await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_source_ending_reports_not_capturing() -> Result<()> {
    let dir = TempDir::new()?;
    let factory: SourceFactory = Arc::new(|| {
        Ok(Box::new(FiniteSource {
            frames: 5,
            running: false,
        }) as Box<dyn AudioBackend>)
    });
    let backend =
        WavCaptureBackend::with_source_factory(dir.path().to_path_buf(), factory, Arc::new(TokioClock::new()));

    let mut handle = backend.start_capture(options(0)).await?;

    let mut stopped = false;
    for _ in 0..50 {
        if !handle.status().await?.is_capturing {
            stopped = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(stopped, "capture should notice the source ended");

    let status = handle.status().await?;
    let level = status.metering_level.unwrap_or(f32::NEG_INFINITY);
    assert!(level > -60.0 && level < 0.0, "level {}", level);

    handle.stop().await?;
    let written = AudioFile::open(dir.path().join("sess-segment-000.wav"))?;
    assert_eq!(written.samples.len(), 5 * 160);
    assert_eq!(written.sample_rate, 16000);

    Ok(())
}

#[tokio::test]
async fn test_file_source_replays_input() -> Result<()> {
    let dir = TempDir::new()?;
    let input = dir.path().join("narration.wav");
    write_tone(&input, 200)?;

    let output = dir.path().join("out");
    let backend = WavCaptureBackend::new(
        output.clone(),
        AudioSource::File {
            path: input.clone(),
            looped: false,
        },
        AudioBackendConfig::default(),
        Arc::new(TokioClock::new()),
    );
    backend.request_permission().await?;

    let mut handle = backend.start_capture(options(1)).await?;
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(!handle.status().await?.is_capturing);

    handle.stop().await?;
    let source = AudioFile::open(&input)?;
    let written = AudioFile::open(output.join("sess-segment-001.wav"))?;
    assert_eq!(written.samples, source.samples);

    Ok(())
}

#[tokio::test]
async fn test_file_source_continues_across_segments() -> Result<()> {
    let dir = TempDir::new()?;
    let input = dir.path().join("narration.wav");
    write_ramp(&input, 400)?;

    let output = dir.path().join("out");
    let backend = WavCaptureBackend::new(
        output.clone(),
        AudioSource::File {
            path: input.clone(),
            looped: false,
        },
        AudioBackendConfig::default(),
        Arc::new(TokioClock::new()),
    );
    backend.request_permission().await?;

    let mut first = backend.start_capture(options(0)).await?;
    tokio::time::sleep(Duration::from_millis(150)).await;
    first.stop().await?;

    let mut second = backend.start_capture(options(1)).await?;
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert!(!second.status().await?.is_capturing);
    second.stop().await?;

    let source = AudioFile::open(&input)?;
    let head = AudioFile::open(output.join("sess-segment-000.wav"))?;
    let tail = AudioFile::open(output.join("sess-segment-001.wav"))?;

    assert!(!head.samples.is_empty());
    assert!(!tail.samples.is_empty());
    assert_ne!(tail.samples[0], source.samples[0]);
    assert!(source.samples.ends_with(&tail.samples));

    // Input is used up, so a third segment has nothing to capture
    assert!(backend.start_capture(options(2)).await.is_err());

    Ok(())
}

#[tokio::test]
async fn test_missing_input_file_fails_to_start() -> Result<()> {
    let dir = TempDir::new()?;
    let backend = WavCaptureBackend::new(
        dir.path().to_path_buf(),
        AudioSource::File {
            path: dir.path().join("missing.wav"),
            looped: false,
        },
        AudioBackendConfig::default(),
        Arc::new(TokioClock::new()),
    );
    backend.request_permission().await?;

    assert!(backend.start_capture(options(0)).await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_fs_store_round_trip() -> Result<()> {
    let dir = TempDir::new()?;
    let segment = dir.path().join("seg.wav");
    write_tone(&segment, 50)?;

    let bytes = FsResourceReader
        .read_fully(&loqa_narrate::ResourceRef::from_path(&segment))
        .await?;

    let store = FsObjectStore::new(dir.path().join("bucket"), "https://cdn.test/");
    store.put("owner/sess/segment_0.wav", bytes.clone(), "audio/wav").await?;

    let stored = std::fs::read(dir.path().join("bucket/owner/sess/segment_0.wav"))?;
    assert_eq!(stored, bytes);
    assert_eq!(
        store.public_url_for("owner/sess/segment_0.wav"),
        "https://cdn.test/owner/sess/segment_0.wav"
    );

    Ok(())
}

#[tokio::test]
async fn test_fs_reader_missing_file_errors() {
    let result = FsResourceReader
        .read_fully(&loqa_narrate::ResourceRef::new("/nonexistent/segment.wav"))
        .await;
    assert!(result.is_err());
}
