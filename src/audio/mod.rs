pub mod backend;
pub mod capture;
pub mod file;
pub mod level;
pub mod synthetic;
pub mod wav;

pub use backend::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioSource, SourceFactory,
};
pub use capture::{CaptureBackend, CaptureHandle, CaptureOptions, CaptureStatus, CapturedSegment, ResourceRef};
pub use file::{AudioFile, FileBackend, FileReplay};
pub use synthetic::SilenceBackend;
pub use wav::{SegmentFile, WavCaptureBackend, WavCaptureHandle};
