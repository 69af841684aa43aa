pub mod audio;
pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod session;
pub mod upload;

pub use audio::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFile, AudioFrame, AudioSource,
    CaptureBackend, CaptureHandle, CaptureStatus, ResourceRef, WavCaptureBackend,
};
pub use clock::{Clock, TokioClock};
pub use config::Config;
pub use error::SessionError;
pub use http::{create_router, AppState};
pub use session::{
    AppLifecycle, SessionCallbacks, SessionCompletion, SessionConfig, SessionController,
    SessionDeps, SessionHandle, SessionOutcome, SessionState, SessionStats, StopCause, StopReason,
};
pub use upload::{ObjectStore, ResourceReader, RetryPolicy, UploadPipeline};
