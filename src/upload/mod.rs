//! Segment upload pipeline
//!
//! Reads a finished segment, writes it to remote storage under
//! `{owner_id}/{session_id}/segment_{index}`, and retries with linear backoff.
//! Never returns an error: callers decide what a missing location means.

mod pipeline;
mod retry;
mod store;

pub use pipeline::{UploadPipeline, UploadReport};
pub use retry::RetryPolicy;
pub use store::{
    content_type_for, segment_object_path, FsObjectStore, FsResourceReader, HttpObjectStore,
    ObjectStore, ResourceReader,
};
