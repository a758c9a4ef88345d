//! Media capture and upload.
//!
//! # Responsibility
//! - Record voice clips over an exclusively held microphone.
//! - Upload photos and recordings as owner-namespaced assets.

pub mod recorder;
pub mod upload;

pub use recorder::{AudioBlob, AudioRecorder, CaptureStream, Microphone, Recording};
pub use upload::{object_path, sanitize_extension, MediaUploader};
