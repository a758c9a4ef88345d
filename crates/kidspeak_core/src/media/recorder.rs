//! Two-phase voice recording over an exclusive microphone capability.
//!
//! # Invariants
//! - A `Recording` holds the microphone from `start` until `stop` or drop,
//!   and releases it exactly once on every exit path.
//! - Zero-length chunks are ignored; stopping without data yields an empty
//!   blob, which the submission pipeline rejects.

use crate::error::{CoreError, CoreResult};
use log::{info, warn};

/// Container format produced by the recorder.
pub const AUDIO_MIME_TYPE: &str = "audio/webm";
/// File extension for uploaded recordings.
pub const AUDIO_EXTENSION: &str = "webm";

/// Device able to grant microphone access.
pub trait Microphone {
    /// Acquires the microphone.
    ///
    /// Returns a human-readable reason when the user declines or the device
    /// has no microphone.
    fn acquire(&self) -> Result<Box<dyn CaptureStream>, String>;
}

/// Live, exclusively held stream of encoded audio chunks.
pub trait CaptureStream {
    /// Returns the next available chunk, or `None` when nothing is buffered.
    fn next_chunk(&mut self) -> Option<Vec<u8>>;
    /// Releases the hardware stream.
    fn release(&mut self);
}

/// Finalized encoded recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBlob {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
}

impl AudioBlob {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            mime_type: AUDIO_MIME_TYPE,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Entry point for starting recordings on one microphone.
pub struct AudioRecorder {
    microphone: Box<dyn Microphone>,
}

impl AudioRecorder {
    pub fn new(microphone: Box<dyn Microphone>) -> Self {
        Self { microphone }
    }

    /// Acquires the microphone and begins buffering.
    ///
    /// # Errors
    /// - `CapabilityDenied` when access is refused or unavailable.
    pub fn start(&self) -> CoreResult<Recording> {
        Recording::start(self.microphone.as_ref())
    }
}

/// In-progress recording.
pub struct Recording {
    stream: Option<Box<dyn CaptureStream>>,
    chunks: Vec<Vec<u8>>,
}

impl Recording {
    pub fn start(microphone: &dyn Microphone) -> CoreResult<Self> {
        match microphone.acquire() {
            Ok(stream) => {
                info!("event=recording_start module=media status=ok");
                Ok(Self {
                    stream: Some(stream),
                    chunks: Vec::new(),
                })
            }
            Err(reason) => {
                warn!("event=recording_start module=media status=error error_code=capability_denied");
                Err(CoreError::CapabilityDenied(reason))
            }
        }
    }

    /// Drains every chunk the stream has buffered so far.
    ///
    /// Returns the number of non-empty chunks captured.
    pub fn capture(&mut self) -> usize {
        let Some(stream) = self.stream.as_mut() else {
            return 0;
        };
        let mut captured = 0;
        while let Some(chunk) = stream.next_chunk() {
            if !chunk.is_empty() {
                self.chunks.push(chunk);
                captured += 1;
            }
        }
        captured
    }

    pub fn buffered_bytes(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    pub fn is_active(&self) -> bool {
        self.stream.is_some()
    }

    /// Finalizes buffered chunks into one blob and releases the microphone.
    pub fn stop(mut self) -> AudioBlob {
        self.capture();
        self.release();
        let blob = AudioBlob::new(std::mem::take(&mut self.chunks).concat());
        info!(
            "event=recording_stop module=media status=ok bytes={}",
            blob.len()
        );
        blob
    }

    fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.release();
        }
    }
}

impl Drop for Recording {
    fn drop(&mut self) {
        if self.stream.is_some() {
            warn!("event=recording_abandon module=media status=ok");
            self.release();
        }
    }
}
