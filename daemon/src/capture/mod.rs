//! Microphone capture
//!
//! A [`CaptureSession`] is one open-to-close lifetime of the audio input
//! device producing a single encoded clip. Backends implement
//! [`AudioInput`]; the process-wide [`DeviceLock`] keeps at most one session
//! recording at a time.

mod device;
mod encoding;
mod lock;
mod session;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use device::CpalInput;
pub use encoding::{EncodedAudio, Encoding};
pub use lock::DeviceLock;
pub use session::CaptureSession;

/// Errors raised while acquiring or running the input device
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("audio input is busy with another capture")]
    Busy,

    #[error("no audio input device available")]
    NoDevice,

    #[error("microphone access denied")]
    PermissionDenied,

    #[error("backend cannot record {0}")]
    UnsupportedEncoding(&'static str),

    #[error("failed to open input stream: {0}")]
    Stream(String),
}

/// A source of encoded audio, usually the default microphone
#[async_trait]
pub trait AudioInput: Send + Sync {
    /// Whether this backend can produce the given encoding
    fn supports(&self, encoding: Encoding) -> bool;

    /// Open the device and start recording in `encoding`
    async fn open(&self, encoding: Encoding) -> Result<InputHandle, CaptureError>;
}

/// A live recording handed out by an [`AudioInput`]
///
/// Chunks arrive on `chunks` in recording order. The backend closes the
/// channel once it has released the device after [`InputHandle::stop`].
pub struct InputHandle {
    chunks: mpsc::UnboundedReceiver<Bytes>,
    stop: CancellationToken,
}

impl InputHandle {
    pub fn new(chunks: mpsc::UnboundedReceiver<Bytes>, stop: CancellationToken) -> Self {
        Self { chunks, stop }
    }

    /// Ask the backend to stop recording and release the device
    pub fn stop(&self) {
        self.stop.cancel();
    }

    pub(crate) fn chunks(&mut self) -> &mut mpsc::UnboundedReceiver<Bytes> {
        &mut self.chunks
    }
}

impl Drop for InputHandle {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}
