//! One open-to-close lifetime of the input device

use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, info, warn};

use super::lock::DeviceGuard;
use super::{AudioInput, CaptureError, DeviceLock, EncodedAudio, Encoding, InputHandle};

/// How long `stop` waits for the backend to flush and release the device
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// An exclusive recording on the audio input device
///
/// Owned by the identification cycle that opened it. The [`DeviceLock`] is
/// held until the backend has closed its chunk channel, which is how it
/// reports that the device is free again. That holds for
/// [`stop`](Self::stop), [`discard`](Self::discard), [`abort`](Self::abort)
/// and drop alike.
pub struct CaptureSession {
    handle: Option<InputHandle>,
    chunks: Vec<Bytes>,
    encoding: Encoding,
    opened_at: Instant,
    guard: Option<DeviceGuard>,
}

impl CaptureSession {
    /// Acquire the device and start recording
    pub async fn open(input: &dyn AudioInput, lock: &DeviceLock) -> Result<Self, CaptureError> {
        let guard = lock.try_acquire()?;
        let encoding = Encoding::negotiate(|candidate| input.supports(candidate));
        let handle = input.open(encoding).await?;

        info!(%encoding, "capture session opened");

        Ok(Self {
            handle: Some(handle),
            chunks: Vec::new(),
            encoding,
            opened_at: Instant::now(),
            guard: Some(guard),
        })
    }

    #[cfg(test)]
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn is_recording(&self) -> bool {
        self.handle.is_some()
    }

    /// Stop recording and return everything captured
    ///
    /// Calling `stop` on a session that is already stopped returns empty
    /// audio and leaves the device untouched.
    pub async fn stop(&mut self) -> EncodedAudio {
        let Some(mut handle) = self.handle.take() else {
            return EncodedAudio::empty(self.encoding);
        };

        handle.stop();

        let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
            while let Some(chunk) = handle.chunks().recv().await {
                if !chunk.is_empty() {
                    debug!(len = chunk.len(), "capture chunk received");
                    self.chunks.push(chunk);
                }
            }
        })
        .await;

        let guard = self.guard.take();
        if drained.is_err() {
            warn!("audio backend did not close in time, keeping chunks received so far");
            release_when_closed(handle, guard);
        }

        let audio = EncodedAudio::from_chunks(std::mem::take(&mut self.chunks), self.encoding);
        info!(
            bytes = audio.len(),
            duration_ms = self.opened_at.elapsed().as_millis() as u64,
            "capture session stopped"
        );
        audio
    }

    /// Stop recording, wait for the device to be released and throw the
    /// audio away
    pub async fn discard(&mut self) {
        if !self.is_recording() {
            return;
        }
        let audio = self.stop().await;
        info!(bytes = audio.len(), "capture session discarded");
    }

    /// Stop recording without waiting; the lock is released in the
    /// background once the backend closes
    pub fn abort(&mut self) {
        self.chunks.clear();
        let guard = self.guard.take();
        if let Some(handle) = self.handle.take() {
            handle.stop();
            release_when_closed(handle, guard);
            info!("capture session aborted, audio discarded");
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if self.is_recording() {
            debug!("capture session dropped while recording");
            self.abort();
        }
    }
}

/// Keep `guard` until the backend behind `handle` has closed its channel
fn release_when_closed(mut handle: InputHandle, guard: Option<DeviceGuard>) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        // No runtime left to wait on
        return;
    };

    runtime.spawn(async move {
        while handle.chunks().recv().await.is_some() {}
        drop(guard);
        debug!("audio backend closed, device lock released");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::testing::FakeInput;

    #[tokio::test(start_paused = true)]
    async fn test_stop_returns_clip_and_releases_device() {
        let input = FakeInput::with_clip(b"clip-bytes");
        let lock = DeviceLock::new();

        let mut session = CaptureSession::open(&input, &lock).await.unwrap();
        assert!(lock.is_busy());
        assert!(session.is_recording());

        let audio = session.stop().await;
        assert_eq!(audio.bytes().as_ref(), b"clip-bytes");
        assert_eq!(audio.encoding(), Encoding::Wav);
        assert!(!lock.is_busy());
        assert_eq!(input.active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        let input = FakeInput::with_clip(b"abc");
        let lock = DeviceLock::new();

        let mut session = CaptureSession::open(&input, &lock).await.unwrap();
        let first = session.stop().await;
        let second = session.stop().await;

        assert_eq!(first.len(), 3);
        assert!(second.is_empty());
        assert!(!session.is_recording());
        assert!(!lock.is_busy());
        assert_eq!(input.closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_while_busy_fails() {
        let input = FakeInput::with_clip(b"abc");
        let lock = DeviceLock::new();

        let _first = CaptureSession::open(&input, &lock).await.unwrap();
        let second = CaptureSession::open(&input, &lock).await;
        assert!(matches!(second, Err(CaptureError::Busy)));
        assert_eq!(input.opens(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_open_releases_lock() {
        let input = FakeInput::failing(CaptureError::PermissionDenied);
        let lock = DeviceLock::new();

        let result = CaptureSession::open(&input, &lock).await;
        assert!(matches!(result, Err(CaptureError::PermissionDenied)));
        assert!(!lock.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_releases_device_once_backend_closes() {
        let input = FakeInput::with_clip(b"abc");
        let lock = DeviceLock::new();

        let session = CaptureSession::open(&input, &lock).await.unwrap();
        drop(session);
        assert!(lock.is_busy());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!lock.is_busy());
        assert_eq!(input.active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_holds_lock_while_backend_is_closing() {
        let input = FakeInput::with_clip(b"abc").with_close_delay(Duration::from_millis(50));
        let lock = DeviceLock::new();

        let mut session = CaptureSession::open(&input, &lock).await.unwrap();
        session.abort();
        assert!(!session.is_recording());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(input.active(), 1);
        assert!(matches!(
            CaptureSession::open(&input, &lock).await,
            Err(CaptureError::Busy)
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(input.active(), 0);
        assert!(!lock.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_discard_returns_after_device_is_free() {
        let input = FakeInput::with_clip(b"abc").with_close_delay(Duration::from_millis(50));
        let lock = DeviceLock::new();

        let mut session = CaptureSession::open(&input, &lock).await.unwrap();
        session.discard().await;

        assert_eq!(input.active(), 0);
        assert!(!lock.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_timeout_keeps_lock_until_backend_closes() {
        let input = FakeInput::with_clip(b"abc").with_close_delay(Duration::from_secs(3));
        let lock = DeviceLock::new();

        let mut session = CaptureSession::open(&input, &lock).await.unwrap();
        let audio = session.stop().await;

        assert!(audio.is_empty());
        assert!(lock.is_busy());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!lock.is_busy());
        assert_eq!(input.active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_negotiates_against_backend() {
        let input = FakeInput::with_clip(b"abc").supporting(&[Encoding::Ogg, Encoding::Wav]);
        let lock = DeviceLock::new();

        let mut session = CaptureSession::open(&input, &lock).await.unwrap();
        assert_eq!(session.encoding(), Encoding::Ogg);
        assert_eq!(session.stop().await.encoding().mime_type(), "audio/ogg");
    }
}
