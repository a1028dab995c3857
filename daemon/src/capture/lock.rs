//! Process-wide ownership of the audio input device

use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use super::CaptureError;

/// Guards the microphone so two captures never record at once
///
/// Cloning shares the same lock. Acquisition never waits: a capture that
/// finds the device taken fails with [`CaptureError::Busy`].
#[derive(Debug, Clone, Default)]
pub struct DeviceLock {
    inner: Arc<Mutex<()>>,
}

/// Held by a [`super::CaptureSession`] for as long as it owns the device
pub type DeviceGuard = OwnedMutexGuard<()>;

impl DeviceLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn try_acquire(&self) -> Result<DeviceGuard, CaptureError> {
        Arc::clone(&self.inner)
            .try_lock_owned()
            .map_err(|_| CaptureError::Busy)
    }

    /// Whether a session currently owns the device
    pub fn is_busy(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_busy() {
        let lock = DeviceLock::new();
        let guard = lock.try_acquire().unwrap();
        assert!(lock.is_busy());
        assert_eq!(lock.clone().try_acquire().unwrap_err(), CaptureError::Busy);
        drop(guard);
        assert!(!lock.is_busy());
    }
}
