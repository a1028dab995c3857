//! Why an identification produced no song

use crate::capture::CaptureError;
use crate::remote::RemoteError;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IdentifyFailure {
    /// Microphone missing, denied or owned by another capture
    #[error("audio input unavailable: {0}")]
    DeviceUnavailable(CaptureError),

    /// Cancelled by the user, or nothing was recorded
    #[error("identification cancelled")]
    Cancelled,

    /// The model answered but did not recognize the clip
    #[error("song not recognized")]
    NotRecognized,

    #[error("remote model error: {0}")]
    Remote(RemoteError),
}

impl IdentifyFailure {
    /// Stable code reported to IPC clients
    pub fn code(&self) -> &'static str {
        match self {
            IdentifyFailure::DeviceUnavailable(_) => "device_unavailable",
            IdentifyFailure::Cancelled => "cancelled",
            IdentifyFailure::NotRecognized => "not_recognized",
            IdentifyFailure::Remote(RemoteError::MissingCredential) => "missing_credential",
            IdentifyFailure::Remote(_) => "remote_error",
        }
    }
}
