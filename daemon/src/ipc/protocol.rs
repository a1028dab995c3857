//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::events::DaemonEvent;
use crate::remote::PlaylistSuggestion;
use crate::state::{LoopState, OneShotState};

/// Phase of the most recent one-shot identification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifyPhase {
    #[default]
    Idle,
    Recording,
    Processing,
    Success,
    Failure,
}

/// Requests from UI to daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Ping to check connectivity
    Ping,

    /// Request current daemon status
    GetStatus,

    /// Subscribe to event notifications
    Subscribe,

    /// Start a one-shot identification
    Identify,

    /// End the current recording and identify what was captured
    StopIdentify,

    /// Abandon the current identification
    CancelIdentify,

    /// Turn continuous auto-detection on or off
    SetAutoDetect { enabled: bool },

    /// Generate a playlist name and tagline from a mood prompt
    GeneratePlaylist { prompt: String },

    /// Short remark about a library search
    SearchInsight { query: String },
}

impl Request {
    /// Whether answering needs a round-trip to the remote model
    pub fn waits_on_remote(&self) -> bool {
        matches!(
            self,
            Request::GeneratePlaylist { .. } | Request::SearchInsight { .. }
        )
    }
}

/// Responses from daemon to UI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Pong response to ping
    Pong,

    /// Current daemon status
    Status(DaemonStatus),

    /// Subscription confirmed
    Subscribed,

    /// One-shot identification is recording
    IdentifyStarted,

    /// Request accepted, nothing to report
    Ack,

    /// Generated playlist
    Playlist(PlaylistSuggestion),

    /// Search remark
    Insight { text: String },

    /// Pushed to subscribed clients
    Event { event: DaemonEvent },

    /// Error response
    Error { code: String, message: String },
}

impl Response {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Response::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Full daemon status snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Phase of the latest one-shot identification
    pub identify: IdentifyPhase,

    /// Whether continuous detection is switched on
    pub auto_detect: bool,

    /// Where the continuous detector is in its cycle
    pub detector: LoopState,

    /// Whether a capture currently owns the microphone
    pub device_busy: bool,

    /// Whether an API key is configured
    pub credential_present: bool,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            identify: IdentifyPhase::default(),
            auto_detect: false,
            detector: LoopState::Idle,
            device_busy: false,
            credential_present: false,
            uptime_secs: 0,
        }
    }
}

/// Convert internal one-shot state to IPC phase
impl From<&OneShotState> for IdentifyPhase {
    fn from(state: &OneShotState) -> Self {
        match state {
            OneShotState::Idle => IdentifyPhase::Idle,
            OneShotState::Recording => IdentifyPhase::Recording,
            OneShotState::Processing => IdentifyPhase::Processing,
            OneShotState::Success(_) => IdentifyPhase::Success,
            OneShotState::Failure(_) => IdentifyPhase::Failure,
        }
    }
}
