//! Events module for identification and auto-detection
//!
//! Every state change of the one-shot identifier and the continuous
//! detector is broadcast as a [`DaemonEvent`]. `Identified` and `Detected`
//! are only sent for actionable results.

use serde::{Deserialize, Serialize};

use crate::remote::IdentificationResult;
use crate::state::LoopState;

/// Events broadcast to the IPC server and subscribed clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DaemonEvent {
    /// One-shot identification started recording
    IdentifyRecording {
        /// Length of the clip being recorded
        clip_ms: u64,
    },

    /// One-shot clip submitted to the remote model
    IdentifyProcessing,

    /// One-shot identification found a song
    Identified { result: IdentificationResult },

    /// One-shot identification ended without a song
    IdentifyFailed { code: String, message: String },

    /// Auto-detection switched on or off
    AutoDetectToggled { enabled: bool },

    /// Continuous detector moved between Idle, Listening and AwaitingResult
    DetectorState { state: LoopState },

    /// Continuous detector heard a song above the confidence threshold
    Detected { result: IdentificationResult },
}

impl std::fmt::Display for DaemonEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DaemonEvent::IdentifyRecording { clip_ms } => {
                write!(f, "IDENTIFY_RECORDING ({}ms)", clip_ms)
            }
            DaemonEvent::IdentifyProcessing => write!(f, "IDENTIFY_PROCESSING"),
            DaemonEvent::Identified { result } => {
                write!(f, "IDENTIFIED ({} - {})", result.title, result.artist)
            }
            DaemonEvent::IdentifyFailed { code, .. } => write!(f, "IDENTIFY_FAILED ({})", code),
            DaemonEvent::AutoDetectToggled { enabled } => {
                write!(f, "AUTO_DETECT_{}", if *enabled { "ON" } else { "OFF" })
            }
            DaemonEvent::DetectorState { state } => write!(f, "DETECTOR_{:?}", state),
            DaemonEvent::Detected { result } => {
                write!(f, "DETECTED ({} - {}, {:.2})", result.title, result.artist, result.confidence)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = DaemonEvent::Detected {
            result: IdentificationResult {
                title: "Night Call".to_string(),
                artist: "Kavinsky".to_string(),
                genre: None,
                confidence: 0.75,
            },
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"detected""#));
        assert!(json.contains("Night Call"));
        assert!(!json.contains("genre"));
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"type":"detector_state","state":"awaiting_result"}"#;
        let event: DaemonEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            DaemonEvent::DetectorState {
                state: LoopState::AwaitingResult
            }
        );
    }

    #[test]
    fn test_event_display() {
        let event = DaemonEvent::AutoDetectToggled { enabled: true };
        assert_eq!(event.to_string(), "AUTO_DETECT_ON");
    }
}
