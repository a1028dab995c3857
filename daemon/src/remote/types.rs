//! Request and response shapes shared by every model backend

use serde::{Deserialize, Serialize};

use crate::capture::EncodedAudio;

/// Title the model returns when it cannot identify a clip
pub const UNKNOWN_TITLE: &str = "Unknown";

/// A clip ready for submission: base64 payload plus its MIME type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentificationRequest {
    data: String,
    mime_type: &'static str,
}

impl IdentificationRequest {
    pub fn new(audio: &EncodedAudio) -> Self {
        Self {
            data: audio.to_base64(),
            mime_type: audio.encoding().mime_type(),
        }
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn mime_type(&self) -> &'static str {
        self.mime_type
    }
}

/// What the model says is playing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentificationResult {
    pub title: String,
    pub artist: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    pub confidence: f64,
}

impl IdentificationResult {
    /// Title is real, not empty and not the "Unknown" sentinel
    pub fn is_recognized(&self) -> bool {
        let title = self.title.trim();
        !title.is_empty() && !title.eq_ignore_ascii_case(UNKNOWN_TITLE)
    }

    pub fn confidence_in_range(&self) -> bool {
        self.confidence.is_finite() && (0.0..=1.0).contains(&self.confidence)
    }

    /// Worth showing to the user when no confidence gate applies
    pub fn is_actionable(&self) -> bool {
        self.is_recognized() && self.confidence_in_range()
    }

    /// Actionable and strictly above `threshold`
    pub fn passes_threshold(&self, threshold: f64) -> bool {
        self.is_actionable() && self.confidence > threshold
    }
}

/// A generated playlist name and tagline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistSuggestion {
    pub title: String,
    pub description: String,
}
