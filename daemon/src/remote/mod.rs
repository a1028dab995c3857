//! Remote generative model
//!
//! The model is an opaque collaborator: one request per call, no retries.
//! Every operation fails with [`RemoteError::MissingCredential`] before
//! touching the network when no API key is configured.

mod gemini;
mod types;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;

pub use gemini::GeminiClient;
pub use types::{IdentificationRequest, IdentificationResult, PlaylistSuggestion};

/// Failures of a remote call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("API key not found")]
    MissingCredential,

    #[error("network request failed: {0}")]
    Network(String),

    #[error("rate limited by the remote model")]
    RateLimited,

    #[error("remote model returned HTTP {code}")]
    Status { code: u16 },

    #[error("malformed response from the remote model: {0}")]
    Schema(String),
}

impl RemoteError {
    /// Stable code reported to IPC clients
    pub fn code(&self) -> &'static str {
        match self {
            RemoteError::MissingCredential => "missing_credential",
            RemoteError::Network(_) => "network",
            RemoteError::RateLimited => "rate_limited",
            RemoteError::Status { .. } => "remote_status",
            RemoteError::Schema(_) => "malformed_response",
        }
    }
}

/// Submits a recorded clip and returns what the model heard
#[async_trait]
pub trait IdentificationClient: Send + Sync {
    async fn identify(
        &self,
        request: &IdentificationRequest,
    ) -> Result<IdentificationResult, RemoteError>;
}

/// Text features of the player: smart playlists and search remarks
#[async_trait]
pub trait InsightClient: Send + Sync {
    async fn generate_playlist(&self, prompt: &str) -> Result<PlaylistSuggestion, RemoteError>;

    async fn search_insight(&self, query: &str) -> Result<String, RemoteError>;
}
