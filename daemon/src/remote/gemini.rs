//! Gemini `generateContent` client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::RemoteConfig;

use super::{
    IdentificationClient, IdentificationRequest, IdentificationResult, InsightClient,
    PlaylistSuggestion, RemoteError,
};

const IDENTIFY_INSTRUCTION: &str = "Listen to this audio clip and identify the song that is playing. \
Return the song title, the artist, the genre if you know it, and your confidence between 0 and 1. \
If you cannot identify the song, return the title \"Unknown\" with confidence 0.";

/// Talks to the Gemini REST API with a single API key
pub struct GeminiClient {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("neonflow-daemon/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    pub fn has_credential(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    fn credential(&self) -> Result<&str, RemoteError> {
        if self.has_credential() {
            Ok(self.api_key.trim())
        } else {
            Err(RemoteError::MissingCredential)
        }
    }

    /// POST one `generateContent` request and return the candidate text
    async fn generate(&self, api_key: &str, body: Value) -> Result<String, RemoteError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        debug!(%url, "sending generateContent request");

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("remote model rate limited the request");
            return Err(RemoteError::RateLimited);
        }
        if !status.is_success() {
            warn!(status = status.as_u16(), "remote model request failed");
            return Err(RemoteError::Status {
                code: status.as_u16(),
            });
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::Schema(e.to_string()))?;

        parsed
            .into_text()
            .ok_or_else(|| RemoteError::Schema("response carried no candidate text".to_string()))
    }
}

#[async_trait]
impl IdentificationClient for GeminiClient {
    async fn identify(
        &self,
        request: &IdentificationRequest,
    ) -> Result<IdentificationResult, RemoteError> {
        let api_key = self.credential()?;

        let body = json!({
            "contents": [{
                "parts": [
                    { "inline_data": { "mime_type": request.mime_type(), "data": request.data() } },
                    { "text": IDENTIFY_INSTRUCTION }
                ]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": {
                    "type": "OBJECT",
                    "properties": {
                        "title": { "type": "STRING" },
                        "artist": { "type": "STRING" },
                        "genre": { "type": "STRING" },
                        "confidence": { "type": "NUMBER" }
                    },
                    "required": ["title", "artist", "confidence"]
                }
            }
        });

        let text = self.generate(api_key, body).await?;
        let result: IdentificationResult = parse_json(&text)?;

        info!(
            title = %result.title,
            artist = %result.artist,
            confidence = result.confidence,
            "remote identification returned"
        );
        Ok(result)
    }
}

#[async_trait]
impl InsightClient for GeminiClient {
    async fn generate_playlist(&self, prompt: &str) -> Result<PlaylistSuggestion, RemoteError> {
        let api_key = self.credential()?;

        let body = json!({
            "contents": [{
                "parts": [{
                    "text": format!(
                        "Based on this mood or request: \"{prompt}\", generate a creative playlist name and a short descriptive tagline. Return as JSON."
                    )
                }]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": {
                    "type": "OBJECT",
                    "properties": {
                        "title": { "type": "STRING" },
                        "description": { "type": "STRING" }
                    },
                    "required": ["title", "description"]
                }
            }
        });

        let text = self.generate(api_key, body).await?;
        parse_json(&text)
    }

    async fn search_insight(&self, query: &str) -> Result<String, RemoteError> {
        let api_key = self.credential()?;

        let body = json!({
            "contents": [{
                "parts": [{
                    "text": format!(
                        "The user is searching for \"{query}\" in their music library. Give a quick, witty AI response (max 20 words) about why they might like this artist or genre, or a fun fact about it."
                    )
                }]
            }]
        });

        let text = self.generate(api_key, body).await?;
        Ok(text.trim().to_string())
    }
}

fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, RemoteError> {
    serde_json::from_str(text.trim()).map_err(|e| RemoteError::Schema(e.to_string()))
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Text parts of the first candidate, joined
    fn into_text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().filter_map(|part| part.text).collect();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}
