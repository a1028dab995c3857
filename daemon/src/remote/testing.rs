//! Scripted model clients used by the state machine tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{
    IdentificationClient, IdentificationRequest, IdentificationResult, InsightClient,
    PlaylistSuggestion, RemoteError,
};

/// Replies with queued outcomes, then repeats the last one
pub struct FakeClient {
    outcomes: Mutex<VecDeque<Result<IdentificationResult, RemoteError>>>,
    last: Mutex<Option<Result<IdentificationResult, RemoteError>>>,
    delay: Duration,
    calls: AtomicUsize,
}

impl FakeClient {
    pub fn new(outcomes: Vec<Result<IdentificationResult, RemoteError>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            last: Mutex::new(None),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn returning(result: IdentificationResult) -> Self {
        Self::new(vec![Ok(result)])
    }

    pub fn failing(error: RemoteError) -> Self {
        Self::new(vec![Err(error)])
    }

    /// Simulated network round-trip, applied to every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

pub fn song(title: &str, artist: &str, confidence: f64) -> IdentificationResult {
    IdentificationResult {
        title: title.to_string(),
        artist: artist.to_string(),
        genre: None,
        confidence,
    }
}

#[async_trait]
impl IdentificationClient for FakeClient {
    async fn identify(
        &self,
        _request: &IdentificationRequest,
    ) -> Result<IdentificationResult, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.wait().await;

        let next = self.outcomes.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        if let Some(outcome) = next {
            *last = Some(outcome);
        }
        last.clone()
            .unwrap_or_else(|| Err(RemoteError::Network("no scripted outcome".to_string())))
    }
}

#[async_trait]
impl InsightClient for FakeClient {
    async fn generate_playlist(&self, prompt: &str) -> Result<PlaylistSuggestion, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.wait().await;
        Ok(PlaylistSuggestion {
            title: format!("{prompt} mix"),
            description: "generated".to_string(),
        })
    }

    async fn search_insight(&self, query: &str) -> Result<String, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.wait().await;
        Ok(format!("{query} is great"))
    }
}
