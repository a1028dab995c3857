//! Daemon features behind a single object
//!
//! The IPC server translates requests into calls on [`Service`]. It owns
//! the current one-shot identification and the detector control, and
//! shares the device lock with the continuous detector.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, Mutex};
use tracing::info;

use crate::capture::{AudioInput, DeviceLock};
use crate::events::DaemonEvent;
use crate::ipc::{DaemonStatus, IdentifyPhase};
use crate::remote::{IdentificationClient, InsightClient, PlaylistSuggestion, RemoteError};
use crate::state::{DetectorControl, OneShotHandle, OneShotIdentifier};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("an identification is already running")]
    IdentifyInProgress,

    #[error("no identification is running")]
    NoIdentification,

    #[error("{0} must not be empty")]
    EmptyInput(&'static str),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl ServiceError {
    /// Stable code reported to IPC clients
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::IdentifyInProgress => "busy",
            ServiceError::NoIdentification => "no_identification",
            ServiceError::EmptyInput(_) => "bad_request",
            ServiceError::Remote(e) => e.code(),
        }
    }
}

/// Static settings for [`Service`]
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Clip length for one-shot identification
    pub identify_clip: Duration,
    /// Whether an API key is configured
    pub credential_present: bool,
}

pub struct Service {
    input: Arc<dyn AudioInput>,
    identifier: Arc<dyn IdentificationClient>,
    insight: Arc<dyn InsightClient>,
    lock: DeviceLock,
    detector: DetectorControl,
    event_tx: broadcast::Sender<DaemonEvent>,
    settings: ServiceSettings,
    current: Mutex<Option<OneShotHandle>>,
    start_time: Instant,
}

impl Service {
    pub fn new<C>(
        input: Arc<dyn AudioInput>,
        client: Arc<C>,
        lock: DeviceLock,
        detector: DetectorControl,
        event_tx: broadcast::Sender<DaemonEvent>,
        settings: ServiceSettings,
    ) -> Self
    where
        C: IdentificationClient + InsightClient + 'static,
    {
        Self {
            input,
            identifier: client.clone(),
            insight: client,
            lock,
            detector,
            event_tx,
            settings,
            current: Mutex::new(None),
            start_time: Instant::now(),
        }
    }

    /// Start a one-shot identification in the background
    pub async fn start_identify(&self) -> Result<(), ServiceError> {
        let mut current = self.current.lock().await;
        if current.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Err(ServiceError::IdentifyInProgress);
        }

        let (identifier, handle) = OneShotIdentifier::new(
            Arc::clone(&self.input),
            Arc::clone(&self.identifier),
            self.lock.clone(),
            self.settings.identify_clip,
            self.event_tx.clone(),
        );

        tokio::spawn(async move {
            let state = identifier.run().await;
            info!(%state, "identification finished");
        });

        *current = Some(handle);
        Ok(())
    }

    /// Finish the running recording early
    pub async fn stop_identify(&self) -> Result<(), ServiceError> {
        self.running_identification().await?.stop_early();
        Ok(())
    }

    /// Abandon the running identification
    pub async fn cancel_identify(&self) -> Result<(), ServiceError> {
        self.running_identification().await?.cancel();
        Ok(())
    }

    async fn running_identification(&self) -> Result<OneShotHandle, ServiceError> {
        self.current
            .lock()
            .await
            .as_ref()
            .filter(|handle| !handle.is_finished())
            .cloned()
            .ok_or(ServiceError::NoIdentification)
    }

    pub fn set_auto_detect(&self, enabled: bool) {
        if self.detector.set_enabled(enabled) {
            let _ = self.event_tx.send(DaemonEvent::AutoDetectToggled { enabled });
        }
    }

    pub async fn generate_playlist(&self, prompt: &str) -> Result<PlaylistSuggestion, ServiceError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ServiceError::EmptyInput("prompt"));
        }
        Ok(self.insight.generate_playlist(prompt).await?)
    }

    pub async fn search_insight(&self, query: &str) -> Result<String, ServiceError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ServiceError::EmptyInput("query"));
        }
        Ok(self.insight.search_insight(query).await?)
    }

    pub async fn status(&self) -> DaemonStatus {
        let identify = self
            .current
            .lock()
            .await
            .as_ref()
            .map(|handle| IdentifyPhase::from(&handle.state()))
            .unwrap_or_default();

        DaemonStatus {
            identify,
            auto_detect: self.detector.is_enabled(),
            detector: self.detector.state(),
            device_busy: self.lock.is_busy(),
            credential_present: self.settings.credential_present,
            uptime_secs: self.start_time.elapsed().as_secs(),
            ..DaemonStatus::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::testing::FakeInput;
    use crate::config::DetectionConfig;
    use crate::remote::testing::{song, FakeClient};
    use crate::state::ContinuousDetector;

    fn service(client: FakeClient) -> (Service, broadcast::Receiver<DaemonEvent>) {
        let input: Arc<dyn AudioInput> = Arc::new(FakeInput::with_clip(b"clip"));
        let client = Arc::new(client);
        let lock = DeviceLock::new();
        let (event_tx, events) = broadcast::channel(32);
        let (_detector, control) = ContinuousDetector::new(
            input.clone(),
            client.clone(),
            lock.clone(),
            DetectionConfig::default(),
            event_tx.clone(),
        );
        let settings = ServiceSettings {
            identify_clip: Duration::from_secs(6),
            credential_present: true,
        };
        (
            Service::new(input, client, lock, control, event_tx, settings),
            events,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_identify_is_rejected_while_running() {
        let (service, _events) = service(FakeClient::returning(song("Night Call", "Kavinsky", 0.9)));

        service.start_identify().await.unwrap();
        assert!(matches!(
            service.start_identify().await,
            Err(ServiceError::IdentifyInProgress)
        ));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(service.status().await.identify, IdentifyPhase::Recording);
        assert!(service.status().await.device_busy);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(service.status().await.identify, IdentifyPhase::Success);
        service.start_identify().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_reaches_running_identification() {
        let (service, mut events) = service(FakeClient::returning(song("Night Call", "Kavinsky", 0.9)));

        assert!(matches!(
            service.cancel_identify().await,
            Err(ServiceError::NoIdentification)
        ));

        service.start_identify().await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        service.cancel_identify().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(service.status().await.identify, IdentifyPhase::Failure);
        let mut failed = None;
        while let Ok(event) = events.try_recv() {
            if let DaemonEvent::IdentifyFailed { code, .. } = event {
                failed = Some(code);
            }
        }
        assert_eq!(failed.as_deref(), Some("cancelled"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_emits_only_on_change() {
        let (service, mut events) = service(FakeClient::new(Vec::new()));

        service.set_auto_detect(true);
        service.set_auto_detect(true);
        service.set_auto_detect(false);

        assert_eq!(
            events.try_recv().unwrap(),
            DaemonEvent::AutoDetectToggled { enabled: true }
        );
        assert_eq!(
            events.try_recv().unwrap(),
            DaemonEvent::AutoDetectToggled { enabled: false }
        );
        assert!(events.try_recv().is_err());
        assert!(!service.status().await.auto_detect);
    }

    #[tokio::test]
    async fn test_text_features_reject_empty_input() {
        let (service, _events) = service(FakeClient::new(Vec::new()));

        let err = service.generate_playlist("   ").await.unwrap_err();
        assert_eq!(err.code(), "bad_request");
        assert!(service.search_insight("").await.is_err());

        let playlist = service.generate_playlist(" chill beats ").await.unwrap();
        assert_eq!(playlist.title, "chill beats mix");
        assert_eq!(service.search_insight("m83").await.unwrap(), "m83 is great");
    }
}
