//! One-shot song identification
//!
//! `Idle -> Recording -> Processing -> {Success, Failure}`. Terminal after a
//! single cycle; the caller may stop the recording early or cancel at any
//! point before a terminal state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::capture::{AudioInput, CaptureSession, DeviceLock};
use crate::events::DaemonEvent;
use crate::remote::{IdentificationClient, IdentificationRequest, IdentificationResult};

use super::IdentifyFailure;

/// The states of a one-shot identification
#[derive(Debug, Clone, PartialEq)]
pub enum OneShotState {
    /// Created, device not yet requested
    Idle,
    /// Microphone open, clip timer running
    Recording,
    /// Clip submitted, waiting for the model
    Processing,
    /// Model recognized the clip
    Success(IdentificationResult),
    /// Cycle ended without a song
    Failure(IdentifyFailure),
}

impl OneShotState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OneShotState::Success(_) | OneShotState::Failure(_))
    }
}

impl std::fmt::Display for OneShotState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OneShotState::Idle => write!(f, "Idle"),
            OneShotState::Recording => write!(f, "Recording"),
            OneShotState::Processing => write!(f, "Processing"),
            OneShotState::Success(_) => write!(f, "Success"),
            OneShotState::Failure(failure) => write!(f, "Failure({})", failure.code()),
        }
    }
}

/// Caller-side controls for a running identification
#[derive(Clone)]
pub struct OneShotHandle {
    cancel: CancellationToken,
    finish: CancellationToken,
    state_rx: watch::Receiver<OneShotState>,
}

impl OneShotHandle {
    /// Abandon the identification; any result is discarded
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// End the recording now and identify what was captured so far
    pub fn stop_early(&self) {
        self.finish.cancel();
    }

    pub fn state(&self) -> OneShotState {
        self.state_rx.borrow().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.state_rx.borrow().is_terminal()
    }

    /// Wait for the terminal state
    #[cfg(test)]
    pub async fn finished(&mut self) -> OneShotState {
        if let Ok(state) = self.state_rx.wait_for(OneShotState::is_terminal).await {
            return state.clone();
        }
        self.state_rx.borrow().clone()
    }
}

/// Records one clip and asks the model what it is
pub struct OneShotIdentifier {
    input: Arc<dyn AudioInput>,
    client: Arc<dyn IdentificationClient>,
    lock: DeviceLock,
    clip: Duration,
    event_tx: broadcast::Sender<DaemonEvent>,
    state_tx: watch::Sender<OneShotState>,
    cancel: CancellationToken,
    finish: CancellationToken,
    state_entered_at: Instant,
}

impl OneShotIdentifier {
    pub fn new(
        input: Arc<dyn AudioInput>,
        client: Arc<dyn IdentificationClient>,
        lock: DeviceLock,
        clip: Duration,
        event_tx: broadcast::Sender<DaemonEvent>,
    ) -> (Self, OneShotHandle) {
        let (state_tx, state_rx) = watch::channel(OneShotState::Idle);
        let cancel = CancellationToken::new();
        let finish = CancellationToken::new();

        let handle = OneShotHandle {
            cancel: cancel.clone(),
            finish: finish.clone(),
            state_rx,
        };

        let identifier = Self {
            input,
            client,
            lock,
            clip,
            event_tx,
            state_tx,
            cancel,
            finish,
            state_entered_at: Instant::now(),
        };

        (identifier, handle)
    }

    /// Run the full cycle and return the terminal state
    pub async fn run(mut self) -> OneShotState {
        let (final_state, event) = match self.identify().await {
            Ok(result) => (
                OneShotState::Success(result.clone()),
                DaemonEvent::Identified { result },
            ),
            Err(failure) => (
                OneShotState::Failure(failure.clone()),
                DaemonEvent::IdentifyFailed {
                    code: failure.code().to_string(),
                    message: failure.to_string(),
                },
            ),
        };

        self.transition_to(final_state.clone());
        self.emit(event);

        final_state
    }

    async fn identify(&mut self) -> Result<IdentificationResult, IdentifyFailure> {
        if self.cancel.is_cancelled() {
            return Err(IdentifyFailure::Cancelled);
        }

        let mut session = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(IdentifyFailure::Cancelled),
            opened = CaptureSession::open(self.input.as_ref(), &self.lock) => {
                opened.map_err(IdentifyFailure::DeviceUnavailable)?
            }
        };

        self.transition_to(OneShotState::Recording);
        self.emit(DaemonEvent::IdentifyRecording {
            clip_ms: self.clip.as_millis() as u64,
        });

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                session.discard().await;
                info!("identification cancelled while recording");
                return Err(IdentifyFailure::Cancelled);
            }
            _ = self.finish.cancelled() => {
                debug!("recording stopped early by caller");
            }
            _ = tokio::time::sleep(self.clip) => {}
        }

        let audio = session.stop().await;
        if audio.is_empty() {
            info!("no audio captured, nothing to identify");
            return Err(IdentifyFailure::Cancelled);
        }

        self.transition_to(OneShotState::Processing);
        self.emit(DaemonEvent::IdentifyProcessing);

        let request = IdentificationRequest::new(&audio);
        let outcome = self.client.identify(&request).await;

        if self.cancel.is_cancelled() {
            info!("identification cancelled while processing, discarding outcome");
            return Err(IdentifyFailure::Cancelled);
        }

        let result = outcome.map_err(IdentifyFailure::Remote)?;
        if !result.is_actionable() {
            return Err(IdentifyFailure::NotRecognized);
        }

        Ok(result)
    }

    /// Perform a state transition
    fn transition_to(&mut self, new_state: OneShotState) {
        let duration_ms = self.state_entered_at.elapsed().as_millis() as u64;
        let old_state = self.state_tx.send_replace(new_state.clone());

        info!(
            from = %old_state,
            to = %new_state,
            duration_ms = duration_ms,
            "identify transition"
        );

        self.state_entered_at = Instant::now();
    }

    fn emit(&self, event: DaemonEvent) {
        debug!(%event, "emitting identify event");
        let _ = self.event_tx.send(event);
    }
}
