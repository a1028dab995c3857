//! Continuous background song detection
//!
//! While enabled the detector loops `Idle -> Listening -> AwaitingResult ->
//! Idle`. The first cycle runs as soon as detection is enabled; each later
//! cycle starts one interval after the previous capture ended, so captures
//! never overlap. Failures are logged and never stop the schedule.
//!
//! Every disable bumps a counter on the switch. A cycle remembers the count
//! it started with, so a disable during the cycle is seen even when
//! detection has been re-enabled by the time the result arrives.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capture::{AudioInput, CaptureSession, DeviceLock};
use crate::config::DetectionConfig;
use crate::events::DaemonEvent;
use crate::remote::{IdentificationClient, IdentificationRequest};

/// Where the detector is within a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    /// Disabled, or waiting for the next tick
    #[default]
    Idle,
    /// Recording a clip
    Listening,
    /// Clip submitted, waiting for the model
    AwaitingResult,
}

/// The enabled flag plus how many times it has been switched off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Switch {
    enabled: bool,
    disables: u64,
}

/// Switches auto-detection on and off from outside the run loop
#[derive(Clone)]
pub struct DetectorControl {
    switch_tx: Arc<watch::Sender<Switch>>,
    state_rx: watch::Receiver<LoopState>,
}

impl DetectorControl {
    /// Returns whether the flag actually changed
    pub fn set_enabled(&self, enabled: bool) -> bool {
        let changed = self.switch_tx.send_if_modified(|switch| {
            if switch.enabled == enabled {
                return false;
            }
            switch.enabled = enabled;
            if !enabled {
                switch.disables += 1;
            }
            true
        });
        if changed {
            info!(enabled, "auto-detection toggled");
        }
        changed
    }

    pub fn is_enabled(&self) -> bool {
        self.switch_tx.borrow().enabled
    }

    pub fn state(&self) -> LoopState {
        *self.state_rx.borrow()
    }
}

/// Periodically records ambient audio and reports confident matches
pub struct ContinuousDetector {
    input: Arc<dyn AudioInput>,
    client: Arc<dyn IdentificationClient>,
    lock: DeviceLock,
    config: DetectionConfig,
    switch_rx: watch::Receiver<Switch>,
    state_tx: watch::Sender<LoopState>,
    event_tx: broadcast::Sender<DaemonEvent>,
}

impl ContinuousDetector {
    pub fn new(
        input: Arc<dyn AudioInput>,
        client: Arc<dyn IdentificationClient>,
        lock: DeviceLock,
        config: DetectionConfig,
        event_tx: broadcast::Sender<DaemonEvent>,
    ) -> (Self, DetectorControl) {
        let (switch_tx, switch_rx) = watch::channel(Switch {
            enabled: config.enabled,
            disables: 0,
        });
        let (state_tx, state_rx) = watch::channel(LoopState::Idle);

        let control = DetectorControl {
            switch_tx: Arc::new(switch_tx),
            state_rx,
        };

        let detector = Self {
            input,
            client,
            lock,
            config,
            switch_rx,
            state_tx,
            event_tx,
        };

        (detector, control)
    }

    /// Run the schedule until `shutdown` is cancelled
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            clip_secs = self.config.clip_duration.as_secs(),
            threshold = self.config.confidence_threshold,
            "continuous detector started"
        );

        loop {
            let epoch = tokio::select! {
                _ = shutdown.cancelled() => break,
                epoch = wait_enabled(&mut self.switch_rx) => epoch,
            };
            let Some(epoch) = epoch else {
                debug!("detector control dropped");
                break;
            };

            let capture_end = tokio::select! {
                _ = shutdown.cancelled() => break,
                end = self.run_cycle(epoch) => end,
            };
            self.set_state(LoopState::Idle);

            if self.disabled_since(epoch) {
                debug!("auto-detection toggled during the cycle, schedule restarts");
                continue;
            }

            let next_tick = capture_end + self.config.interval;
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep_until(next_tick) => {}
                _ = disabled_after(&mut self.switch_rx, epoch) => {
                    debug!("auto-detection disabled, pending tick dropped");
                }
            }
        }

        self.set_state(LoopState::Idle);
        info!("continuous detector stopped");
    }

    /// One capture-and-identify cycle; returns when the capture ended
    async fn run_cycle(&mut self, epoch: u64) -> Instant {
        self.set_state(LoopState::Listening);

        let mut session = match CaptureSession::open(self.input.as_ref(), &self.lock).await {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "auto-detection could not open the microphone");
                return Instant::now();
            }
        };

        let disabled = tokio::select! {
            _ = tokio::time::sleep(self.config.clip_duration) => false,
            _ = disabled_after(&mut self.switch_rx, epoch) => true,
        };

        if disabled {
            session.discard().await;
            info!("auto-detection disabled while listening, clip discarded");
            return Instant::now();
        }

        let audio = session.stop().await;
        let capture_end = Instant::now();

        if audio.is_empty() {
            debug!("auto-detection captured no audio");
            return capture_end;
        }

        self.set_state(LoopState::AwaitingResult);

        match self.client.identify(&IdentificationRequest::new(&audio)).await {
            Ok(result) if self.disabled_since(epoch) => {
                debug!(title = %result.title, "auto-detection disabled meanwhile, result discarded");
            }
            Ok(result) if result.passes_threshold(self.config.confidence_threshold) => {
                info!(
                    title = %result.title,
                    artist = %result.artist,
                    confidence = result.confidence,
                    "song detected"
                );
                let _ = self.event_tx.send(DaemonEvent::Detected { result });
            }
            Ok(result) => {
                debug!(
                    title = %result.title,
                    confidence = result.confidence,
                    "detection below threshold or unrecognized"
                );
            }
            Err(e) => {
                warn!(error = %e, "auto-detection identification failed");
            }
        }

        capture_end
    }

    /// Whether detection was switched off after the cycle at `epoch` began
    fn disabled_since(&self, epoch: u64) -> bool {
        self.switch_rx.borrow().disables != epoch
    }

    fn set_state(&self, state: LoopState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(from = ?previous, to = ?state, "detector transition");
            let _ = self.event_tx.send(DaemonEvent::DetectorState { state });
        }
    }
}

/// Wait until detection is on and return its disable count; `None` when
/// the control is gone
async fn wait_enabled(rx: &mut watch::Receiver<Switch>) -> Option<u64> {
    rx.wait_for(|switch| switch.enabled)
        .await
        .ok()
        .map(|switch| switch.disables)
}

/// Resolves once detection has been switched off after `epoch`
async fn disabled_after(rx: &mut watch::Receiver<Switch>, epoch: u64) {
    if rx.wait_for(|switch| switch.disables != epoch).await.is_err() {
        std::future::pending::<()>().await;
    }
}
