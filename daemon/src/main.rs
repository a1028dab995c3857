//! neonflow-daemon: Background daemon for song identification
//!
//! This daemon runs next to the NeonFlow player and provides:
//! - One-shot identification of whatever the microphone hears
//! - Continuous auto-detection on a fixed schedule
//! - Playlist naming and search remarks from the same model
//! - IPC server for the player UI

mod capture;
mod config;
mod events;
mod ipc;
mod lifecycle;
mod remote;
mod service;
mod state;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::capture::{AudioInput, CpalInput, DeviceLock};
use crate::config::Config;
use crate::events::DaemonEvent;
use crate::ipc::Server;
use crate::lifecycle::ShutdownSignal;
use crate::remote::GeminiClient;
use crate::service::{Service, ServiceSettings};
use crate::state::ContinuousDetector;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "neonflow-daemon starting");

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(?config.socket_path, ?config.remote, ?config.detection, "configuration loaded");

    if !config.remote.has_credential() {
        warn!("API key not found, identification requests will fail until GEMINI_API_KEY is set");
    }

    let mut shutdown = ShutdownSignal::new()?;
    let token = shutdown.token();

    // State machines -> IPC server and subscribed clients
    let (event_tx, mut log_rx) = broadcast::channel::<DaemonEvent>(64);

    let lock = DeviceLock::new();
    let input: Arc<dyn AudioInput> = Arc::new(CpalInput::new());
    let client = Arc::new(GeminiClient::new(&config.remote)?);

    let (detector, detector_control) = ContinuousDetector::new(
        Arc::clone(&input),
        client.clone(),
        lock.clone(),
        config.detection.clone(),
        event_tx.clone(),
    );
    let detector_task = tokio::spawn(detector.run(token.child_token()));

    let service = Arc::new(Service::new(
        input,
        client,
        lock,
        detector_control,
        event_tx.clone(),
        ServiceSettings {
            identify_clip: config.identify_clip,
            credential_present: config.remote.has_credential(),
        },
    ));

    let server = Server::new(&config.socket_path, service, event_tx)?;

    info!("daemon initialized, entering main loop");

    // Main event loop
    tokio::select! {
        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Log every event the state machines emit
        _ = async {
            loop {
                match log_rx.recv().await {
                    Ok(event) => info!(%event, "daemon event"),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "event logger lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        } => {
            info!("event logger exited");
        }

        // Wait for shutdown signal
        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    // Cleanup
    info!("shutting down...");

    token.cancel();
    if let Err(e) = detector_task.await {
        warn!(?e, "detector task ended abnormally");
    }
    server.shutdown().await;

    info!("neonflow-daemon stopped");

    Ok(())
}
