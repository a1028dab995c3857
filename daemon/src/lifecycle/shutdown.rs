//! Signal handling for graceful shutdown

use anyhow::{Context, Result};
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Handles shutdown signals (SIGTERM, SIGINT)
///
/// Receiving either signal cancels the root token. Long-running tasks hold
/// child tokens of it.
pub struct ShutdownSignal {
    sigterm: Signal,
    sigint: Signal,
    token: CancellationToken,
}

impl ShutdownSignal {
    /// Register the signal handlers
    pub fn new() -> Result<Self> {
        let sigterm =
            signal(SignalKind::terminate()).context("failed to register SIGTERM handler")?;
        let sigint =
            signal(SignalKind::interrupt()).context("failed to register SIGINT handler")?;

        Ok(Self {
            sigterm,
            sigint,
            token: CancellationToken::new(),
        })
    }

    /// Root token, cancelled when a signal arrives
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Wait for a shutdown signal, or for the token to be cancelled
    pub async fn wait(&mut self) {
        tokio::select! {
            _ = self.sigterm.recv() => {
                debug!("received SIGTERM");
            }
            _ = self.sigint.recv() => {
                debug!("received SIGINT");
            }
            _ = self.token.cancelled() => {
                debug!("shutdown requested");
            }
        }
        self.token.cancel();
    }
}
