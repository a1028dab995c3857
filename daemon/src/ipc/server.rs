//! Unix domain socket server for IPC
//!
//! Provides request-response communication and push notifications of
//! daemon events to subscribed clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::events::DaemonEvent;
use crate::service::Service;

use super::protocol::{Request, Response};

/// Frames above this size close the connection
const MAX_FRAME_LEN: usize = 1024 * 1024;

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: UnixListener,
    service: Arc<Service>,
    event_tx: broadcast::Sender<DaemonEvent>,
    shutdown: CancellationToken,
}

impl Server {
    /// Bind the socket and create the server
    pub fn new(
        socket_path: &Path,
        service: Arc<Service>,
        event_tx: broadcast::Sender<DaemonEvent>,
    ) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener,
            service,
            event_tx,
            shutdown: CancellationToken::new(),
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        loop {
            let accepted = tokio::select! {
                accepted = self.listener.accept() => accepted,
                _ = self.shutdown.cancelled() => return Ok(()),
            };

            match accepted {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let service = Arc::clone(&self.service);
                    let event_tx = self.event_tx.clone();
                    let shutdown = self.shutdown.clone();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = handle_client(stream, service, event_tx) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown.cancelled() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

/// Handle a single client connection
///
/// Requests are read on a separate task so that event pushes can be
/// interleaved with responses once the client subscribes. Requests that
/// wait on the remote model run on their own tasks; their responses may
/// therefore arrive after those of later requests.
async fn handle_client(
    stream: UnixStream,
    service: Arc<Service>,
    event_tx: broadcast::Sender<DaemonEvent>,
) -> Result<()> {
    let (mut reader, mut writer) = stream.into_split();
    let (frame_tx, mut frame_rx) = mpsc::channel::<Vec<u8>>(8);
    let mut remote_calls: JoinSet<Response> = JoinSet::new();

    let read_task = tokio::spawn(async move {
        loop {
            match read_frame(&mut reader).await {
                Ok(Some(frame)) => {
                    if frame_tx.send(frame).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    debug!("client disconnected");
                    break;
                }
                Err(e) => {
                    warn!(?e, "failed to read frame");
                    break;
                }
            }
        }
    });

    let mut events: Option<broadcast::Receiver<DaemonEvent>> = None;

    let result = loop {
        tokio::select! {
            frame = frame_rx.recv() => {
                let Some(frame) = frame else { break Ok(()) };

                let response = match serde_json::from_slice::<Request>(&frame) {
                    Ok(request) if request.waits_on_remote() => {
                        debug!(?request, "received request, calling remote model");
                        let service = Arc::clone(&service);
                        remote_calls.spawn(async move { process_request(request, &service).await });
                        continue;
                    }
                    Ok(request) => {
                        debug!(?request, "received request");
                        if matches!(request, Request::Subscribe) && events.is_none() {
                            events = Some(event_tx.subscribe());
                            debug!("client subscribed to notifications");
                        }
                        process_request(request, &service).await
                    }
                    Err(e) => {
                        warn!(%e, "failed to parse request");
                        Response::error("bad_request", e.to_string())
                    }
                };

                if let Err(e) = send_message(&mut writer, &response).await {
                    break Err(e);
                }
            }
            Some(joined) = remote_calls.join_next() => {
                let response = match joined {
                    Ok(response) => response,
                    Err(e) => {
                        error!(?e, "remote request task failed");
                        Response::error("internal", "request handler failed")
                    }
                };
                if let Err(e) = send_message(&mut writer, &response).await {
                    break Err(e);
                }
            }
            event = next_event(&mut events) => {
                match event {
                    Ok(event) => {
                        if let Err(e) = send_message(&mut writer, &Response::Event { event }).await {
                            break Err(e);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "subscriber lagged, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        events = None;
                    }
                }
            }
        }
    };

    read_task.abort();
    remote_calls.abort_all();
    result
}

/// Next pushed event, or never for unsubscribed clients
async fn next_event(
    events: &mut Option<broadcast::Receiver<DaemonEvent>>,
) -> Result<DaemonEvent, broadcast::error::RecvError> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Process a request and return a response
async fn process_request(request: Request, service: &Service) -> Response {
    match request {
        Request::Ping => Response::Pong,

        Request::GetStatus => Response::Status(service.status().await),

        Request::Subscribe => Response::Subscribed,

        Request::Identify => match service.start_identify().await {
            Ok(()) => Response::IdentifyStarted,
            Err(e) => Response::error(e.code(), e.to_string()),
        },

        Request::StopIdentify => match service.stop_identify().await {
            Ok(()) => Response::Ack,
            Err(e) => Response::error(e.code(), e.to_string()),
        },

        Request::CancelIdentify => match service.cancel_identify().await {
            Ok(()) => Response::Ack,
            Err(e) => Response::error(e.code(), e.to_string()),
        },

        Request::SetAutoDetect { enabled } => {
            info!(enabled, "auto-detect changed via IPC");
            service.set_auto_detect(enabled);
            Response::Ack
        }

        Request::GeneratePlaylist { prompt } => match service.generate_playlist(&prompt).await {
            Ok(playlist) => Response::Playlist(playlist),
            Err(e) => Response::error(e.code(), e.to_string()),
        },

        Request::SearchInsight { query } => match service.search_insight(&query).await {
            Ok(text) => Response::Insight { text },
            Err(e) => Response::error(e.code(), e.to_string()),
        },
    }
}

/// Read one length-prefixed frame, `None` on a clean disconnect
pub(crate) async fn read_frame<R>(reader: &mut R) -> std::io::Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    // 4-byte little-endian length
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds limit"),
        ));
    }

    let mut msg_buf = vec![0u8; len];
    reader.read_exact(&mut msg_buf).await?;
    Ok(Some(msg_buf))
}

/// Write one length-prefixed frame
pub(crate) async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let len = u32::try_from(payload.len())
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "frame too large"))?;
    writer.write_all(&len.to_le_bytes()).await?;
    writer.write_all(payload).await?;
    Ok(())
}

/// Send a length-prefixed JSON message
async fn send_message<T: serde::Serialize>(writer: &mut OwnedWriteHalf, msg: &T) -> Result<()> {
    let msg_bytes = serde_json::to_vec(msg)?;
    write_frame(writer, &msg_bytes).await?;
    Ok(())
}
