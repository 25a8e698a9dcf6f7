use crate::error::{ExoError, Result};
use crate::ipc::{default_socket_path, Command, Request, Response};
use std::path::PathBuf;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};

/// Largest accepted command, in bytes
const MAX_COMMAND_BYTES: u64 = 64 * 1024;

/// Unix socket IPC server
pub struct IpcServer {
    socket_path: PathBuf,
    request_tx: mpsc::Sender<Request>,
    ready_tx: Option<oneshot::Sender<()>>,
}

impl IpcServer {
    /// Create new IPC server
    ///
    /// # Arguments
    /// * `request_tx` - Channel to forward commands to the controller loop
    pub fn new(request_tx: mpsc::Sender<Request>) -> Result<Self> {
        Ok(Self::with_socket_path(request_tx, default_socket_path()?))
    }

    /// Create IPC server bound to an explicit socket path
    #[must_use]
    pub const fn with_socket_path(
        request_tx: mpsc::Sender<Request>,
        socket_path: PathBuf,
    ) -> Self {
        Self {
            socket_path,
            request_tx,
            ready_tx: None,
        }
    }

    /// Set ready signal channel (for testing)
    #[must_use]
    pub fn with_ready_signal(mut self, ready_tx: oneshot::Sender<()>) -> Self {
        self.ready_tx = Some(ready_tx);
        self
    }

    /// Start IPC server
    ///
    /// Binds to Unix socket and handles incoming connections.
    /// Runs until error or the task is aborted.
    pub async fn start(mut self) -> Result<()> {
        // Remove old socket if exists
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)
                .map_err(|e| ExoError::Ipc(format!("Failed to remove old socket: {e}")))?;
        }

        let listener = UnixListener::bind(&self.socket_path).map_err(|e| {
            ExoError::Ipc(format!(
                "Failed to bind socket at {}: {e}",
                self.socket_path.display()
            ))
        })?;

        tracing::info!("IPC server listening on {:?}", self.socket_path);

        if let Some(ready_tx) = self.ready_tx.take() {
            ready_tx.send(()).ok();
        }

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let tx = self.request_tx.clone();
                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_client(stream, tx).await {
                            tracing::error!("Client handler error: {e}");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to accept connection: {e}");
                }
            }
        }
    }

    /// Handle single client connection
    async fn handle_client(stream: UnixStream, request_tx: mpsc::Sender<Request>) -> Result<()> {
        let (read_half, mut write_half) = stream.into_split();

        let mut buf = Vec::new();
        read_half
            .take(MAX_COMMAND_BYTES)
            .read_to_end(&mut buf)
            .await
            .map_err(|e| ExoError::Ipc(format!("Failed to read from client: {e}")))?;

        if buf.is_empty() {
            return Ok(());
        }

        let response = match serde_json::from_slice::<Command>(&buf) {
            Ok(command) => {
                tracing::debug!("Received command: {:?}", command);
                Self::dispatch(command, &request_tx).await?
            }
            Err(e) => Response::Error(format!("Invalid command: {e}")),
        };

        let response_bytes = serde_json::to_vec(&response)
            .map_err(|e| ExoError::Ipc(format!("Failed to serialize response: {e}")))?;

        write_half
            .write_all(&response_bytes)
            .await
            .map_err(|e| ExoError::Ipc(format!("Failed to write response: {e}")))?;
        write_half
            .shutdown()
            .await
            .map_err(|e| ExoError::Ipc(format!("Failed to close connection: {e}")))?;

        Ok(())
    }

    async fn dispatch(command: Command, request_tx: &mpsc::Sender<Request>) -> Result<Response> {
        let (reply, reply_rx) = oneshot::channel();
        request_tx
            .send(Request { command, reply })
            .await
            .map_err(|e| ExoError::Ipc(format!("Failed to send command: {e}")))?;

        reply_rx
            .await
            .map_err(|_| ExoError::Ipc("Controller dropped the request".to_string()))
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        if self.socket_path.exists() {
            let _ = std::fs::remove_file(&self.socket_path);
        }
    }
}
