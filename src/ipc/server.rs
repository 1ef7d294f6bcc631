// IPC Server - Listens for client connections and handles requests

use crate::config::ControlEndpoint;
use crate::error::{Result, SupervisorError};
use crate::ipc::controller::Controller;
use crate::ipc::protocol::{Request, Response};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, UnixListener};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

enum Listener {
    Unix { listener: UnixListener, path: PathBuf },
    Tcp(TcpListener),
}

/// IPC server for handling client connections
///
/// Each connection carries exactly one newline-terminated JSON request and
/// receives one response line.
pub struct IpcServer {
    listener: Listener,
    controller: Controller,
}

impl IpcServer {
    /// Bind the control endpoint
    ///
    /// A stale Unix socket left behind by a previous daemon is removed first,
    /// and the new socket is made accessible to its owner only.
    pub async fn bind(endpoint: &ControlEndpoint, controller: Controller) -> Result<Self> {
        let listener = match endpoint {
            ControlEndpoint::Unix(path) => {
                if path.exists() {
                    std::fs::remove_file(path).map_err(|e| {
                        SupervisorError::IpcError(format!("failed to remove existing socket: {}", e))
                    })?;
                }

                let listener = UnixListener::bind(path).map_err(|e| {
                    SupervisorError::IpcError(format!("failed to bind to socket: {}", e))
                })?;

                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).map_err(
                    |e| SupervisorError::IpcError(format!("failed to set socket permissions: {}", e)),
                )?;

                Listener::Unix {
                    listener,
                    path: path.clone(),
                }
            }
            ControlEndpoint::Tcp(addr) => {
                let listener = TcpListener::bind(addr).await.map_err(|e| {
                    SupervisorError::IpcError(format!("failed to bind to {}: {}", addr, e))
                })?;
                Listener::Tcp(listener)
            }
        };

        Ok(Self {
            listener,
            controller,
        })
    }

    /// Socket path of a Unix endpoint
    pub fn socket_path(&self) -> Option<&Path> {
        match &self.listener {
            Listener::Unix { path, .. } => Some(path),
            Listener::Tcp(_) => None,
        }
    }

    /// Bound address of a TCP endpoint
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        match &self.listener {
            Listener::Tcp(listener) => listener.local_addr().ok(),
            Listener::Unix { .. } => None,
        }
    }

    /// Accept connections until `shutdown` fires, then clean up
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        info!("control server listening");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.accept() => match accepted {
                    Ok(()) => {}
                    Err(e) => warn!("failed to accept connection: {}", e),
                },
            }
        }

        if let Listener::Unix { path, .. } = &self.listener {
            if path.exists() {
                std::fs::remove_file(path).map_err(|e| {
                    SupervisorError::IpcError(format!("failed to remove socket file: {}", e))
                })?;
            }
        }
        info!("control server stopped");

        Ok(())
    }

    async fn accept(&self) -> std::io::Result<()> {
        let controller = self.controller.clone();
        match &self.listener {
            Listener::Unix { listener, .. } => {
                let (stream, _addr) = listener.accept().await?;
                tokio::spawn(serve_connection(stream, controller));
            }
            Listener::Tcp(listener) => {
                let (stream, addr) = listener.accept().await?;
                debug!("control connection from {}", addr);
                tokio::spawn(serve_connection(stream, controller));
            }
        }
        Ok(())
    }
}

async fn serve_connection<S>(stream: S, controller: Controller)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if let Err(e) = handle_connection(stream, &controller).await {
        warn!("control connection failed: {}", e);
    }
}

/// Read one request, dispatch it, and write the response
async fn handle_connection<S>(stream: S, controller: &Controller) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    reader
        .read_line(&mut request_line)
        .await
        .map_err(|e| SupervisorError::IpcError(format!("failed to read request: {}", e)))?;

    let request: Request = serde_json::from_str(&request_line).map_err(|e| {
        SupervisorError::DeserializationError(format!("failed to deserialize request: {}", e))
    })?;
    debug!("control request {}: {:?}", request.id, request.command);

    let response = match controller.handle(request.command).await {
        Ok(data) => Response::success(request.id, data),
        Err(e) => Response::error(request.id, e.to_string()),
    };

    let mut response_json = serde_json::to_string(&response).map_err(|e| {
        SupervisorError::SerializationError(format!("failed to serialize response: {}", e))
    })?;
    response_json.push('\n');

    let stream = reader.get_mut();
    stream
        .write_all(response_json.as_bytes())
        .await
        .map_err(|e| SupervisorError::IpcError(format!("failed to write response: {}", e)))?;
    stream
        .flush()
        .await
        .map_err(|e| SupervisorError::IpcError(format!("failed to flush stream: {}", e)))?;

    Ok(())
}
