// IPC Client - Communicates with the daemon over its control endpoint

use crate::config::ControlEndpoint;
use crate::error::{Result, SupervisorError};
use crate::ipc::protocol::{Command, Request, Response, ResponseData};
use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::net::TcpStream;
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Maximum number of connection retry attempts
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Delay between retry attempts
const RETRY_DELAY: Duration = Duration::from_millis(100);

trait Stream: Read + Write {}
impl<T: Read + Write> Stream for T {}

/// Blocking client for the daemon's control endpoint
pub struct IpcClient {
    endpoint: ControlEndpoint,
    request_id: AtomicU64,
}

impl IpcClient {
    pub fn new(endpoint: ControlEndpoint) -> Self {
        Self {
            endpoint,
            request_id: AtomicU64::new(1),
        }
    }

    /// Client for a `unix:` or `tcp://` control URI
    pub fn connect_uri(uri: &str) -> Result<Self> {
        Ok(Self::new(ControlEndpoint::parse(uri)?))
    }

    pub fn endpoint(&self) -> &ControlEndpoint {
        &self.endpoint
    }

    /// Send a command to the daemon and wait for a response
    pub fn send_command(&self, command: Command) -> Result<Response> {
        let request_id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = Request::new(request_id, command);

        let mut last_error = None;
        for attempt in 1..=MAX_RETRY_ATTEMPTS {
            match self.try_send_request(&request) {
                Ok(response) => {
                    if response.id != request_id {
                        return Err(SupervisorError::ProtocolError(format!(
                            "response id mismatch: expected {}, got {}",
                            request_id, response.id
                        )));
                    }
                    return Ok(response);
                }
                // Retrying cannot help when nothing is listening
                Err(SupervisorError::DaemonNotRunning) => {
                    return Err(SupervisorError::DaemonNotRunning)
                }
                Err(e) => {
                    last_error = Some(e);
                    if attempt < MAX_RETRY_ATTEMPTS {
                        std::thread::sleep(RETRY_DELAY);
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            SupervisorError::ConnectionError("failed to connect after retries".to_string())
        }))
    }

    /// Send a command and unwrap the daemon's verdict
    pub fn request(&self, command: Command) -> Result<ResponseData> {
        self.send_command(command)?
            .result
            .map_err(SupervisorError::Other)
    }

    fn try_send_request(&self, request: &Request) -> Result<Response> {
        let mut stream = self.connect()?;

        let request_json = serde_json::to_string(request).map_err(|e| {
            SupervisorError::SerializationError(format!("failed to serialize request: {}", e))
        })?;

        writeln!(stream, "{}", request_json)
            .map_err(|e| SupervisorError::IpcError(format!("failed to write request: {}", e)))?;
        stream
            .flush()
            .map_err(|e| SupervisorError::IpcError(format!("failed to flush stream: {}", e)))?;

        let mut reader = BufReader::new(stream);
        let mut response_line = String::new();
        reader
            .read_line(&mut response_line)
            .map_err(|e| SupervisorError::IpcError(format!("failed to read response: {}", e)))?;

        serde_json::from_str(&response_line).map_err(|e| {
            SupervisorError::DeserializationError(format!("failed to deserialize response: {}", e))
        })
    }

    fn connect(&self) -> Result<Box<dyn Stream>> {
        let connected: std::io::Result<Box<dyn Stream>> = match &self.endpoint {
            ControlEndpoint::Unix(path) => {
                if !path.exists() {
                    return Err(SupervisorError::DaemonNotRunning);
                }
                UnixStream::connect(path).map(|s| Box::new(s) as Box<dyn Stream>)
            }
            ControlEndpoint::Tcp(addr) => {
                TcpStream::connect(addr.as_str()).map(|s| Box::new(s) as Box<dyn Stream>)
            }
        };

        connected.map_err(|e| match e.kind() {
            ErrorKind::ConnectionRefused | ErrorKind::NotFound => SupervisorError::DaemonNotRunning,
            _ => SupervisorError::ConnectionError(format!("failed to connect to daemon: {}", e)),
        })
    }
}
