// IPC Protocol definitions for client-daemon communication

use crate::process::{ProcessInfo, Status};
use serde::{Deserialize, Serialize};

/// Control commands understood by the daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Status of one process, or of every process when `target` is empty
    Status { target: String },
    Start { target: String },
    Stop { target: String },
}

impl Command {
    pub fn target(&self) -> &str {
        match self {
            Command::Status { target } | Command::Start { target } | Command::Stop { target } => {
                target
            }
        }
    }
}

/// Response data variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResponseData {
    /// Status listing, in load order
    ProcessList(Vec<ProcessInfo>),
    /// Status of the targeted process after a start or stop
    State(Status),
}

/// Request message from client to daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub command: Command,
}

/// Response message from daemon to client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    pub result: Result<ResponseData, String>,
}

impl Request {
    pub fn new(id: u64, command: Command) -> Self {
        Self { id, command }
    }
}

impl Response {
    pub fn success(id: u64, data: ResponseData) -> Self {
        Self {
            id,
            result: Ok(data),
        }
    }

    pub fn error(id: u64, error: String) -> Self {
        Self {
            id,
            result: Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_command_target() {
        let cmd = Command::Stop {
            target: "web".to_string(),
        };
        assert_eq!(cmd.target(), "web");
    }

    #[test]
    fn test_request_wire_format() {
        let request = Request::new(
            7,
            Command::Status {
                target: String::new(),
            },
        );
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(json, r#"{"id":7,"command":{"Status":{"target":""}}}"#);
    }

    #[test]
    fn test_response_carries_status_literal() {
        let response = Response::success(3, ResponseData::State(Status::RetryWait));
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"RETRYWAIT\""));

        let parsed: Response = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.result, Ok(ResponseData::State(Status::RetryWait)));
    }

    #[test]
    fn test_error_response() {
        let response = Response::error(9, "unknown proc name: x".to_string());
        let json = serde_json::to_string(&response).unwrap();
        let parsed: Response = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, 9);
        assert_eq!(parsed.result, Err("unknown proc name: x".to_string()));
    }

    #[test]
    fn test_process_list_deserializes() {
        let info = ProcessInfo {
            name: "api".to_string(),
            since: Duration::from_millis(1500),
            status: Status::Running,
            retries: 2,
            first_started: None,
            pid: Some(1234),
        };
        let response = Response::success(1, ResponseData::ProcessList(vec![info.clone()]));
        let json = serde_json::to_string(&response).unwrap();
        let parsed: Response = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.result, Ok(ResponseData::ProcessList(vec![info])));
    }
}
