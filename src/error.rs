use thiserror::Error;

/// Main error type for the procward supervisor
#[derive(Debug, Error)]
pub enum SupervisorError {
    // Control-plane errors
    #[error("unknown proc name: {0}")]
    UnknownProcess(String),

    #[error("already running: {0}")]
    AlreadyRunning(String),

    // Launch-preparation errors (terminal for the current start)
    #[error("failed to find executable {0:?}: {1}")]
    ExecutableNotFound(String, String),

    #[error("{stream} open failed {path:?}: {source}")]
    OutputOpen {
        stream: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    // Runtime errors (non-terminal, trigger a retry)
    #[error("failed to spawn process {0}: {1}")]
    SpawnError(String, String),

    #[error("process {0} exited abnormally: {1}")]
    AbnormalExit(String, String),

    #[error("retry over: {0} exhausted its retry budget of {1}")]
    RetryExhausted(String, usize),

    #[error("failed to stop process {0}: {1}")]
    StopError(String, String),

    #[error("signal error: {0}")]
    SignalError(String),

    // IPC-related errors
    #[error("IPC error: {0}")]
    IpcError(String),

    #[error("failed to connect to daemon: {0}")]
    ConnectionError(String),

    #[error("IPC protocol error: {0}")]
    ProtocolError(String),

    #[error("daemon not running")]
    DaemonNotRunning,

    #[error("not supported scheme: {0}")]
    UnsupportedScheme(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("invalid configuration file: {0}")]
    InvalidConfig(String),

    #[error("missing required configuration field: {0}")]
    MissingConfigField(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("deserialization error: {0}")]
    DeserializationError(String),

    #[error("{0}")]
    Other(String),
}

impl SupervisorError {
    /// Whether this error ends the current start invocation
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SupervisorError::AlreadyRunning(_)
                | SupervisorError::ExecutableNotFound(..)
                | SupervisorError::OutputOpen { .. }
                | SupervisorError::RetryExhausted(..)
        )
    }
}

/// Result type alias for procward operations
pub type Result<T> = std::result::Result<T, SupervisorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_process_message() {
        let err = SupervisorError::UnknownProcess("missing".to_string());
        assert_eq!(err.to_string(), "unknown proc name: missing");
    }

    #[test]
    fn test_terminal_classification() {
        assert!(SupervisorError::RetryExhausted("app".to_string(), 2).is_terminal());
        assert!(SupervisorError::ExecutableNotFound("nope".to_string(), "x".to_string())
            .is_terminal());
        assert!(!SupervisorError::AbnormalExit("app".to_string(), "exit 1".to_string())
            .is_terminal());
        assert!(!SupervisorError::SpawnError("app".to_string(), "x".to_string()).is_terminal());
    }
}
