use crate::error::{Result, SupervisorError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Signals accepted as a process stop signal
pub const VALID_SIGNALS: [&str; 7] = [
    "SIGTERM", "SIGINT", "SIGQUIT", "SIGKILL", "SIGHUP", "SIGUSR1", "SIGUSR2",
];

/// Launch specification for one supervised process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessConfig {
    /// Process name (falls back to `exec` when empty)
    #[serde(default)]
    pub name: String,

    /// Free-form description shown to operators
    #[serde(default)]
    pub description: String,

    /// Working directory for the process
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Executable to run, either a path or a name looked up on PATH
    pub exec: String,

    /// Command-line arguments
    #[serde(default)]
    pub args: Vec<String>,

    /// Environment overrides in KEY=VALUE form, appended to the inherited environment
    #[serde(default)]
    pub env: Vec<String>,

    /// File that receives the child's stdout (append mode)
    #[serde(default)]
    pub stdout: Option<PathBuf>,

    /// File that receives the child's stderr (append mode)
    #[serde(default)]
    pub stderr: Option<PathBuf>,

    /// Automatic relaunches permitted after the first run
    #[serde(default)]
    pub retry: usize,

    /// Signal sent before the forced kill on stop (kill immediately when unset)
    #[serde(default)]
    pub stop_signal: Option<String>,

    /// Time to wait for the stop signal to take effect (in seconds)
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_secs: u64,

    /// Pause between a finished run and the next launch (in milliseconds)
    #[serde(default = "default_interval")]
    pub interval_ms: u64,
}

/// Full daemon configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigSet {
    /// Control endpoint, `unix:<path>` or `tcp://host:port`
    #[serde(default = "default_control_uri")]
    pub control_uri: String,

    /// Processes to supervise, in start order
    #[serde(default)]
    pub procs: Vec<ProcessConfig>,
}

fn default_stop_timeout() -> u64 {
    10
}

fn default_interval() -> u64 {
    1000
}

/// Control endpoint used when the configuration names none
pub const DEFAULT_CONTROL_URI: &str = "unix:./procward.sock";

fn default_control_uri() -> String {
    DEFAULT_CONTROL_URI.to_string()
}

impl ProcessConfig {
    /// Create a configuration for `exec` with every optional field at its default
    pub fn new(exec: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            dir: None,
            exec: exec.into(),
            args: Vec::new(),
            env: Vec::new(),
            stdout: None,
            stderr: None,
            retry: 0,
            stop_signal: None,
            stop_timeout_secs: default_stop_timeout(),
            interval_ms: default_interval(),
        }
    }

    /// Identity used for lookup and logging
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.exec
        } else {
            &self.name
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.exec.is_empty() {
            return Err(SupervisorError::MissingConfigField("exec".to_string()));
        }

        if let Some(ref signal) = self.stop_signal {
            if !VALID_SIGNALS.contains(&signal.as_str()) {
                return Err(SupervisorError::ConfigError(format!(
                    "invalid stop_signal for {}: {}. Must be one of: {}",
                    self.display_name(),
                    signal,
                    VALID_SIGNALS.join(", ")
                )));
            }
        }

        for entry in &self.env {
            if !entry.contains('=') {
                return Err(SupervisorError::ConfigError(format!(
                    "invalid environment entry for {}: '{}'. Expected KEY=VALUE",
                    self.display_name(),
                    entry
                )));
            }
        }

        Ok(())
    }

    /// Environment overrides split into key/value pairs
    pub fn env_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.env.iter().filter_map(|entry| entry.split_once('='))
    }

    /// Backoff interval as Duration
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Stop timeout as Duration
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    /// Expand environment variables in the executable and path fields
    ///
    /// `args` and `env` are passed to the child verbatim; the child resolves
    /// them against its own, overridden environment.
    fn expand_env_vars(&mut self) {
        self.exec = expand_env_in_string(&self.exec);
        self.dir = self.dir.as_deref().map(expand_env_in_path);
        self.stdout = self.stdout.as_deref().map(expand_env_in_path);
        self.stderr = self.stderr.as_deref().map(expand_env_in_path);
    }
}

impl ConfigSet {
    /// Load the daemon configuration from a file (supports TOML and JSON)
    pub fn from_file(path: &Path) -> Result<ConfigSet> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SupervisorError::ConfigError(format!(
                "failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");

        let mut config = match extension {
            "toml" => Self::parse_toml(&contents)?,
            "json" => Self::parse_json(&contents)?,
            _ => {
                return Err(SupervisorError::InvalidConfig(format!(
                    "unsupported file format: {}. Use .toml or .json",
                    extension
                )))
            }
        };

        for proc in &mut config.procs {
            proc.expand_env_vars();
            proc.validate()?;
        }

        Ok(config)
    }

    fn parse_toml(contents: &str) -> Result<ConfigSet> {
        toml::from_str(contents)
            .map_err(|e| SupervisorError::InvalidConfig(format!("failed to parse TOML: {}", e)))
    }

    fn parse_json(contents: &str) -> Result<ConfigSet> {
        serde_json::from_str(contents)
            .map_err(|e| SupervisorError::InvalidConfig(format!("failed to parse JSON: {}", e)))
    }

    /// Parse the control URI into a listen/dial endpoint
    pub fn endpoint(&self) -> Result<ControlEndpoint> {
        ControlEndpoint::parse(&self.control_uri)
    }
}

impl Default for ConfigSet {
    fn default() -> Self {
        Self {
            control_uri: default_control_uri(),
            procs: Vec::new(),
        }
    }
}

/// Where the control service listens and the CLI dials
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEndpoint {
    Unix(PathBuf),
    Tcp(String),
}

impl ControlEndpoint {
    /// Parse `unix:<path>`, `unix://<path>` or `tcp://host:port`
    pub fn parse(uri: &str) -> Result<ControlEndpoint> {
        let (scheme, rest) = uri
            .split_once(':')
            .ok_or_else(|| SupervisorError::ConfigError(format!("invalid control uri: {}", uri)))?;

        match scheme {
            "unix" => {
                let path = rest.strip_prefix("//").unwrap_or(rest);
                if path.is_empty() {
                    return Err(SupervisorError::ConfigError(format!(
                        "empty socket path in control uri: {}",
                        uri
                    )));
                }
                Ok(ControlEndpoint::Unix(PathBuf::from(path)))
            }
            "tcp" => {
                let host = rest.strip_prefix("//").unwrap_or(rest);
                let host = host.split('/').next().unwrap_or("");
                if host.is_empty() {
                    return Err(SupervisorError::ConfigError(format!(
                        "empty host in control uri: {}",
                        uri
                    )));
                }
                Ok(ControlEndpoint::Tcp(host.to_string()))
            }
            other => Err(SupervisorError::UnsupportedScheme(other.to_string())),
        }
    }
}

impl std::fmt::Display for ControlEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlEndpoint::Unix(path) => write!(f, "unix:{}", path.display()),
            ControlEndpoint::Tcp(host) => write!(f, "tcp://{}", host),
        }
    }
}

/// Default config path: `<executable without extension>.json` beside the executable
pub fn default_config_path() -> Result<PathBuf> {
    let exe = std::env::current_exe()?;
    Ok(exe.with_extension("json"))
}

fn is_var_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Expand $VAR and ${VAR} references in a string
///
/// `$VAR` takes the longest run of `[A-Za-z0-9_]`. Unset variables and a
/// lone `$` are left as written.
fn expand_env_in_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(pos) = rest.find('$') {
        result.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let (name, consumed) = match after.strip_prefix('{') {
            Some(braced) => match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            },
            None => {
                let end = after.find(|c: char| !is_var_char(c)).unwrap_or(after.len());
                (&after[..end], end)
            }
        };

        match std::env::var(name) {
            Ok(value) if !name.is_empty() => {
                result.push_str(&value);
                rest = &after[consumed..];
            }
            _ => {
                result.push('$');
                rest = after;
            }
        }
    }

    result.push_str(rest);
    result
}

fn expand_env_in_path(path: &Path) -> PathBuf {
    PathBuf::from(expand_env_in_string(&path.to_string_lossy()))
}
