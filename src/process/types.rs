use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lifecycle state of a supervised process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    #[default]
    Stopped,
    Standby,
    Running,
    Stopping,
    RetryWait,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Stopped => "STOPPED",
            Status::Standby => "STANDBY",
            Status::Running => "RUNNING",
            Status::Stopping => "STOPPING",
            Status::RetryWait => "RETRYWAIT",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of one supervised process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub name: String,
    /// Time elapsed since the current run started
    pub since: Duration,
    pub status: Status,
    pub retries: usize,
    pub first_started: Option<DateTime<Utc>>,
    pub pid: Option<u32>,
}
