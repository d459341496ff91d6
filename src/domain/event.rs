use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of an agent log record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Info,
    Success,
    Warning,
    Error,
    Debug,
}

/// Structured log line for observers (dashboards, status server)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: LogKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Reachability of both sides as seen by the last probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub tally: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<bool>,
}

/// Summary of one reconciliation cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub tally_reachable: bool,
    pub backend_reachable: Option<bool>,
    pub fetched: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Cycle ended early (connectivity loss or unexpected error)
    pub aborted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AgentEvent {
    Log(LogRecord),
    ConnectionStatus(ConnectionStatus),
    CycleCompleted(CycleReport),
}
