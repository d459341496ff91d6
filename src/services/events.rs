//! Agent event channel
//!
//! Observers (CLI, status server, a desktop shell) subscribe to a broadcast
//! channel of [`AgentEvent`]s. Every log event is mirrored to `tracing` so
//! nothing is lost when nobody is subscribed.

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::domain::{AgentEvent, ConnectionStatus, CycleReport, LogKind, LogRecord};

const DEFAULT_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct EventSink {
    tx: broadcast::Sender<AgentEvent>,
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.tx.subscribe()
    }

    fn emit(&self, event: AgentEvent) {
        // No subscribers is fine
        let _ = self.tx.send(event);
    }

    pub fn log(&self, kind: LogKind, message: impl Into<String>, detail: Option<String>) {
        let message = message.into();
        match (kind, detail.as_deref()) {
            (LogKind::Error, Some(d)) => error!(detail = d, "{}", message),
            (LogKind::Error, None) => error!("{}", message),
            (LogKind::Warning, Some(d)) => warn!(detail = d, "{}", message),
            (LogKind::Warning, None) => warn!("{}", message),
            (LogKind::Debug, _) => debug!("{}", message),
            (LogKind::Info | LogKind::Success, Some(d)) => info!(detail = d, "{}", message),
            (LogKind::Info | LogKind::Success, None) => info!("{}", message),
        }
        self.emit(AgentEvent::Log(LogRecord {
            timestamp: Utc::now(),
            kind,
            message,
            detail,
        }));
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogKind::Info, message, None);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.log(LogKind::Success, message, None);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.log(LogKind::Warning, message, None);
    }

    pub fn error(&self, message: impl Into<String>, detail: impl Into<String>) {
        self.log(LogKind::Error, message, Some(detail.into()));
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogKind::Debug, message, None);
    }

    pub fn connection(&self, tally: bool, backend: Option<bool>) {
        self.emit(AgentEvent::ConnectionStatus(ConnectionStatus { tally, backend }));
    }

    pub fn cycle_completed(&self, report: CycleReport) {
        self.emit(AgentEvent::CycleCompleted(report));
    }
}
