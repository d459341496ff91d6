//! Best-effort status reporting to the backend

use serde_json::Value;
use std::sync::Arc;

use crate::adapters::BackendApi;
use crate::domain::SyncStatus;
use crate::services::events::EventSink;

pub struct StatusReporter {
    backend: Arc<dyn BackendApi>,
    events: EventSink,
}

impl StatusReporter {
    pub fn new(backend: Arc<dyn BackendApi>, events: EventSink) -> Self {
        Self { backend, events }
    }

    /// Push the final status of a document
    ///
    /// Never fails: a lost report leaves the document PENDING on the backend
    /// and it is offered again next cycle.
    pub async fn report(&self, id: &str, status: SyncStatus, message: impl Into<Value>) {
        let text = message_text(message.into());
        if let Err(e) = self.backend.report_status(id, status, &text).await {
            self.events.log(
                crate::domain::LogKind::Warning,
                format!("Failed to update status for item {} to backend.", id),
                Some(e.to_string()),
            );
        }
    }
}

/// Strings go out verbatim, anything else as compact JSON
fn message_text(message: Value) -> String {
    match message {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_text() {
        assert_eq!(message_text(json!("plain")), "plain");
        assert_eq!(
            message_text(json!({"created": 0, "errors": 1})),
            r#"{"created":0,"errors":1}"#
        );
        assert_eq!(message_text(Value::Null), "null");
    }
}
