//! Coordination backend client
//!
//! The backend queues invoices for sync and records the final status the
//! agent reports. Both endpoints authenticate with the pre-shared agent key.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::BackendConfig;
use crate::domain::{PendingItem, SyncStatus};
use crate::error::{Result, SyncError};

pub const AGENT_KEY_HEADER: &str = "x-tally-agent-key";

#[async_trait]
pub trait BackendApi: Send + Sync {
    /// Documents currently in PENDING state
    async fn fetch_pending(&self) -> Result<Vec<PendingItem>>;

    /// Record the terminal status of one document
    async fn report_status(&self, id: &str, status: SyncStatus, message: &str) -> Result<()>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusUpdate<'a> {
    id: &'a str,
    status: SyncStatus,
    tally_response: &'a str,
}

#[derive(Clone)]
pub struct BackendClient {
    http: Client,
    base_url: String,
    agent_key: String,
}

impl BackendClient {
    pub fn new(base_url: &str, agent_key: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent("tally-sync/0.1")
            .timeout(timeout)
            .build()
            .map_err(|e| {
                SyncError::Internal(format!("failed to build backend HTTP client: {}", e))
            })?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            agent_key: agent_key.to_string(),
        })
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        Self::new(
            &config.url,
            &config.agent_key,
            Duration::from_millis(config.request_timeout_ms),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl BackendApi for BackendClient {
    async fn fetch_pending(&self) -> Result<Vec<PendingItem>> {
        let resp = self
            .http
            .get(format!("{}/api/sync/pending", self.base_url))
            .header(AGENT_KEY_HEADER, &self.agent_key)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::Backend {
                status: status.as_u16(),
                body,
            });
        }

        // Anything other than an array means "nothing to do"
        let Value::Array(raw_items) = resp.json::<Value>().await? else {
            return Ok(Vec::new());
        };

        let mut items = Vec::with_capacity(raw_items.len());
        for raw in raw_items {
            match serde_json::from_value::<PendingItem>(raw) {
                Ok(item) => items.push(item),
                // Without an id the entry cannot even be reported back
                Err(e) => warn!("Skipping queue entry without usable id: {}", e),
            }
        }
        Ok(items)
    }

    async fn report_status(&self, id: &str, status: SyncStatus, message: &str) -> Result<()> {
        let resp = self
            .http
            .post(format!("{}/api/sync/status", self.base_url))
            .header(AGENT_KEY_HEADER, &self.agent_key)
            .json(&StatusUpdate {
                id,
                status,
                tally_response: message,
            })
            .send()
            .await?;

        let code = resp.status();
        if !code.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::Backend {
                status: code.as_u16(),
                body,
            });
        }
        debug!("Backend acknowledged {} -> {}", id, status);
        Ok(())
    }
}
