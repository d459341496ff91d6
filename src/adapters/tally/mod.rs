//! TallyPrime HTTP adapter
//!
//! Tally listens on a single endpoint (default `http://localhost:9000`).
//! A plain GET answers with a fixed handshake string; every other operation
//! is an XML envelope POSTed to the same URL.

pub mod envelope;
pub mod response;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::TallyConfig;
use crate::domain::PendingDocument;
use crate::error::{Result, SyncError};

/// Exact body Tally returns to a GET when its HTTP server is up
pub const HANDSHAKE: &str = "<RESPONSE>TallyPrime Server is Running</RESPONSE>";

/// Operations the sync agent needs from the accounting system
///
/// Import operations return the raw response body; classification is the
/// caller's job. Transport failures surface as `Err`.
#[async_trait]
pub trait AccountingClient: Send + Sync {
    /// Liveness probe; never errors
    async fn probe(&self) -> bool;

    async fn list_companies(&self) -> Result<Vec<String>>;

    async fn create_ledger(&self, company: &str, name: &str, group: &str) -> Result<String>;

    async fn alter_voucher(&self, company: &str, document: &PendingDocument) -> Result<String>;

    async fn voucher_exists(&self, company: &str, remote_id: &str) -> Result<bool>;
}

#[derive(Clone)]
pub struct TallyClient {
    http: Client,
    url: String,
    probe_timeout: Duration,
}

impl TallyClient {
    pub fn new(url: &str, probe_timeout: Duration, request_timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent("tally-sync/0.1")
            .timeout(request_timeout)
            .build()
            .map_err(|e| SyncError::Internal(format!("failed to build Tally HTTP client: {}", e)))?;

        Ok(Self {
            http,
            url: url.trim_end_matches('/').to_string(),
            probe_timeout,
        })
    }

    pub fn from_config(config: &TallyConfig) -> Result<Self> {
        Self::new(
            &config.url,
            Duration::from_millis(config.probe_timeout_ms),
            Duration::from_millis(config.request_timeout_ms),
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post(&self, envelope: String) -> Result<String> {
        let resp = self
            .http
            .post(&self.url)
            .header(CONTENT_TYPE, "text/xml")
            .body(envelope)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            warn!("Tally answered HTTP {}", status);
        }
        Ok(body)
    }
}

#[async_trait]
impl AccountingClient for TallyClient {
    async fn probe(&self) -> bool {
        let resp = match self
            .http
            .get(&self.url)
            .timeout(self.probe_timeout)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                debug!("Tally probe failed: {}", e);
                return false;
            }
        };
        match resp.text().await {
            Ok(body) => body.trim() == HANDSHAKE,
            Err(e) => {
                debug!("Tally probe body unreadable: {}", e);
                false
            }
        }
    }

    async fn list_companies(&self) -> Result<Vec<String>> {
        let raw = self.post(envelope::list_companies()?).await?;
        let root = response::parse(&raw)?;
        Ok(response::company_names(&root))
    }

    async fn create_ledger(&self, company: &str, name: &str, group: &str) -> Result<String> {
        self.post(envelope::create_ledger(company, name, group)?).await
    }

    async fn alter_voucher(&self, company: &str, document: &PendingDocument) -> Result<String> {
        self.post(envelope::alter_sales_voucher(company, document)?)
            .await
    }

    async fn voucher_exists(&self, company: &str, remote_id: &str) -> Result<bool> {
        let raw = self
            .post(envelope::voucher_exists(company, remote_id)?)
            .await?;
        Ok(response::contains_remote_id(&raw, remote_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LineItem, Party};
    use rust_decimal_macros::dec;

    fn sample_document() -> PendingDocument {
        PendingDocument {
            remote_id: "rid-42".to_string(),
            document_number: "INV/42".to_string(),
            date: "20240401".to_string(),
            narration: Some("Order <42> & more".to_string()),
            party: Party {
                name: "Sharma & Sons \"Retail\"".to_string(),
            },
            line_items: vec![
                LineItem {
                    ledger_name: "Sales 18%".to_string(),
                    amount: dec!(100.00),
                },
                LineItem {
                    ledger_name: "Sales 18%".to_string(),
                    amount: dec!(50),
                },
            ],
            taxes: [("igst", dec!(27.00))].into_iter().collect(),
        }
    }

    #[test]
    fn test_ledger_envelope_escapes_name() {
        let xml = envelope::create_ledger("Acme <Main>", "O'Brien & \"Co\"", "Sundry Debtors").unwrap();
        assert!(!xml.contains("O'Brien & \"Co\""));
        assert!(xml.contains("O&apos;Brien &amp; &quot;Co&quot;"));
        assert!(xml.contains("Acme &lt;Main&gt;"));

        let root = response::parse(&xml).unwrap();
        let ledger = root
            .path(&["BODY", "IMPORTDATA", "REQUESTDATA", "TALLYMESSAGE", "LEDGER"])
            .unwrap();
        assert_eq!(ledger.attr("NAME"), Some("O'Brien & \"Co\""));
        assert_eq!(ledger.attr("ACTION"), Some("Create"));
        assert_eq!(ledger.child("PARENT").unwrap().text, "Sundry Debtors");
        assert_eq!(
            root.path(&["BODY", "IMPORTDATA", "REQUESTDESC", "REPORTNAME"])
                .unwrap()
                .text,
            "All Masters"
        );
    }

    #[test]
    fn test_voucher_envelope_balances() {
        let xml = envelope::alter_sales_voucher("Acme", &sample_document()).unwrap();
        let root = response::parse(&xml).unwrap();
        let voucher = root.find_first("VOUCHER").unwrap();
        assert_eq!(voucher.attr("REMOTEID"), Some("rid-42"));
        assert_eq!(voucher.attr("ACTION"), Some("Alter"));
        assert_eq!(voucher.attr("VCHTYPE"), Some("Sales"));
        assert_eq!(
            voucher.child("PARTYLEDGERNAME").unwrap().text,
            "Sharma & Sons \"Retail\""
        );
        assert_eq!(voucher.child("NARRATION").unwrap().text, "Order <42> & more");

        let entries: Vec<_> = voucher.children_named("ALLLEDGERENTRIES.LIST").collect();
        assert_eq!(entries.len(), 4);
        let amounts: Vec<&str> = entries
            .iter()
            .map(|e| e.child("AMOUNT").unwrap().trimmed_text())
            .collect();
        assert_eq!(amounts, vec!["-177.00", "100.00", "50.00", "27.00"]);
        assert_eq!(entries[0].child("ISDEEMEDPOSITIVE").unwrap().text, "Yes");
        assert_eq!(entries[3].child("LEDGERNAME").unwrap().text, "igst");

        let net: rust_decimal::Decimal = amounts.iter().map(|a| a.parse::<rust_decimal::Decimal>().unwrap()).sum();
        assert!(net.is_zero());
    }

    #[test]
    fn test_voucher_check_envelope_filters_by_remote_id() {
        let xml = envelope::voucher_exists("Acme", "rid-42").unwrap();
        let root = response::parse(&xml).unwrap();
        let formula = root.find_first("SYSTEM").unwrap();
        assert_eq!(formula.attr("NAME"), Some("FilterByRemoteID"));
        assert_eq!(formula.trimmed_text(), "$RemoteID = \"rid-42\"");
        assert_eq!(
            root.find_first("SVCURRENTCOMPANY").unwrap().text,
            "Acme"
        );
    }

    #[test]
    fn test_voucher_check_rejects_quoted_remote_id() {
        let err = envelope::voucher_exists("Acme", "rid\" or \"1\" = \"1").unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
    }

    #[test]
    fn test_company_list_envelope() {
        let xml = envelope::list_companies().unwrap();
        let root = response::parse(&xml).unwrap();
        assert_eq!(
            root.path(&["HEADER", "ID"]).unwrap().text,
            "List of Companies"
        );
        assert_eq!(
            root.find_first("COLLECTION").unwrap().attr("ISINITIALIZE"),
            Some("Yes")
        );
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = TallyClient::new(
            "http://localhost:9000/",
            Duration::from_secs(2),
            Duration::from_secs(30),
        )
        .unwrap();
        assert_eq!(client.url(), "http://localhost:9000");
    }
}
