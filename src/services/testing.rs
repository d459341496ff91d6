//! In-memory Tally and backend doubles for service tests

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use crate::adapters::tally::envelope;
use crate::adapters::{AccountingClient, BackendApi};
use crate::domain::{PendingDocument, PendingItem, SyncStatus};
use crate::error::{Result, SyncError};

pub const CREATED: &str =
    "<RESPONSE><CREATED>1</CREATED><ALTERED>0</ALTERED><ERRORS>0</ERRORS></RESPONSE>";
pub const UNCHANGED: &str = "<RESPONSE><CREATED>0</CREATED><ERRORS>0</ERRORS></RESPONSE>";

pub fn rejected(line_error: &str) -> String {
    format!(
        "<RESPONSE><CREATED>0</CREATED><ERRORS>1</ERRORS><LINEERROR>{}</LINEERROR></RESPONSE>",
        line_error
    )
}

pub struct FakeTally {
    pub up: AtomicBool,
    pub exists: AtomicBool,
    /// Per-ledger queued responses; `CREATED` once the queue is empty
    pub ledger_responses: Mutex<HashMap<String, VecDeque<String>>>,
    pub voucher_response: Mutex<String>,
    pub companies: Mutex<Option<Vec<String>>>,
    /// Calls in order: `ledger:<name>:<group>`, `voucher:<remote id>`, `exists:<remote id>`
    pub calls: Mutex<Vec<String>>,
    pub envelopes: Mutex<Vec<String>>,
}

impl Default for FakeTally {
    fn default() -> Self {
        Self {
            up: AtomicBool::new(true),
            exists: AtomicBool::new(true),
            ledger_responses: Mutex::new(HashMap::new()),
            voucher_response: Mutex::new(CREATED.to_string()),
            companies: Mutex::new(Some(vec!["Test Company".to_string()])),
            calls: Mutex::new(Vec::new()),
            envelopes: Mutex::new(Vec::new()),
        }
    }
}

impl FakeTally {
    pub fn queue_ledger(&self, name: &str, response: &str) {
        self.ledger_responses
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .push_back(response.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AccountingClient for FakeTally {
    async fn probe(&self) -> bool {
        self.up.load(Ordering::SeqCst)
    }

    async fn list_companies(&self) -> Result<Vec<String>> {
        self.companies
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| SyncError::Xml("empty document".to_string()))
    }

    async fn create_ledger(&self, company: &str, name: &str, group: &str) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("ledger:{}:{}", name, group));
        self.envelopes
            .lock()
            .unwrap()
            .push(envelope::create_ledger(company, name, group)?);
        let queued = self
            .ledger_responses
            .lock()
            .unwrap()
            .get_mut(name)
            .and_then(|q| q.pop_front());
        Ok(queued.unwrap_or_else(|| CREATED.to_string()))
    }

    async fn alter_voucher(&self, company: &str, document: &PendingDocument) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("voucher:{}", document.remote_id));
        self.envelopes
            .lock()
            .unwrap()
            .push(envelope::alter_sales_voucher(company, document)?);
        Ok(self.voucher_response.lock().unwrap().clone())
    }

    async fn voucher_exists(&self, _company: &str, remote_id: &str) -> Result<bool> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("exists:{}", remote_id));
        Ok(self.exists.load(Ordering::SeqCst))
    }
}

#[derive(Default)]
pub struct FakeBackend {
    pub pending: Mutex<Vec<PendingItem>>,
    pub fetch_status: Mutex<Option<u16>>,
    pub fail_reports: AtomicBool,
    pub fetches: Mutex<usize>,
    /// Per-fetch latency, consumed in order; instant once empty
    pub fetch_delays: Mutex<VecDeque<Duration>>,
    pub fetch_started: Mutex<Vec<Instant>>,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub reports: Mutex<Vec<(String, SyncStatus, String)>>,
}

impl FakeBackend {
    pub fn with_items(items: Vec<PendingItem>) -> Self {
        Self {
            pending: Mutex::new(items),
            ..Default::default()
        }
    }

    pub fn reports(&self) -> Vec<(String, SyncStatus, String)> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl BackendApi for FakeBackend {
    async fn fetch_pending(&self) -> Result<Vec<PendingItem>> {
        *self.fetches.lock().unwrap() += 1;
        self.fetch_started.lock().unwrap().push(Instant::now());
        let concurrent = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(concurrent, Ordering::SeqCst);
        let delay = self.fetch_delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(status) = *self.fetch_status.lock().unwrap() {
            return Err(SyncError::Backend {
                status,
                body: "unauthorized".to_string(),
            });
        }
        Ok(self.pending.lock().unwrap().clone())
    }

    async fn report_status(&self, id: &str, status: SyncStatus, message: &str) -> Result<()> {
        if self.fail_reports.load(Ordering::SeqCst) {
            return Err(SyncError::Backend {
                status: 503,
                body: "down".to_string(),
            });
        }
        self.reports
            .lock()
            .unwrap()
            .push((id.to_string(), status, message.to_string()));
        Ok(())
    }
}

/// Queue entry for the reference invoice: 100 + 50 on one sales ledger, igst 27
pub fn sample_item(id: &str) -> PendingItem {
    PendingItem {
        id: id.to_string(),
        kind: Some("SALES".to_string()),
        status: Some(SyncStatus::Pending),
        data: Some(serde_json::json!({
            "invoiceId": format!("remote-{}", id),
            "invoiceNo": format!("INV-{}", id),
            "invoiceDate": "20240401",
            "party": { "name": "Acme Retail" },
            "items": [
                { "ledgerName": "Sales 18%", "amount": 100.00 },
                { "ledgerName": "Sales 18%", "amount": 50.00 }
            ],
            "taxes": { "igst": 27.00 },
            "narration": "Test order"
        })),
    }
}
