//! One reconciliation cycle
//!
//! Probe Tally, pull the pending queue, and push each document through
//! ledger provisioning, voucher submission and read-back verification.
//! Every document that gets past the probe ends the cycle in a terminal
//! state on the backend, unless the cycle itself is aborted by a transport
//! failure, in which case it stays PENDING and is retried next tick.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::{AccountingClient, BackendApi};
use crate::config::SyncConfig;
use crate::domain::{CycleReport, PendingItem, SyncStatus};
use crate::error::{Result, SyncError};
use crate::services::events::EventSink;
use crate::services::health::ConnectionMonitor;
use crate::services::provisioner::{LedgerGroups, MasterDataProvisioner};
use crate::services::reporter::StatusReporter;
use crate::services::submission::{VoucherSubmitter, NOT_FOUND_AFTER_SUBMIT, VERIFIED};

pub struct SyncAgent {
    company: String,
    config: SyncConfig,
    tally: Arc<dyn AccountingClient>,
    backend: Arc<dyn BackendApi>,
    monitor: ConnectionMonitor,
    provisioner: MasterDataProvisioner,
    submitter: VoucherSubmitter,
    reporter: StatusReporter,
    events: EventSink,
}

impl SyncAgent {
    pub fn new(
        company: impl Into<String>,
        config: SyncConfig,
        tally: Arc<dyn AccountingClient>,
        backend: Arc<dyn BackendApi>,
        events: EventSink,
    ) -> Self {
        let company = company.into();
        Self {
            monitor: ConnectionMonitor::new(Arc::clone(&tally)),
            provisioner: MasterDataProvisioner::new(
                Arc::clone(&tally),
                company.clone(),
                LedgerGroups::from(&config),
                events.clone(),
            ),
            submitter: VoucherSubmitter::new(Arc::clone(&tally), company.clone()),
            reporter: StatusReporter::new(Arc::clone(&backend), events.clone()),
            company,
            config,
            tally,
            backend,
            events,
        }
    }

    pub fn company(&self) -> &str {
        &self.company
    }

    pub fn events(&self) -> &EventSink {
        &self.events
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.config.polling_interval_ms)
    }

    /// Company names open in Tally; empty when Tally cannot be asked
    pub async fn list_companies(&self) -> Vec<String> {
        self.events.info("Fetching company list from Tally...");
        match self.tally.list_companies().await {
            Ok(names) => {
                if names.is_empty() {
                    self.events
                        .warning("Received response with no companies from Tally.");
                }
                names
            }
            Err(e) => {
                self.events.error("Failed to fetch companies", e.to_string());
                Vec::new()
            }
        }
    }

    /// Run one cycle to completion and publish its report
    pub async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport {
            started_at: Some(Utc::now()),
            ..Default::default()
        };

        if let Err(e) = self.cycle(&mut report).await {
            report.aborted = true;
            if e.is_connectivity() {
                // Expected while Tally or the backend restarts
                self.events
                    .debug(format!("Connection refused (Backend/Tally): {}", e));
            } else {
                self.events.error(format!("Critical Error: {}", e), format!("{:?}", e));
            }
        }

        report.finished_at = Some(Utc::now());
        self.events.cycle_completed(report.clone());
        report
    }

    async fn cycle(&self, report: &mut CycleReport) -> Result<()> {
        let tally_up = self.monitor.probe().await;
        report.tally_reachable = tally_up;
        self.events.connection(tally_up, None);
        if !tally_up {
            self.events
                .warning("Tally Server is not reachable. Is Tally Open?");
            return Ok(());
        }

        let items = match self.backend.fetch_pending().await {
            Ok(items) => items,
            Err(e) => {
                report.backend_reachable = Some(false);
                self.events.connection(true, Some(false));
                if let SyncError::Backend { status, .. } = &e {
                    report.aborted = true;
                    self.events.error(
                        format!("Backend Connection Failed: HTTP {}", status),
                        e.to_string(),
                    );
                    return Ok(());
                }
                return Err(e);
            }
        };
        report.backend_reachable = Some(true);
        self.events.connection(true, Some(true));

        report.fetched = items.len();
        if items.is_empty() {
            return Ok(());
        }
        self.events
            .info(format!("Found {} new invoices to sync.", items.len()));

        for item in &items {
            if item.status.is_some_and(|s| s.is_terminal()) {
                self.events.debug(format!(
                    "Skipping item {} already marked {}",
                    item.id,
                    item.status.map(|s| s.to_string()).unwrap_or_default()
                ));
                continue;
            }
            match self.process_item(item).await? {
                SyncStatus::Success => report.succeeded += 1,
                _ => report.failed += 1,
            }
        }
        Ok(())
    }

    /// Drive one document to a terminal status and report it
    ///
    /// `Err` only for transport failures, which leave the document PENDING.
    pub async fn process_item(&self, item: &PendingItem) -> Result<SyncStatus> {
        let reference = item.reference();
        self.events
            .info(format!("Processing Invoice #{}...", reference));

        let doc = match item.document() {
            Ok(doc) => doc,
            Err(e) => {
                let reason = match e {
                    SyncError::Validation(msg) => msg,
                    other => other.to_string(),
                };
                let message = format!("Invalid data: {}", reason);
                self.events.error(
                    format!("Invoice #{} Failed: Invalid Data", reference),
                    message.clone(),
                );
                self.reporter
                    .report(&item.id, SyncStatus::Failed, message)
                    .await;
                return Ok(SyncStatus::Failed);
            }
        };

        let masters = self.provisioner.ensure_for(&doc).await?;
        if !masters.success {
            self.events.error(
                format!(
                    "Invoice #{} Failed: Could not create required Ledgers.",
                    reference
                ),
                masters.message.clone(),
            );
            self.reporter
                .report(&item.id, SyncStatus::Failed, masters.message)
                .await;
            return Ok(SyncStatus::Failed);
        }
        pause(self.config.ledger_index_delay_ms).await;

        let submitted = self.submitter.submit(&doc).await?;
        let (status, message) = if !submitted.success {
            self.events.error(
                format!("Invoice #{} rejected by Tally.", reference),
                submitted.message.clone(),
            );
            (SyncStatus::Failed, submitted.message)
        } else {
            self.events
                .info(format!("Verifying Invoice #{} in Tally...", reference));
            pause(self.config.voucher_index_delay_ms).await;
            if self.submitter.verify(&doc.remote_id).await? {
                self.events
                    .success(format!("Invoice #{} synced and verified.", reference));
                (SyncStatus::Success, VERIFIED.to_string())
            } else {
                self.events.error(
                    format!("Invoice #{} not found in Tally after submit.", reference),
                    NOT_FOUND_AFTER_SUBMIT,
                );
                (SyncStatus::Failed, NOT_FOUND_AFTER_SUBMIT.to_string())
            }
        };

        self.reporter.report(&item.id, status, message).await;
        Ok(status)
    }
}

/// Give Tally time to index what was just imported
async fn pause(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}
