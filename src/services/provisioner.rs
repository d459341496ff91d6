//! Ledger (master data) provisioning
//!
//! Tally rejects a voucher that references an unknown ledger, so every
//! ledger a document touches is created first. Creation is requested
//! unconditionally: Tally answers "0 created, 0 errors" for a ledger that
//! already exists, which counts as success.

use std::sync::Arc;

use crate::adapters::AccountingClient;
use crate::config::SyncConfig;
use crate::domain::{Outcome, PendingDocument};
use crate::error::Result;
use crate::services::classifier::classify_raw;
use crate::services::events::EventSink;

/// Account groups new ledgers are created under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerGroups {
    pub party: String,
    pub income: String,
    pub tax: String,
}

impl From<&SyncConfig> for LedgerGroups {
    fn from(config: &SyncConfig) -> Self {
        Self {
            party: config.party_group.clone(),
            income: config.income_group.clone(),
            tax: config.tax_group.clone(),
        }
    }
}

pub struct MasterDataProvisioner {
    client: Arc<dyn AccountingClient>,
    company: String,
    groups: LedgerGroups,
    events: EventSink,
}

impl MasterDataProvisioner {
    pub fn new(
        client: Arc<dyn AccountingClient>,
        company: String,
        groups: LedgerGroups,
        events: EventSink,
    ) -> Self {
        Self {
            client,
            company,
            groups,
            events,
        }
    }

    /// Create `name` under `group` unless it already exists
    ///
    /// `Err` only for transport failures; a rejection is a failed `Outcome`.
    pub async fn ensure_ledger(&self, name: &str, group: &str) -> Result<Outcome> {
        let raw = self.client.create_ledger(&self.company, name, group).await?;
        Ok(classify_raw(&raw))
    }

    /// Ensure party, line-item and tax ledgers in that order
    ///
    /// Stops at the first failure. Ledgers created before the failure are
    /// left in place; the next attempt treats them as existing.
    pub async fn ensure_for(&self, doc: &PendingDocument) -> Result<Outcome> {
        let mut wanted: Vec<(&str, &str, &str)> = Vec::new();
        wanted.push(("Party", doc.party.name.as_str(), self.groups.party.as_str()));
        for ledger in doc.line_ledgers() {
            wanted.push(("Item", ledger, self.groups.income.as_str()));
        }
        for ledger in doc.tax_ledgers() {
            wanted.push(("Tax", ledger, self.groups.tax.as_str()));
        }

        for (role, name, group) in wanted {
            let outcome = self.ensure_ledger(name, group).await?;
            if !outcome.success {
                self.events.error(
                    format!("Failed to create {} Ledger '{}'", role, name),
                    outcome.message.clone(),
                );
                return Ok(Outcome::failure(format!(
                    "Master ledger creation failed: Ledger [{}]: {}",
                    name, outcome.message
                )));
            }
        }
        Ok(Outcome::success("Masters ready"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{rejected, sample_item, FakeTally, CREATED, UNCHANGED};

    fn provisioner(tally: &Arc<FakeTally>) -> MasterDataProvisioner {
        MasterDataProvisioner::new(
            Arc::clone(tally) as Arc<dyn AccountingClient>,
            "Test Company".to_string(),
            LedgerGroups::from(&SyncConfig::default()),
            EventSink::default(),
        )
    }

    #[tokio::test]
    async fn test_ensure_ledger_is_idempotent() {
        let tally = Arc::new(FakeTally::default());
        tally.queue_ledger("Acme Retail", CREATED);
        tally.queue_ledger("Acme Retail", UNCHANGED);
        let provisioner = provisioner(&tally);

        let first = provisioner
            .ensure_ledger("Acme Retail", "Sundry Debtors")
            .await
            .unwrap();
        let second = provisioner
            .ensure_ledger("Acme Retail", "Sundry Debtors")
            .await
            .unwrap();
        assert!(first.success);
        assert_eq!(first.message, "Created");
        assert!(second.success);
        assert_eq!(second.message, "Already exists");
    }

    #[tokio::test]
    async fn test_repeated_line_ledger_requested_once() {
        let tally = Arc::new(FakeTally::default());
        let doc = sample_item("1").document().unwrap();

        let outcome = provisioner(&tally).ensure_for(&doc).await.unwrap();
        assert!(outcome.success);
        assert_eq!(
            tally.calls(),
            vec![
                "ledger:Acme Retail:Sundry Debtors",
                "ledger:Sales 18%:Sales Accounts",
                "ledger:igst:Duties & Taxes",
            ]
        );
    }

    #[tokio::test]
    async fn test_party_failure_stops_everything() {
        let tally = Arc::new(FakeTally::default());
        tally.queue_ledger("Acme Retail", &rejected("Name already used by a Group"));
        let doc = sample_item("1").document().unwrap();

        let outcome = provisioner(&tally).ensure_for(&doc).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(
            outcome.message,
            "Master ledger creation failed: Ledger [Acme Retail]: Name already used by a Group"
        );
        assert_eq!(tally.calls().len(), 1);
    }
}
