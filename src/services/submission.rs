//! Voucher submission and read-back verification
//!
//! Tally's import acknowledgement is not proof that the voucher was stored,
//! so every accepted submission is followed by an export filtered on the
//! voucher's remote id.

use std::sync::Arc;

use crate::adapters::AccountingClient;
use crate::domain::{Outcome, PendingDocument};
use crate::error::Result;
use crate::services::classifier::classify_raw;

pub const VERIFIED: &str = "Verified: Created Successfully";
pub const NOT_FOUND_AFTER_SUBMIT: &str =
    "Verification failed: voucher submitted but not found on re-query";

pub struct VoucherSubmitter {
    client: Arc<dyn AccountingClient>,
    company: String,
}

impl VoucherSubmitter {
    pub fn new(client: Arc<dyn AccountingClient>, company: String) -> Self {
        Self { client, company }
    }

    /// Create or alter the voucher keyed by `doc.remote_id`
    pub async fn submit(&self, doc: &PendingDocument) -> Result<Outcome> {
        let raw = self.client.alter_voucher(&self.company, doc).await?;
        Ok(classify_raw(&raw))
    }

    /// Is a voucher with this remote id stored in the company?
    pub async fn verify(&self, remote_id: &str) -> Result<bool> {
        self.client.voucher_exists(&self.company, remote_id).await
    }
}
