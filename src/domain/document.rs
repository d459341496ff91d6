use rust_decimal::{Decimal, RoundingStrategy};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::error::{Result, SyncError};

/// Sync lifecycle of a queued document as tracked by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SyncStatus {
    Pending,
    Success,
    Failed,
}

impl SyncStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncStatus::Success | SyncStatus::Failed)
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::Pending => write!(f, "PENDING"),
            SyncStatus::Success => write!(f, "SUCCESS"),
            SyncStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// Queue entry returned by `GET /api/sync/pending`
///
/// `data` is kept raw so a malformed document can still be reported back
/// against its `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingItem {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub status: Option<SyncStatus>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl PendingItem {
    /// Human-facing reference used in log lines
    pub fn reference(&self) -> String {
        self.data
            .as_ref()
            .and_then(|d| d.get("invoiceNo").or_else(|| d.get("documentNumber")))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("ID-{}", self.id))
    }

    /// Decode and validate the document payload
    pub fn document(&self) -> Result<PendingDocument> {
        let data = self
            .data
            .clone()
            .ok_or_else(|| SyncError::Validation("document data is missing".to_string()))?;
        let document: PendingDocument = serde_json::from_value(data)
            .map_err(|e| SyncError::Validation(format!("document data is malformed: {}", e)))?;
        document.validate()?;
        Ok(document)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Party {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    #[serde(default, deserialize_with = "null_as_default")]
    pub ledger_name: String,
    pub amount: Decimal,
}

/// Sales invoice as sent by the backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingDocument {
    #[serde(rename = "invoiceId", alias = "remoteId", default, deserialize_with = "null_as_default")]
    pub remote_id: String,
    #[serde(rename = "invoiceNo", alias = "documentNumber", default, deserialize_with = "null_as_default")]
    pub document_number: String,
    #[serde(rename = "invoiceDate", alias = "date", default, deserialize_with = "null_as_default")]
    pub date: String,
    #[serde(default)]
    pub narration: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub party: Party,
    #[serde(rename = "items", alias = "lineItems", default, deserialize_with = "null_as_default")]
    pub line_items: Vec<LineItem>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub taxes: TaxLines,
}

/// Explicit `null` decodes like a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Tax ledger amounts in the order the backend sent them
///
/// Wire form is a JSON object keyed by ledger name; a repeated key keeps
/// its first position and its last amount.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaxLines(Vec<(String, Decimal)>);

impl TaxLines {
    pub fn insert(&mut self, ledger: impl Into<String>, amount: Decimal) {
        let ledger = ledger.into();
        match self.0.iter_mut().find(|(name, _)| *name == ledger) {
            Some(entry) => entry.1 = amount,
            None => self.0.push((ledger, amount)),
        }
    }

    pub fn get(&self, ledger: &str) -> Option<Decimal> {
        self.0
            .iter()
            .find(|(name, _)| name == ledger)
            .map(|(_, amount)| *amount)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Decimal)> {
        self.0.iter().map(|(name, amount)| (name.as_str(), *amount))
    }
}

impl<S: Into<String>> FromIterator<(S, Decimal)> for TaxLines {
    fn from_iter<I: IntoIterator<Item = (S, Decimal)>>(iter: I) -> Self {
        let mut lines = TaxLines::default();
        for (ledger, amount) in iter {
            lines.insert(ledger, amount);
        }
        lines
    }
}

impl Serialize for TaxLines {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (ledger, amount) in &self.0 {
            map.serialize_entry(ledger, amount)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for TaxLines {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct TaxLinesVisitor;

        impl<'de> Visitor<'de> for TaxLinesVisitor {
            type Value = TaxLines;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of tax ledger name to amount")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<TaxLines, A::Error> {
                let mut lines = TaxLines::default();
                while let Some((ledger, amount)) = access.next_entry::<String, Decimal>()? {
                    lines.insert(ledger, amount);
                }
                Ok(lines)
            }
        }

        deserializer.deserialize_map(TaxLinesVisitor)
    }
}

impl PendingDocument {
    pub fn validate(&self) -> Result<()> {
        if self.party.name.trim().is_empty() {
            return Err(SyncError::Validation("party name is missing".to_string()));
        }
        if self.remote_id.trim().is_empty() {
            return Err(SyncError::Validation("remote id is missing".to_string()));
        }
        if let Some(pos) = self
            .line_items
            .iter()
            .position(|i| i.ledger_name.trim().is_empty())
        {
            return Err(SyncError::Validation(format!(
                "line item {} has no ledger name",
                pos + 1
            )));
        }
        if self.taxes.iter().any(|(k, _)| k.trim().is_empty()) {
            return Err(SyncError::Validation("tax ledger name is empty".to_string()));
        }
        // The verification query embeds the id in a quoted TDL literal
        if self.remote_id.contains('"') {
            return Err(SyncError::Validation(
                "remote id must not contain '\"'".to_string(),
            ));
        }
        self.total()?;
        Ok(())
    }

    /// Distinct line-item ledger names in first-seen order
    pub fn line_ledgers(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for item in &self.line_items {
            if !seen.contains(&item.ledger_name.as_str()) {
                seen.push(item.ledger_name.as_str());
            }
        }
        seen
    }

    pub fn tax_ledgers(&self) -> impl Iterator<Item = &str> {
        self.taxes.iter().map(|(name, _)| name)
    }

    /// Invoice total: items plus taxes, each entry at 2 dp
    pub fn total(&self) -> Result<Decimal> {
        self.line_items
            .iter()
            .map(|i| i.amount)
            .chain(self.taxes.iter().map(|(_, amount)| amount))
            .map(round_amount)
            .try_fold(Decimal::ZERO, |acc, amount| acc.checked_add(amount))
            .ok_or_else(|| SyncError::Validation("amounts overflow".to_string()))
    }

    /// Amount booked against the party ledger (negated total)
    pub fn party_amount(&self) -> Result<Decimal> {
        Ok(-self.total()?)
    }
}

/// Round to paise the way the invoice was totalled upstream (half away from zero)
pub fn round_amount(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Plain decimal text with exactly two places
pub fn format_amount(amount: Decimal) -> String {
    format!("{:.2}", round_amount(amount))
}
