//! Import response classification
//!
//! Tally reports the effect of an import through counters (`CREATED`,
//! `ALTERED`, `ERRORS`, ...) plus optional `LINEERROR` / `JHERROR` text.
//! Where those counters sit depends on the request type, so the response is
//! first normalized into an [`ImportSummary`] and only then classified.

use crate::adapters::tally::response::{self, XmlNode};
use crate::domain::Outcome;

pub const NO_RESPONSE: &str = "No response from accounting system";
pub const REJECTED: &str = "Rejected by accounting system";

/// Normalized import result
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub created: Option<u32>,
    pub altered: Option<u32>,
    pub errors: Option<u32>,
    pub line_errors: Vec<String>,
    pub system_errors: Vec<String>,
}

impl ImportSummary {
    /// Parse a raw response body; `None` when there is nothing to classify
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.trim().is_empty() {
            return None;
        }
        let root = response::parse(raw).ok()?;
        Some(Self::from_root(&root))
    }

    /// Search order for the result block:
    /// 1. `ENVELOPE/BODY/IMPORTDATA/IMPORTRESULT`
    /// 2. `ENVELOPE/BODY/DATA/IMPORTRESULT`
    /// 3. a bare `RESPONSE` root
    /// 4. anywhere in the document
    pub fn from_root(root: &XmlNode) -> Self {
        let scope = if root.name == "ENVELOPE" {
            root.path(&["BODY", "IMPORTDATA", "IMPORTRESULT"])
                .or_else(|| root.path(&["BODY", "DATA", "IMPORTRESULT"]))
        } else if root.name == "RESPONSE" {
            Some(root)
        } else {
            None
        };

        let counter = |name: &str| -> Option<u32> {
            scope
                .and_then(|s| s.child(name))
                .or_else(|| root.find_first(name))
                .and_then(|n| n.trimmed_text().parse().ok())
        };

        let texts = |name: &str| -> Vec<String> {
            let mut found: Vec<&XmlNode> = scope
                .map(|s| s.children_named(name).collect())
                .unwrap_or_default();
            if found.is_empty() {
                root.find_all(name, &mut found);
            }
            found
                .into_iter()
                .map(|n| n.trimmed_text().to_string())
                .filter(|t| !t.is_empty())
                .collect()
        };

        Self {
            created: counter("CREATED"),
            altered: counter("ALTERED"),
            errors: counter("ERRORS"),
            line_errors: texts("LINEERROR"),
            system_errors: texts("JHERROR"),
        }
    }

    fn error_message(&self) -> String {
        if !self.line_errors.is_empty() {
            self.line_errors.join("; ")
        } else if !self.system_errors.is_empty() {
            format!("System error: {}", self.system_errors.join("; "))
        } else {
            REJECTED.to_string()
        }
    }
}

/// Turn a (possibly missing) import result into an outcome
///
/// 1. one record created → success
/// 2. nothing created and no errors → success (record already existed)
/// 3. anything else → failure with the most specific error text available
pub fn classify(summary: Option<&ImportSummary>) -> Outcome {
    let Some(summary) = summary else {
        return Outcome::failure(NO_RESPONSE);
    };

    match (summary.created, summary.errors) {
        (Some(1), _) => Outcome::success("Created"),
        (Some(0), Some(0)) => Outcome::success(match summary.altered {
            Some(n) if n > 0 => "Altered",
            _ => "Already exists",
        }),
        _ => Outcome::failure(summary.error_message()),
    }
}

/// Parse and classify a raw response body in one step
pub fn classify_raw(raw: &str) -> Outcome {
    classify(ImportSummary::parse(raw).as_ref())
}
