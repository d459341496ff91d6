//! Persisted agent state
//!
//! Only the selected company survives restarts. The file lives under the
//! platform data directory as `tally-sync/app-state.json`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{Result, SyncError};

/// Shown by pickers when Tally returns no companies; never persisted
pub const NO_COMPANIES_PLACEHOLDER: &str = "No Companies Found (Is Tally Open?)";

const APP_DIR: &str = "tally-sync";
const STATE_FILE: &str = "app-state.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_company: Option<String>,
}

pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store under the user's data directory
    pub fn default_location() -> Result<Self> {
        let base = dirs::data_dir()
            .ok_or_else(|| SyncError::Internal("no user data directory on this platform".into()))?;
        Ok(Self::new(base.join(APP_DIR).join(STATE_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or unreadable state is treated as empty
    pub fn load(&self) -> AppState {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return AppState::default(),
            Err(e) => {
                warn!("Cannot read {}: {}", self.path.display(), e);
                return AppState::default();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!("Ignoring corrupt {}: {}", self.path.display(), e);
            AppState::default()
        })
    }

    pub fn save(&self, state: &AppState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_vec_pretty(state)?)?;
        Ok(())
    }

    /// Persist a company choice; returns false for names that must not be kept
    pub fn save_company(&self, company: &str) -> Result<bool> {
        let company = company.trim();
        if company.is_empty() || company == NO_COMPANIES_PLACEHOLDER {
            return Ok(false);
        }
        let mut state = self.load();
        state.selected_company = Some(company.to_string());
        self.save(&state)?;
        Ok(true)
    }

    pub fn selected_company(&self) -> Option<String> {
        self.load().selected_company
    }
}
