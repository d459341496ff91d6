use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use url::Url;

use crate::error::{Result, SyncError};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub tally: TallyConfig,
    pub backend: BackendConfig,
    pub sync: SyncConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Status server port (disabled when unset)
    #[serde(default)]
    pub status_port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TallyConfig {
    /// TallyPrime HTTP endpoint (e.g., "http://localhost:9000")
    pub url: String,
    /// Company all imports are scoped to
    pub company: String,
    /// Timeout for the liveness probe in milliseconds
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,
    /// Timeout for import/export requests in milliseconds
    #[serde(default = "default_tally_timeout")]
    pub request_timeout_ms: u64,
}

fn default_probe_timeout() -> u64 {
    2000
}

fn default_tally_timeout() -> u64 {
    30_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Coordination service base URL
    pub url: String,
    /// Pre-shared key sent as `x-tally-agent-key`
    #[serde(default)]
    pub agent_key: String,
    /// Timeout for backend requests in milliseconds
    #[serde(default = "default_backend_timeout")]
    pub request_timeout_ms: u64,
}

fn default_backend_timeout() -> u64 {
    15_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Interval between reconciliation cycles in milliseconds
    #[serde(default = "default_polling_interval")]
    pub polling_interval_ms: u64,
    /// Pause after master creation so Tally can index new ledgers
    #[serde(default = "default_ledger_delay")]
    pub ledger_index_delay_ms: u64,
    /// Pause between voucher import and the verification query
    #[serde(default = "default_voucher_delay")]
    pub voucher_index_delay_ms: u64,
    #[serde(default = "default_party_group")]
    pub party_group: String,
    #[serde(default = "default_income_group")]
    pub income_group: String,
    #[serde(default = "default_tax_group")]
    pub tax_group: String,
}

fn default_polling_interval() -> u64 {
    5000
}

fn default_ledger_delay() -> u64 {
    500
}

fn default_voucher_delay() -> u64 {
    1000
}

fn default_party_group() -> String {
    "Sundry Debtors".to_string()
}

fn default_income_group() -> String {
    "Sales Accounts".to_string()
}

fn default_tax_group() -> String {
    "Duties & Taxes".to_string()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            polling_interval_ms: default_polling_interval(),
            ledger_index_delay_ms: default_ledger_delay(),
            voucher_index_delay_ms: default_voucher_delay(),
            party_group: default_party_group(),
            income_group: default_income_group(),
            tax_group: default_tax_group(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for daily rolling log files
    #[serde(default)]
    pub dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Flat `config.json` written by older agent installs.
#[derive(Debug, Default, Deserialize)]
struct LegacyAgentConfig {
    backend_url: Option<String>,
    tally_url: Option<String>,
    tally_company: Option<String>,
    tally_agent_key: Option<String>,
    polling_interval: Option<u64>,
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> std::result::Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();
        let legacy = load_legacy(Path::new("config.json"));

        let builder = Config::builder()
            // Start with default values
            .set_default("tally.url", "http://localhost:9000")?
            .set_default("tally.company", "Test Company")?
            .set_default("backend.url", "http://localhost:3000")?
            .set_default("backend.agent_key", "")?
            .set_default("sync.polling_interval_ms", 5000)?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("TALLY_SYNC_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Legacy flat config.json from the working directory
            .set_override_option("backend.url", legacy.backend_url)?
            .set_override_option("tally.url", legacy.tally_url)?
            .set_override_option("tally.company", legacy.tally_company)?
            .set_override_option("backend.agent_key", legacy.tally_agent_key)?
            .set_override_option("sync.polling_interval_ms", legacy.polling_interval)?
            // Override with environment variables (TALLY_SYNC__TALLY__URL, etc.)
            .add_source(
                Environment::with_prefix("TALLY_SYNC")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Reject configurations the agent cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.backend.agent_key.trim().is_empty() {
            return Err(SyncError::Validation(
                "backend.agent_key is required".to_string(),
            ));
        }
        if self.sync.polling_interval_ms == 0 {
            return Err(SyncError::Validation(
                "sync.polling_interval_ms must be greater than zero".to_string(),
            ));
        }
        for (name, raw) in [("tally.url", &self.tally.url), ("backend.url", &self.backend.url)] {
            Url::parse(raw)
                .map_err(|e| SyncError::Validation(format!("{} is not a valid URL: {}", name, e)))?;
        }
        Ok(())
    }
}

fn load_legacy(path: &Path) -> LegacyAgentConfig {
    let Ok(raw) = std::fs::read_to_string(path) else {
        return LegacyAgentConfig::default();
    };
    match serde_json::from_str(&raw) {
        Ok(legacy) => {
            tracing::info!("Loaded legacy configuration from {}", path.display());
            legacy
        }
        Err(e) => {
            tracing::warn!("Ignoring unreadable {}: {}", path.display(), e);
            LegacyAgentConfig::default()
        }
    }
}
