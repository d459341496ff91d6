//! Owns the running agent and swaps it when the operator picks another company

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::adapters::{AccountingClient, BackendApi, BackendClient, TallyClient};
use crate::config::{AppConfig, SyncConfig};
use crate::domain::CycleReport;
use crate::error::{Result, SyncError};
use crate::services::agent::SyncAgent;
use crate::services::events::EventSink;
use crate::services::scheduler::SyncScheduler;
use crate::state::{StateStore, NO_COMPANIES_PLACEHOLDER};

pub struct AgentSupervisor {
    sync: SyncConfig,
    tally: Arc<dyn AccountingClient>,
    backend: Arc<dyn BackendApi>,
    store: StateStore,
    events: EventSink,
    current: Mutex<SyncScheduler>,
}

impl AgentSupervisor {
    pub fn new(
        company: impl Into<String>,
        sync: SyncConfig,
        tally: Arc<dyn AccountingClient>,
        backend: Arc<dyn BackendApi>,
        store: StateStore,
        events: EventSink,
    ) -> Self {
        let agent = SyncAgent::new(
            company,
            sync.clone(),
            Arc::clone(&tally),
            Arc::clone(&backend),
            events.clone(),
        );
        Self {
            sync,
            tally,
            backend,
            store,
            events,
            current: Mutex::new(SyncScheduler::new(Arc::new(agent))),
        }
    }

    /// Wire real clients; a persisted company choice beats `tally.company`
    pub fn from_config(config: &AppConfig, store: StateStore) -> Result<Self> {
        let tally = Arc::new(TallyClient::from_config(&config.tally)?);
        let backend = Arc::new(BackendClient::from_config(&config.backend)?);
        let company = store
            .selected_company()
            .unwrap_or_else(|| config.tally.company.clone());
        info!(company = %company, "Using company");

        Ok(Self::new(
            company,
            config.sync.clone(),
            tally,
            backend,
            store,
            EventSink::default(),
        ))
    }

    pub fn events(&self) -> &EventSink {
        &self.events
    }

    pub async fn company(&self) -> String {
        self.current.lock().await.agent().company().to_string()
    }

    pub async fn is_running(&self) -> bool {
        self.current.lock().await.is_running()
    }

    pub async fn start(&self) {
        self.current.lock().await.start();
    }

    /// Stop ticking and wait for the in-flight cycle
    pub async fn stop(&self) {
        self.current.lock().await.shutdown().await;
    }

    /// One cycle outside the schedule
    pub async fn run_once(&self) -> CycleReport {
        let agent = Arc::clone(self.current.lock().await.agent());
        agent.run_cycle().await
    }

    pub async fn list_companies(&self) -> Vec<String> {
        let agent = Arc::clone(self.current.lock().await.agent());
        agent.list_companies().await
    }

    /// Persist `company` and restart the agent against it
    pub async fn switch_company(&self, company: &str) -> Result<()> {
        let company = company.trim();
        if company.is_empty() || company == NO_COMPANIES_PLACEHOLDER {
            return Err(SyncError::Validation(format!(
                "'{}' is not a selectable company",
                company
            )));
        }

        let mut current = self.current.lock().await;
        current.shutdown().await;
        self.store.save_company(company)?;

        let agent = SyncAgent::new(
            company,
            self.sync.clone(),
            Arc::clone(&self.tally),
            Arc::clone(&self.backend),
            self.events.clone(),
        );
        *current = SyncScheduler::new(Arc::new(agent));
        self.events
            .info(format!("Switched to company '{}'", company));
        current.start();
        Ok(())
    }
}
