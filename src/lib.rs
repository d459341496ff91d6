pub mod adapters;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod state;

pub use adapters::{AccountingClient, BackendApi, BackendClient, TallyClient};
pub use config::AppConfig;
pub use domain::{AgentEvent, CycleReport, PendingDocument, PendingItem, SyncStatus};
pub use error::{Result, SyncError};
pub use services::{AgentSupervisor, EventSink, StatusBoard, StatusServer, SyncAgent, SyncScheduler};
pub use state::{AppState, StateStore};
