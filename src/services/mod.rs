pub mod agent;
pub mod classifier;
pub mod events;
pub mod health;
pub mod provisioner;
pub mod reporter;
pub mod scheduler;
pub mod status_server;
pub mod submission;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod testing;

pub use agent::SyncAgent;
pub use classifier::{classify, classify_raw, ImportSummary};
pub use events::EventSink;
pub use health::ConnectionMonitor;
pub use provisioner::{LedgerGroups, MasterDataProvisioner};
pub use reporter::StatusReporter;
pub use scheduler::SyncScheduler;
pub use status_server::{HealthResponse, HealthStatus, StatusBoard, StatusServer};
pub use submission::VoucherSubmitter;
pub use supervisor::AgentSupervisor;
