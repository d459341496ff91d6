pub mod backend;
pub mod tally;

pub use backend::{BackendApi, BackendClient, AGENT_KEY_HEADER};
pub use tally::{AccountingClient, TallyClient, HANDSHAKE};
