//! Tally reachability gate
//!
//! A cycle only starts when Tally answers its handshake. The monitor keeps
//! the last observed state so that transitions are logged once instead of
//! on every tick.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::info;

use crate::adapters::AccountingClient;

const UNKNOWN: u8 = 0;
const UP: u8 = 1;
const DOWN: u8 = 2;

pub struct ConnectionMonitor {
    client: Arc<dyn AccountingClient>,
    last: AtomicU8,
}

impl ConnectionMonitor {
    pub fn new(client: Arc<dyn AccountingClient>) -> Self {
        Self {
            client,
            last: AtomicU8::new(UNKNOWN),
        }
    }

    /// True only when Tally returned the exact handshake string
    pub async fn probe(&self) -> bool {
        let up = self.client.probe().await;
        let now = if up { UP } else { DOWN };
        let before = self.last.swap(now, Ordering::SeqCst);
        if before != now && before != UNKNOWN {
            if up {
                info!("Tally is reachable again");
            } else {
                info!("Tally stopped answering the handshake");
            }
        }
        up
    }
}
