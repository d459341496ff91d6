//! Periodic cycle driver
//!
//! A single task owns the ticker and runs each cycle inline, so two cycles
//! never overlap. A cycle that outlives the interval swallows the ticks it
//! missed instead of bursting afterwards.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::services::agent::SyncAgent;

type Worker = (watch::Sender<bool>, JoinHandle<()>);

pub struct SyncScheduler {
    agent: Arc<SyncAgent>,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<Worker>>,
}

impl SyncScheduler {
    pub fn new(agent: Arc<SyncAgent>) -> Self {
        Self {
            agent,
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    pub fn agent(&self) -> &Arc<SyncAgent> {
        &self.agent
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn worker(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start ticking; the first cycle runs immediately. No-op when running.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("Scheduler already running");
            return;
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let agent = Arc::clone(&self.agent);
        let running = Arc::clone(&self.running);
        let previous = self.worker().take();

        let handle = tokio::spawn(async move {
            // A stopped worker may still be finishing its last cycle
            if let Some((_, handle)) = previous {
                let _ = handle.await;
            }

            let period = agent.polling_interval();
            info!(
                company = agent.company(),
                interval_ms = period.as_millis() as u64,
                "Sync agent started"
            );
            agent
                .events()
                .info(format!("Sync Agent Started. Polling every {}ms", period.as_millis()));

            let mut tick = tokio::time::interval(period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = stop_rx.changed() => break,
                    _ = tick.tick() => {
                        if !running.load(Ordering::SeqCst) {
                            break;
                        }
                        agent.run_cycle().await;
                    }
                }
            }
            debug!(company = agent.company(), "Scheduler loop exited");
        });

        *self.worker() = Some((stop_tx, handle));
    }

    /// Request a stop; an in-flight cycle finishes first
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some((stop_tx, _)) = self.worker().as_ref() {
            let _ = stop_tx.send(true);
        }
        self.agent.events().info("Sync Agent Stopped.");
    }

    /// Stop and wait for the loop task to exit
    pub async fn shutdown(&self) {
        self.stop();
        let worker = self.worker().take();
        if let Some((_, handle)) = worker {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{AccountingClient, BackendApi};
    use crate::config::SyncConfig;
    use crate::domain::AgentEvent;
    use crate::services::events::EventSink;
    use crate::services::testing::{FakeBackend, FakeTally};
    use std::time::Duration;

    fn scheduler(interval_ms: u64) -> (SyncScheduler, Arc<FakeBackend>) {
        let backend = Arc::new(FakeBackend::default());
        let agent = SyncAgent::new(
            "Test Company",
            SyncConfig {
                polling_interval_ms: interval_ms,
                ledger_index_delay_ms: 0,
                voucher_index_delay_ms: 0,
                ..SyncConfig::default()
            },
            Arc::new(FakeTally::default()) as Arc<dyn AccountingClient>,
            Arc::clone(&backend) as Arc<dyn BackendApi>,
            EventSink::default(),
        );
        (SyncScheduler::new(Arc::new(agent)), backend)
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycles_follow_interval() {
        let (scheduler, backend) = scheduler(1000);
        scheduler.start();
        assert!(scheduler.is_running());

        tokio::time::sleep(Duration::from_millis(2500)).await;
        scheduler.shutdown().await;

        // t = 0, 1000, 2000
        assert_eq!(*backend.fetches.lock().unwrap(), 3);
        assert!(!scheduler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_cycle_skips_missed_ticks() {
        let (scheduler, backend) = scheduler(1000);
        backend
            .fetch_delays
            .lock()
            .unwrap()
            .push_back(Duration::from_millis(2500));
        let origin = tokio::time::Instant::now();

        scheduler.start();
        tokio::time::sleep(Duration::from_millis(4700)).await;
        scheduler.shutdown().await;

        assert_eq!(backend.max_in_flight.load(Ordering::SeqCst), 1);
        // One late cycle when the slow one ends, then back on the 1s grid
        let offsets: Vec<u128> = backend
            .fetch_started
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.duration_since(origin).as_millis())
            .collect();
        assert_eq!(offsets, vec![0, 2500, 3000, 4000]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_keeps_one_loop() {
        let (scheduler, backend) = scheduler(1000);
        scheduler.start();
        scheduler.start();

        tokio::time::sleep(Duration::from_millis(500)).await;
        scheduler.shutdown().await;

        assert_eq!(*backend.fetches.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_then_restart() {
        let (scheduler, backend) = scheduler(1000);
        let mut rx = scheduler.agent().events().subscribe();

        scheduler.start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.stop();
        scheduler.stop();
        scheduler.start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.shutdown().await;

        assert_eq!(*backend.fetches.lock().unwrap(), 2);

        let mut stopped = 0;
        while let Ok(event) = rx.try_recv() {
            if let AgentEvent::Log(record) = event {
                if record.message == "Sync Agent Stopped." {
                    stopped += 1;
                }
            }
        }
        assert_eq!(stopped, 2);
    }
}
