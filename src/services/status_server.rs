//! Local status HTTP server
//!
//! Serves the agent's view of both connections, the last cycle and the
//! recent log tail, for process supervisors and support staff.

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::domain::{AgentEvent, CycleReport, LogRecord};
use crate::error::{Result, SyncError};

pub const LOG_TAIL: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub tally: Option<bool>,
    pub backend: Option<bool>,
    pub last_cycle: Option<CycleReport>,
}

#[derive(Default)]
struct Board {
    tally: Option<bool>,
    backend: Option<bool>,
    last_cycle: Option<CycleReport>,
    logs: VecDeque<LogRecord>,
}

/// Rolling snapshot of agent events
pub struct StatusBoard {
    started_at: DateTime<Utc>,
    board: RwLock<Board>,
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBoard {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            board: RwLock::new(Board::default()),
        }
    }

    pub async fn apply(&self, event: AgentEvent) {
        let mut board = self.board.write().await;
        match event {
            AgentEvent::Log(record) => {
                if board.logs.len() == LOG_TAIL {
                    board.logs.pop_front();
                }
                board.logs.push_back(record);
            }
            AgentEvent::ConnectionStatus(status) => {
                board.tally = Some(status.tally);
                // Tally-only updates leave the backend's last known state alone
                if status.backend.is_some() {
                    board.backend = status.backend;
                }
            }
            AgentEvent::CycleCompleted(report) => board.last_cycle = Some(report),
        }
    }

    pub async fn health(&self) -> HealthResponse {
        let board = self.board.read().await;
        let status = if board.tally == Some(true) && board.backend != Some(false) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };
        HealthResponse {
            status,
            timestamp: Utc::now(),
            uptime_seconds: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
            tally: board.tally,
            backend: board.backend,
            last_cycle: board.last_cycle.clone(),
        }
    }

    pub async fn logs(&self) -> Vec<LogRecord> {
        self.board.read().await.logs.iter().cloned().collect()
    }

    /// Feed the board from an event subscription until the channel closes
    pub fn follow(self: &Arc<Self>, mut rx: broadcast::Receiver<AgentEvent>) -> JoinHandle<()> {
        let board = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => board.apply(event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("Status board skipped {} events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

pub fn router(board: Arc<StatusBoard>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/logs", get(logs_handler))
        .with_state(board)
}

async fn health_handler(State(board): State<Arc<StatusBoard>>) -> impl IntoResponse {
    Json(board.health().await)
}

async fn logs_handler(State(board): State<Arc<StatusBoard>>) -> impl IntoResponse {
    Json(board.logs().await)
}

pub struct StatusServer {
    board: Arc<StatusBoard>,
    port: u16,
}

impl StatusServer {
    pub fn new(board: Arc<StatusBoard>, port: u16) -> Self {
        Self { board, port }
    }

    /// Serve on localhost until the task is dropped
    pub async fn run(&self) -> Result<()> {
        let addr = SocketAddr::from(([127, 0, 0, 1], self.port));
        info!("Starting status server on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router(Arc::clone(&self.board)))
            .await
            .map_err(|e| SyncError::Internal(format!("Status server error: {}", e)))?;
        Ok(())
    }
}
