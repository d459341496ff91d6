use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tally_sync::cli::{Cli, Commands};
use tally_sync::config::LoggingConfig;
use tally_sync::state::NO_COMPANIES_PLACEHOLDER;
use tally_sync::{
    AccountingClient, AgentSupervisor, AppConfig, Result, StateStore, StatusBoard, StatusServer,
    SyncError, TallyClient,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config_dir)?;

    let command = cli.command();
    let _guard = match command {
        Commands::Run | Commands::Once => init_logging(&config.logging),
        _ => {
            init_logging_simple();
            None
        }
    };

    let store = match &cli.state_file {
        Some(path) => StateStore::new(path),
        None => StateStore::default_location()?,
    };

    match command {
        Commands::Run => run_agent(&config, store).await,
        Commands::Once => {
            config.validate()?;
            let supervisor = AgentSupervisor::from_config(&config, store)?;
            let report = supervisor.run_once().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Commands::Probe => {
            let tally = TallyClient::from_config(&config.tally)?;
            if tally.probe().await {
                println!("Tally is reachable at {}", tally.url());
            } else {
                println!("Tally is NOT reachable at {}. Is Tally Open?", tally.url());
            }
            Ok(())
        }
        Commands::Companies => {
            let supervisor = AgentSupervisor::from_config(&config, store)?;
            let companies = supervisor.list_companies().await;
            if companies.is_empty() {
                println!("{}", NO_COMPANIES_PLACEHOLDER);
            }
            for name in companies {
                println!("{}", name);
            }
            Ok(())
        }
        Commands::SelectCompany { name } => {
            if !store.save_company(&name)? {
                return Err(SyncError::Validation(format!(
                    "'{}' is not a selectable company",
                    name
                )));
            }
            println!("Selected company '{}' ({})", name.trim(), store.path().display());
            Ok(())
        }
    }
}

async fn run_agent(config: &AppConfig, store: StateStore) -> Result<()> {
    config.validate()?;
    let supervisor = AgentSupervisor::from_config(config, store)?;

    let status_handle = config.status_port.map(|port| {
        let board = Arc::new(StatusBoard::new());
        board.follow(supervisor.events().subscribe());
        let server = StatusServer::new(board, port);
        tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Status server stopped: {}", e);
            }
        })
    });

    let company = supervisor.company().await;
    info!(
        tally = %config.tally.url,
        backend = %config.backend.url,
        company = %company,
        "Starting tally-sync"
    );
    supervisor.start().await;

    shutdown_signal().await;
    info!("Shutting down...");

    supervisor.stop().await;
    if let Some(handle) = status_handle {
        handle.abort();
    }
    info!("Shutdown complete");
    Ok(())
}

/// Console logging plus an optional daily file under `logging.dir`
///
/// The returned guard flushes the file writer and must outlive the agent.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},tally_sync=debug", config.level)));

    let (json_layer, plain_layer) = if config.json {
        (Some(tracing_subscriber::fmt::layer().json().with_target(true)), None)
    } else {
        (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            ),
        )
    };

    let mut guard = None;
    let file_layer = config.dir.as_deref().and_then(|dir| {
        // rolling::daily panics when it cannot create the file, so check first
        if let Err(e) = std::fs::create_dir_all(dir).and_then(|_| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(std::path::Path::new(dir).join("tally-sync.log"))
        }) {
            eprintln!("Warning: cannot write logs to {} ({}), file logging disabled", dir, e);
            return None;
        }
        let appender = tracing_appender::rolling::daily(dir, "tally-sync.log");
        let (writer, worker) = tracing_appender::non_blocking(appender);
        guard = Some(worker);
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true),
        )
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(plain_layer)
        .with(file_layer)
        .init();

    if let Some(dir) = &config.dir {
        if guard.is_some() {
            info!("Logging to {}/tally-sync.log", dir);
        } else {
            warn!("File logging disabled");
        }
    }
    guard
}

fn init_logging_simple() {
    // One-shot commands only need warnings
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
