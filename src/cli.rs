use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "tally-sync")]
#[command(version)]
#[command(about = "Pushes pending sales invoices from the backend into TallyPrime", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Directory holding default.toml and per-environment overrides
    #[arg(short, long, default_value = "config", env = "TALLY_SYNC_CONFIG_DIR")]
    pub config_dir: PathBuf,

    /// Selected-company state file (defaults to the user data directory)
    #[arg(long, env = "TALLY_SYNC_STATE_FILE")]
    pub state_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run the sync agent until interrupted
    Run,
    /// Run a single sync cycle and exit
    Once,
    /// Check whether Tally answers its handshake
    Probe,
    /// List companies open in Tally
    Companies,
    /// Remember the company the agent should sync into
    SelectCompany {
        /// Company name exactly as Tally shows it
        name: String,
    },
}

impl Cli {
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Run)
    }
}
