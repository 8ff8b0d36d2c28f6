//! # CLI Interface
//!
//! Command-line arguments for `quorum-node`, via `clap` derive. Four
//! subcommands: `run`, `init`, `status`, and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use quorum_protocol::config::{DEFAULT_METRICS_PORT, DEFAULT_RPC_PORT};
use quorum_protocol::Address;

use crate::logging::LogFormat;

/// Quorum Vault host node.
///
/// Hosts a single multisig vault: owners propose, confirm, and execute
/// outgoing transfers over a signed REST API, and the vault's state is
/// persisted across restarts.
#[derive(Parser, Debug)]
#[command(
    name = "quorum-node",
    about = "Quorum Vault host node",
    version,
    propagate_version = true
)]
pub struct QuorumNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start hosting the vault.
    Run(RunArgs),
    /// Write a vault config file after checking it describes a valid vault.
    Init(InitArgs),
    /// Query the status of a running node.
    Status(StatusArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the vault config file (JSON).
    ///
    /// When omitted, the node looks for `vault.json` in the data directory.
    /// Only required the first time; afterwards the vault is restored from
    /// the store and the config, if present, must still match it.
    #[arg(long, short = 'c', env = "QUORUM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding the vault store.
    #[arg(long, short = 'd', env = "QUORUM_DATA_DIR", default_value = "./quorum-data")]
    pub data_dir: PathBuf,

    /// Port for the REST API.
    #[arg(long, env = "QUORUM_RPC_PORT", default_value_t = DEFAULT_RPC_PORT)]
    pub rpc_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "QUORUM_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Owner address (64 hex chars). Repeat or comma-separate for several.
    #[arg(long = "owner", required = true, value_delimiter = ',')]
    pub owners: Vec<Address>,

    /// Confirmations required to execute a transaction.
    #[arg(long, short = 't')]
    pub threshold: usize,

    /// Data directory to write `vault.json` into.
    #[arg(long, short = 'd', env = "QUORUM_DATA_DIR", default_value = "./quorum-data")]
    pub data_dir: PathBuf,

    /// Overwrite an existing config file.
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// REST endpoint of the running node.
    #[arg(long, default_value = "http://127.0.0.1:9841")]
    pub rpc_url: String,
}
