// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Quorum Vault Node
//!
//! Entry point for the `quorum-node` binary. Parses CLI arguments,
//! initializes logging and metrics, brings the vault up from its store (or
//! from a config file on first run), and serves the HTTP/WS API.
//!
//! The binary supports four subcommands:
//!
//! - `run`    : host the vault
//! - `init`   : validate owners/threshold and write `vault.json`
//! - `status` : query a running node's status endpoint
//! - `version`: print build version information

mod api;
mod cli;
mod host;
mod logging;
mod metrics;
mod store;

use anyhow::{bail, Context, Result};
use clap::Parser;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;

use quorum_contracts::Vault;
use quorum_protocol::config::{VaultConfig, EVENT_CHANNEL_CAPACITY, PROTOCOL_VERSION};
use quorum_protocol::crypto::ReplayGuard;

use cli::{Commands, QuorumNodeCli};
use host::VaultHost;
use logging::LogFormat;
use metrics::NodeMetrics;
use store::VaultStore;

/// File name of the vault config inside the data directory.
const CONFIG_FILE_NAME: &str = "vault.json";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = QuorumNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_node(args),
        Commands::Status(args) => query_status(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Resolves which config file `run` should read, if any.
///
/// An explicit `--config` must exist. Without one, `vault.json` in the data
/// directory is used when present; a node restarting from its store does
/// not need a config at all.
fn resolve_config(args: &cli::RunArgs) -> Result<Option<VaultConfig>> {
    let (path, required): (PathBuf, bool) = match &args.config {
        Some(path) => (path.clone(), true),
        None => (args.data_dir.join(CONFIG_FILE_NAME), false),
    };

    if !required && !path.exists() {
        return Ok(None);
    }
    let config = VaultConfig::load(&path)
        .with_context(|| format!("failed to load vault config {}", path.display()))?;
    tracing::info!(path = %path.display(), "vault config loaded");
    Ok(Some(config))
}

/// Hosts the vault: API server plus metrics endpoint.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(logging::DEFAULT_FILTER, args.log_format);

    tracing::info!(
        rpc_port = args.rpc_port,
        metrics_port = args.metrics_port,
        data_dir = %args.data_dir.display(),
        "starting quorum-node"
    );

    let config = resolve_config(&args)?;

    // --- Persistent storage ---
    let db_path = args.data_dir.join("db");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create database directory: {}", db_path.display()))?;
    let store = VaultStore::open(&db_path)
        .with_context(|| format!("failed to open vault store at {}", db_path.display()))?;
    tracing::info!(path = %db_path.display(), "vault store opened");

    // --- Vault ---
    let host = VaultHost::open(store, config.as_ref()).context("failed to bring up vault")?;

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new());
    node_metrics.observe_vault(&host.vault);

    // --- Event broadcast ---
    let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

    // --- Application state ---
    let app_state = api::AppState {
        version: format!("{} (protocol {})", env!("CARGO_PKG_VERSION"), PROTOCOL_VERSION),
        host: Arc::new(Mutex::new(host)),
        event_tx,
        replay: Arc::new(Mutex::new(ReplayGuard::new())),
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.rpc_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind RPC listener on {}", api_addr))?;
    tracing::info!("RPC/API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    tracing::info!("quorum-node stopped");
    Ok(())
}

/// Validates an owner set and threshold, then writes them as the data
/// directory's `vault.json`.
fn init_node(args: cli::InitArgs) -> Result<()> {
    logging::init_logging("quorum_node=info", LogFormat::Pretty);

    let config = VaultConfig::new(args.owners, args.threshold);
    // Same checks the node runs on first start, surfaced now instead.
    Vault::from_config(&config).context("refusing to write an invalid vault config")?;

    let data_dir = &args.data_dir;
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

    let config_path = data_dir.join(CONFIG_FILE_NAME);
    if config_path.exists() && !args.force {
        bail!(
            "{} already exists (pass --force to overwrite)",
            config_path.display()
        );
    }
    config.save(&config_path)?;

    tracing::info!(
        path = %config_path.display(),
        owners = config.owners.len(),
        threshold = config.threshold,
        "vault config written"
    );

    println!("Vault initialized successfully.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Config         : {}", config_path.display());
    println!("  Threshold      : {} of {}", config.threshold, config.owners.len());
    for owner in &config.owners {
        println!("  Owner          : {}", owner);
    }

    Ok(())
}

/// Queries a running node's status endpoint and prints the result.
async fn query_status(args: cli::StatusArgs) -> Result<()> {
    let url = format!("{}/status", args.rpc_url.trim_end_matches('/'));
    let body = http_get(&url).await?;
    println!("{}", body);
    Ok(())
}

/// Minimal HTTP GET over a raw tokio TCP stream. Plain `http://` only,
/// which is all a node on localhost serves.
async fn http_get(url: &str) -> Result<String> {
    let parsed: url::Url = url
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid URL: {}", e))?;

    let addr = format!("{}:{}", parsed.host, parsed.port.unwrap_or(80));
    let mut stream = tokio::net::TcpStream::connect(&addr)
        .await
        .with_context(|| format!("failed to connect to {}", addr))?;

    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        parsed.path, parsed.host,
    );

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    stream.write_all(request.as_bytes()).await?;
    stream.shutdown().await?;

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    let response = String::from_utf8_lossy(&buf);

    // Everything after the first blank line is the body.
    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, b)| b.to_string())
        .unwrap_or_else(|| response.to_string());

    Ok(body)
}

/// Prints version information to stdout.
fn print_version() {
    println!("quorum-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol    {}", PROTOCOL_VERSION);
    println!(
        "snapshot    v{}",
        quorum_protocol::config::SNAPSHOT_FORMAT_VERSION
    );
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Just enough URL parsing for `status`: host, optional port, path.
mod url {
    pub struct Url {
        pub host: String,
        pub port: Option<u16>,
        pub path: String,
    }

    impl std::str::FromStr for Url {
        type Err = String;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            if s.starts_with("https://") {
                return Err("https is not supported".into());
            }
            let rest = s.strip_prefix("http://").unwrap_or(s);

            let (authority, path) = match rest.find('/') {
                Some(i) => (&rest[..i], &rest[i..]),
                None => (rest, "/"),
            };
            if authority.is_empty() {
                return Err("missing host".into());
            }

            let (host, port) = match authority.rfind(':') {
                Some(i) => {
                    let p = authority[i + 1..]
                        .parse::<u16>()
                        .map_err(|e| format!("bad port: {}", e))?;
                    (authority[..i].to_string(), Some(p))
                }
                None => (authority.to_string(), None),
            };

            Ok(Url {
                host,
                port,
                path: path.to_string(),
            })
        }
    }

}
