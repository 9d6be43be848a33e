//! putsync - two-way sync between a local folder and a put.io account
//!
//! This binary handles:
//! - Command-line flags layered over the YAML configuration
//! - Logging setup
//! - Authentication and wiring of the remote, store and notifier adapters
//! - The sync scheduler, local watcher and optional status endpoint
//! - Graceful shutdown on SIGTERM/SIGINT
//!
//! # Exit codes
//!
//! | code | meaning |
//! |---|---|
//! | 0 | clean shutdown, or single pass completed |
//! | 1 | any other failure |
//! | 10 | configuration error |
//! | 11 | credentials rejected |

mod server;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use putsync_cache::{DatabasePool, SqliteStateStore};
use putsync_core::config::Config;
use putsync_core::ports::IChangeNotifier;
use putsync_remote::{auth, is_auth_error, PutioClient, WebSocketNotifier};
use putsync_sync::watcher::run_local_watcher;
use putsync_sync::{is_config_error, SyncEngine, SyncError, SyncScheduler};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::server::StatusServer;

const EXIT_FAILURE: u8 = 1;
const EXIT_CONFIG: u8 = 10;
const EXIT_AUTH: u8 = 11;

// ============================================================================
// Command line
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "putsync", version, about = "Two-way sync between a local folder and put.io")]
struct Cli {
    /// Config file (default: <config dir>/putsync/config.yaml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// put.io username
    #[arg(long)]
    username: Option<String>,

    /// put.io password, or "token/<token>" to use a token directly
    #[arg(long)]
    password: Option<String>,

    /// OAuth token; skips the username/password exchange
    #[arg(long)]
    token: Option<String>,

    /// Log the planned jobs without running them
    #[arg(long)]
    dry_run: bool,

    /// Seconds between passes; 0 runs a single pass and exits
    #[arg(long, value_name = "SECS")]
    repeat: Option<u64>,

    /// Serve a status endpoint on this address, e.g. 127.0.0.1:8080
    #[arg(long, value_name = "ADDR")]
    server: Option<String>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Print the config file location and exit
    #[arg(long)]
    print_config_path: bool,
}

impl Cli {
    fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Overrides file values with the flags that were given
    fn apply(&self, config: &mut Config) {
        if let Some(username) = &self.username {
            config.auth.username = Some(username.clone());
        }
        if let Some(password) = &self.password {
            config.auth.password = Some(password.clone());
        }
        if let Some(token) = &self.token {
            config.auth.token = Some(token.clone());
        }
        if self.dry_run {
            config.sync.dry_run = true;
        }
        if let Some(repeat) = self.repeat {
            config.sync.repeat_interval = repeat;
        }
        if let Some(server) = &self.server {
            config.server.listen_address = Some(server.clone());
        }
        if self.debug {
            config.logging.level = "debug".to_string();
        }
    }
}

/// Loads the config file, applies flags and validates the result
///
/// # Errors
/// Every failure is a [`SyncError::Config`]. A missing file is only an
/// error when its path was given explicitly.
fn load_config(cli: &Cli) -> Result<Config> {
    let loaded = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Cannot read config file {}", path.display())),
        None => Config::load_if_exists(&Config::default_path()),
    };
    let mut config = loaded.map_err(|e| SyncError::Config(format!("{e:#}")))?;
    cli.apply(&mut config);

    let errors = config.validate();
    if !errors.is_empty() {
        let message = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        return Err(SyncError::Config(message).into());
    }
    Ok(config)
}

fn exit_code(err: &anyhow::Error) -> u8 {
    if is_config_error(err) {
        EXIT_CONFIG
    } else if is_auth_error(err) {
        EXIT_AUTH
    } else {
        EXIT_FAILURE
    }
}

fn init_tracing(level: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

// ============================================================================
// DaemonService
// ============================================================================

/// Wires the adapters together and runs the scheduler
struct DaemonService {
    config: Config,
    /// Token for signalling graceful shutdown to all async tasks
    shutdown: CancellationToken,
}

impl DaemonService {
    fn new(config: Config, shutdown: CancellationToken) -> Self {
        Self { config, shutdown }
    }

    /// Runs until shutdown, a fatal error, or the end of a single pass
    async fn run(&self) -> Result<()> {
        let sync = &self.config.sync;

        let pool = DatabasePool::new(&self.config.state.database_path)
            .await
            .context("Failed to open state database")?;
        let store = Arc::new(SqliteStateStore::new(pool.pool().clone()));
        info!(path = %self.config.state.database_path.display(), "Opened state database");

        let token = auth::authenticate(&self.config.auth, &self.config.remote, sync.request_timeout())
            .await
            .context("Authentication failed")?;
        let remote = Arc::new(PutioClient::new(
            token.clone(),
            &self.config.remote,
            sync.request_timeout(),
        ));
        let notifier = Arc::new(WebSocketNotifier::new(
            self.config.remote.websocket_url.clone(),
            token,
        ));

        let mut tasks: Vec<JoinHandle<()>> = vec![notifier.spawn(self.shutdown.clone())];

        if let Some(addr) = &self.config.server.listen_address {
            let server = StatusServer::bind(addr)
                .await
                .with_context(|| format!("Cannot listen on {addr}"))?;
            let token = self.shutdown.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = server.run(token).await {
                    error!(error = %e, "Status server failed");
                }
            }));
        }

        let engine = SyncEngine::new(remote, store, Some(notifier.clone()), sync);
        let mut scheduler = SyncScheduler::new(engine, sync.repeat(), sync.debounce());

        if sync.repeat().is_some() {
            let (trigger_tx, trigger_rx) = mpsc::channel(1);
            tasks.push(tokio::spawn(run_local_watcher(
                sync.local_root.clone(),
                trigger_tx,
                self.shutdown.clone(),
            )));
            scheduler = scheduler
                .with_local_triggers(trigger_rx)
                .with_remote_changes(notifier.subscribe());
        }

        let result = scheduler.run(self.shutdown.clone()).await;

        self.shutdown.cancel();
        for task in tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Background task panicked");
            }
        }
        pool.close().await;
        result
    }
}

// ============================================================================
// Graceful shutdown signal handler
// ============================================================================

/// Waits for SIGTERM or SIGINT and cancels the token
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C)"),
        _ = terminate => info!("Received SIGTERM"),
    }

    token.cancel();
}

// ============================================================================
// Main entry point
// ============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.print_config_path {
        println!("{}", cli.config_path().display());
        return ExitCode::SUCCESS;
    }

    let config = load_config(&cli);
    let level = match &config {
        Ok(config) => config.logging.level.as_str(),
        Err(_) if cli.debug => "debug",
        Err(_) => "info",
    };
    init_tracing(level);

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!(path = %cli.config_path().display(), error = %e, "Invalid configuration");
            return ExitCode::from(exit_code(&e));
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        local_root = %config.sync.local_root.display(),
        remote_folder = %config.sync.remote_folder_name,
        "putsync starting"
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    match DaemonService::new(config, shutdown).run().await {
        Ok(()) => {
            info!("putsync shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = format!("{e:#}"), "putsync exiting with error");
            ExitCode::from(exit_code(&e))
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
