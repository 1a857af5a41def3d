use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use time::OffsetDateTime;
use tokio::runtime::Handle;
use tokio::task::JoinError;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use access_control::{AccessController, GracePolicy};
use graceguard_core::config::{Config, ConfigPaths};
use graceguard_core::ipc::{resolve_pid_path, resolve_socket_path};
use hosts_store::{CacheFlusher, CommandFlusher, HostsStore, NoopFlusher, RestoreOutcome};

mod ipc;
mod lifecycle;

use ipc::{DaemonState, PeerPolicy};
use lifecycle::TerminationSignals;

fn main() -> Result<()> {
    init_tracing()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("graceguard")
        .build()
        .context("build tokio runtime")?;
    runtime.block_on(run())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if let Some(log_file) = std::env::var_os("GRACEGUARD_LOG_FILE").map(PathBuf::from) {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .with_context(|| format!("open log file {}", log_file.display()))?;
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
    Ok(())
}

async fn run() -> Result<()> {
    let paths = ConfigPaths::resolve()?;
    let config = Config::load_or_default(None, &paths)?;
    let policy = GracePolicy::from_config(&config)?;
    lifecycle::preflight(&config.blocklist.hosts_path)?;

    // Registered before the first hosts write so no termination signal is missed.
    let mut signals = TerminationSignals::register()?;

    let flusher: Arc<dyn CacheFlusher> =
        match CommandFlusher::from_command_line(&config.dns.flush_command) {
            Some(flusher) => Arc::new(flusher),
            None => Arc::new(NoopFlusher),
        };
    let store = Arc::new(HostsStore::new(
        &config.blocklist.hosts_path,
        &config.blocklist.sentinel_address,
        flusher,
    ));
    let controller = Arc::new(AccessController::initialize(
        policy,
        store,
        config.daemon.backup_dir.as_deref(),
        Handle::current(),
    ));

    let socket_path = resolve_socket_path();
    let pid_path = resolve_pid_path();
    if let Err(err) = lifecycle::write_pid_file(&pid_path) {
        warn!(error = %err, "continuing without pid file");
    }

    let state = Arc::new(DaemonState {
        started_at: OffsetDateTime::now_utc(),
        controller: controller.clone(),
    });
    let peers = PeerPolicy::new(lifecycle::current_euid(), config.daemon.allowed_uids.clone());
    info!(socket = %socket_path.display(), hosts = %config.blocklist.hosts_path.display(), "graceguard daemon started");

    let server_path = socket_path.clone();
    let server = tokio::spawn(async move { ipc::serve(&server_path, state, peers).await });

    let exit = tokio::select! {
        name = signals.recv() => {
            info!(signal = name, "termination signal received");
            Ok(())
        }
        result = server => {
            let exit = server_exit(result);
            if let Err(err) = &exit {
                error!(error = %err, "ipc server stopped");
            }
            exit
        }
    };

    let timeout = Duration::from_secs(config.daemon.shutdown_timeout_secs);
    let restored = match controller.shutdown(timeout).await {
        RestoreOutcome::Restored | RestoreOutcome::AlreadyRestored => {
            info!("original hosts file restored");
            Ok(())
        }
        RestoreOutcome::Failed(reason) => {
            error!(%reason, "hosts file was not restored");
            Err(anyhow::anyhow!("hosts file was not restored: {reason}"))
        }
    };
    lifecycle::remove_runtime_files(&socket_path, &pid_path);
    exit.and(restored)
}

/// The server only returns on failure, so every way out of it is an error.
fn server_exit(result: Result<Result<()>, JoinError>) -> Result<()> {
    match result {
        Ok(Ok(())) => Err(anyhow::anyhow!("ipc server stopped unexpectedly")),
        Ok(Err(err)) => Err(err.context("ipc server failed")),
        Err(err) => Err(anyhow::anyhow!("ipc server task panicked: {err}")),
    }
}
