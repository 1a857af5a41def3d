use std::fs::{self, OpenOptions};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use anyhow::{Context, Result};
use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing::warn;

/// Every signal after which the hosts file must be restored: interrupt,
/// terminate, hangup (session or terminal closed) and quit.
pub struct TerminationSignals {
    interrupt: Signal,
    terminate: Signal,
    hangup: Signal,
    quit: Signal,
}

impl TerminationSignals {
    pub fn register() -> Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt()).context("register SIGINT handler")?,
            terminate: signal(SignalKind::terminate()).context("register SIGTERM handler")?,
            hangup: signal(SignalKind::hangup()).context("register SIGHUP handler")?,
            quit: signal(SignalKind::quit()).context("register SIGQUIT handler")?,
        })
    }

    /// Resolves with the name of the first termination signal received.
    pub async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
            _ = self.hangup.recv() => "SIGHUP",
            _ = self.quit.recv() => "SIGQUIT",
        }
    }
}

/// Fails unless the hosts file can be opened for writing. Elevation itself is
/// up to whoever launches the daemon.
pub fn preflight(hosts_path: &Path) -> Result<()> {
    OpenOptions::new()
        .append(true)
        .open(hosts_path)
        .with_context(|| {
            format!(
                "hosts file {} is not writable; start the daemon with sufficient privileges",
                hosts_path.display()
            )
        })?;
    Ok(())
}

pub fn write_pid_file(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create pid dir {}", parent.display()))?;
    }
    let pid = std::process::id();
    fs::write(path, pid.to_string())
        .with_context(|| format!("write pid file {}", path.display()))?;
    let perms = fs::Permissions::from_mode(0o600);
    fs::set_permissions(path, perms)
        .with_context(|| format!("set pid permissions {}", path.display()))?;
    Ok(())
}

pub fn remove_runtime_files(socket_path: &Path, pid_path: &Path) {
    for path in [socket_path, pid_path] {
        if let Err(err) = fs::remove_file(path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %err, "failed to remove runtime file");
            }
        }
    }
}

pub fn current_euid() -> u32 {
    unsafe { libc::geteuid() }
}
