//! DNS cache invalidation after hosts writes.

use std::process::{Command, Stdio};
use std::thread;

use tracing::{debug, warn};

/// Signalled after every successful hosts write. Implementations must not
/// block the writer and must swallow their own failures.
pub trait CacheFlusher: Send + Sync {
    fn flush(&self);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopFlusher;

impl CacheFlusher for NoopFlusher {
    fn flush(&self) {}
}

/// Runs an external command (e.g. `resolvectl flush-caches`) on a detached
/// thread.
#[derive(Debug, Clone)]
pub struct CommandFlusher {
    program: String,
    args: Vec<String>,
}

impl CommandFlusher {
    /// Returns `None` for an empty command line.
    pub fn from_command_line(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        if program.trim().is_empty() {
            return None;
        }
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl CacheFlusher for CommandFlusher {
    fn flush(&self) {
        let program = self.program.clone();
        let args = self.args.clone();
        let spawned = thread::Builder::new()
            .name("dns-flush".to_string())
            .spawn(move || {
                let status = Command::new(&program)
                    .args(&args)
                    .stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .status();
                match status {
                    Ok(status) if status.success() => debug!(%program, "DNS cache flushed"),
                    Ok(status) => warn!(%program, %status, "DNS cache flush exited unsuccessfully"),
                    Err(error) => warn!(%program, %error, "DNS cache flush could not run"),
                }
            });
        if let Err(error) = spawned {
            warn!(%error, "failed to start DNS flush thread");
        }
    }
}
