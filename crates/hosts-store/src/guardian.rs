use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use tracing::{error, info, warn};

use graceguard_core::error::GraceGuardError;

use crate::store::HostsStore;

const UNREADABLE_PLACEHOLDER: &str = "# (hosts file empty or unreadable)\n";

/// Hosts content captured once at startup.
#[derive(Debug, Clone)]
pub struct ResourceSnapshot {
    pub content: String,
    pub captured_at: OffsetDateTime,
    pub fingerprint: String,
    /// True when the file was empty or unreadable and the placeholder was used.
    pub placeholder: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    Restored,
    AlreadyRestored,
    Failed(String),
}

/// Owns the startup snapshot and writes it back exactly once, whichever
/// termination path asks first. Dropping the guardian restores as well.
pub struct BackupGuardian {
    store: Arc<HostsStore>,
    snapshot: ResourceSnapshot,
    backup_path: Option<PathBuf>,
    outcome: OnceLock<RestoreOutcome>,
}

impl ResourceSnapshot {
    fn from_read(result: Result<String, GraceGuardError>) -> Self {
        let (content, placeholder) = match result {
            Ok(content) if !content.is_empty() => (content, false),
            Ok(_) => {
                warn!("hosts file is empty, snapshot uses placeholder");
                (UNREADABLE_PLACEHOLDER.to_string(), true)
            }
            Err(err) => {
                warn!(error = %err, "hosts file unreadable, snapshot uses placeholder");
                (UNREADABLE_PLACEHOLDER.to_string(), true)
            }
        };
        Self {
            fingerprint: fingerprint(&content),
            content,
            captured_at: OffsetDateTime::now_utc(),
            placeholder,
        }
    }
}

impl BackupGuardian {
    /// Snapshots the hosts file. Must run before the store's first mutation.
    /// A diagnostic copy goes to `scratch_dir` (the OS temp dir when `None`).
    pub fn capture(store: Arc<HostsStore>, scratch_dir: Option<&Path>) -> Self {
        let snapshot = ResourceSnapshot::from_read(store.read());
        let scratch_dir = scratch_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(std::env::temp_dir);
        let backup_path = match write_backup_copy(&scratch_dir, &snapshot) {
            Ok(path) => {
                info!(path = %path.display(), "original hosts backed up");
                Some(path)
            }
            Err(err) => {
                warn!(error = %err, "could not write hosts backup copy");
                None
            }
        };
        info!(
            path = %store.path().display(),
            fingerprint = %snapshot.fingerprint,
            "hosts snapshot captured"
        );
        Self {
            store,
            snapshot,
            backup_path,
            outcome: OnceLock::new(),
        }
    }

    pub fn snapshot(&self) -> &ResourceSnapshot {
        &self.snapshot
    }

    pub fn backup_path(&self) -> Option<&Path> {
        self.backup_path.as_deref()
    }

    pub fn is_restored(&self) -> bool {
        self.outcome.get().is_some()
    }

    /// Writes the snapshot back and seals the store. The first caller performs
    /// the write; concurrent callers wait for it and then get
    /// `AlreadyRestored`. Never panics.
    pub fn restore_once(&self) -> RestoreOutcome {
        let mut performed = false;
        let outcome = self.outcome.get_or_init(|| {
            performed = true;
            self.perform_restore()
        });
        if performed {
            outcome.clone()
        } else {
            RestoreOutcome::AlreadyRestored
        }
    }

    fn perform_restore(&self) -> RestoreOutcome {
        info!(path = %self.store.path().display(), "restoring original hosts file");
        if let Err(err) = self.store.restore(&self.snapshot.content) {
            error!(error = %err, "hosts restore failed");
            return RestoreOutcome::Failed(err.to_string());
        }

        match self.store.read() {
            Ok(current) if fingerprint(&current) == self.snapshot.fingerprint => {
                info!(fingerprint = %self.snapshot.fingerprint, "hosts file restored");
                RestoreOutcome::Restored
            }
            Ok(_) => {
                let err = GraceGuardError::Restore(
                    "hosts content differs from snapshot after restore".to_string(),
                );
                error!(error = %err, "hosts restore verification failed");
                RestoreOutcome::Failed(err.to_string())
            }
            Err(err) => {
                error!(error = %err, "hosts restore could not be verified");
                RestoreOutcome::Failed(err.to_string())
            }
        }
    }
}

impl Drop for BackupGuardian {
    fn drop(&mut self) {
        if self.is_restored() {
            return;
        }
        warn!("backup guardian dropped before shutdown, restoring hosts");
        let _outcome = self.restore_once();
    }
}

fn write_backup_copy(dir: &Path, snapshot: &ResourceSnapshot) -> Result<PathBuf, GraceGuardError> {
    fs::create_dir_all(dir).map_err(|source| GraceGuardError::io(dir, source))?;
    let name = format!("hosts_backup_{}.bak", snapshot.captured_at.unix_timestamp());
    let path = dir.join(name);
    fs::write(&path, &snapshot.content).map_err(|source| GraceGuardError::io(&path, source))?;
    Ok(path)
}

fn fingerprint(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
