use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use graceguard_core::error::GraceGuardError;

use crate::entry::{normalize_selector, GuardedEntry};
use crate::flush::{CacheFlusher, NoopFlusher};

const EMPTY_HOSTS_PLACEHOLDER: &str = "# (hosts file empty)";

/// Serialised access to the hosts file.
///
/// Every mutation holds the write lock for its whole read-modify-write cycle,
/// so the request path, re-block timers and the guardian never lose each
/// other's edits. Once the guardian restores the original content the store is
/// sealed and further mutations become no-ops.
pub struct HostsStore {
    path: PathBuf,
    sentinel: String,
    state: Mutex<StoreState>,
    flusher: Arc<dyn CacheFlusher>,
}

#[derive(Debug, Default)]
struct StoreState {
    sealed: bool,
    writes: u64,
}

impl HostsStore {
    pub fn new(path: impl Into<PathBuf>, sentinel: &str, flusher: Arc<dyn CacheFlusher>) -> Self {
        Self {
            path: path.into(),
            sentinel: sentinel.trim().to_string(),
            state: Mutex::new(StoreState::default()),
            flusher,
        }
    }

    pub fn without_flush(path: impl Into<PathBuf>, sentinel: &str) -> Self {
        Self::new(path, sentinel, Arc::new(NoopFlusher))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> Result<String, GraceGuardError> {
        fs::read_to_string(&self.path).map_err(|source| GraceGuardError::io(&self.path, source))
    }

    /// Appends a block directive for every selector that lacks one. Returns
    /// whether anything was written.
    pub fn block<S: AsRef<str>>(&self, selectors: &[S]) -> Result<bool, GraceGuardError> {
        let mut state = self.lock_state();
        if state.sealed {
            warn!(path = %self.path.display(), "hosts store sealed, skipping block");
            return Ok(false);
        }

        let current = self.read()?;
        let mut lines: Vec<String> = if current.trim().is_empty() {
            vec![EMPTY_HOSTS_PLACEHOLDER.to_string()]
        } else {
            current.lines().map(str::to_string).collect()
        };
        let mut present: HashSet<String> = lines.iter().cloned().collect();
        let mut existing: Vec<GuardedEntry> =
            lines.iter().filter_map(|line| GuardedEntry::parse(line)).collect();

        let mut added = Vec::new();
        for selector in selectors {
            let entry = GuardedEntry::new(&self.sentinel, selector.as_ref());
            if entry.selector.is_empty() {
                continue;
            }
            let line = entry.to_line();
            if present.contains(&line) || existing.iter().any(|other| other.same_directive(&entry)) {
                continue;
            }
            present.insert(line.clone());
            lines.push(line);
            added.push(entry.selector.clone());
            existing.push(entry);
        }

        if added.is_empty() {
            debug!(path = %self.path.display(), "block found every directive present");
            return Ok(false);
        }

        self.write_lines(&mut state, &lines)?;
        info!(path = %self.path.display(), selectors = ?added, "blocked selectors");
        Ok(true)
    }

    /// Removes every line accepted by `matcher`. Returns whether anything was
    /// written.
    pub fn unblock<F>(&self, matcher: F) -> Result<bool, GraceGuardError>
    where
        F: Fn(&str) -> bool,
    {
        let mut state = self.lock_state();
        if state.sealed {
            warn!(path = %self.path.display(), "hosts store sealed, skipping unblock");
            return Ok(false);
        }

        let current = self.read()?;
        let total = current.lines().count();
        let kept: Vec<String> = current
            .lines()
            .filter(|line| !matcher(line))
            .map(str::to_string)
            .collect();
        let removed = total - kept.len();
        if removed == 0 {
            return Ok(false);
        }

        self.write_lines(&mut state, &kept)?;
        info!(path = %self.path.display(), removed, "unblocked matching lines");
        Ok(true)
    }

    /// Whether a block directive for `selector` is currently present.
    pub fn is_blocked(&self, selector: &str) -> Result<bool, GraceGuardError> {
        let wanted = GuardedEntry::new(&self.sentinel, selector);
        let current = self.read()?;
        Ok(current
            .lines()
            .filter_map(GuardedEntry::parse)
            .any(|entry| entry.same_directive(&wanted)))
    }

    pub fn is_sealed(&self) -> bool {
        self.lock_state().sealed
    }

    /// Number of writes performed so far, restoration included.
    pub fn write_count(&self) -> u64 {
        self.lock_state().writes
    }

    /// Writes `content` verbatim and seals the store. Only the guardian calls
    /// this.
    pub(crate) fn restore(&self, content: &str) -> Result<(), GraceGuardError> {
        let mut state = self.lock_state();
        state.sealed = true;
        fs::write(&self.path, content).map_err(|source| GraceGuardError::io(&self.path, source))?;
        state.writes = state.writes.saturating_add(1);
        self.flusher.flush();
        Ok(())
    }

    fn write_lines(&self, state: &mut StoreState, lines: &[String]) -> Result<(), GraceGuardError> {
        let mut contents = lines.join("\n");
        contents.push('\n');
        fs::write(&self.path, contents).map_err(|source| GraceGuardError::io(&self.path, source))?;
        state.writes = state.writes.saturating_add(1);
        self.flusher.flush();
        Ok(())
    }

    fn lock_state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Normalises and de-duplicates a selector list, keeping first-seen order.
pub fn normalize_selectors<S: AsRef<str>>(selectors: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    selectors
        .iter()
        .map(|selector| normalize_selector(selector.as_ref()))
        .filter(|selector| !selector.is_empty() && seen.insert(selector.clone()))
        .collect()
}
