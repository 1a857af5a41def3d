//! Exclusive read/write access to the hosts file and the backup guardian that
//! restores it on exit.

pub mod entry;
pub mod flush;
pub mod guardian;
pub mod store;

pub use entry::{normalize_selector, GuardedEntry, SelectorMatcher};
pub use flush::{CacheFlusher, CommandFlusher, NoopFlusher};
pub use guardian::{BackupGuardian, ResourceSnapshot, RestoreOutcome};
pub use store::{normalize_selectors, HostsStore};
